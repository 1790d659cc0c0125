//! Shared types and rules for the veterinary inventory ledger
//!
//! This crate contains the domain model, validation and balance rules shared
//! between the backend service and the browser helpers (via WASM).

pub mod models;
pub mod reconciler;
pub mod types;
pub mod validation;

pub use models::*;
pub use reconciler::*;
pub use types::*;
pub use validation::*;
