//! HTTP handlers

pub mod alerts;
pub mod health;
pub mod movements;
pub mod stock_items;

pub use alerts::*;
pub use health::*;
pub use movements::*;
pub use stock_items::*;
