//! Domain models for the veterinary inventory ledger

mod consumer;
mod movement;
mod stock_item;

pub use consumer::*;
pub use movement::*;
pub use stock_item::*;
