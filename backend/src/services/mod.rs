//! Inventory ledger services

pub mod alerting;
pub mod gateway;
pub mod ledger;
pub mod locks;
pub mod stock_item;

pub use alerting::AlertingView;
pub use gateway::DeductionGateway;
pub use ledger::MovementLedger;
pub use locks::ItemLocks;
pub use stock_item::StockItemStore;
