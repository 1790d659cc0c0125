//! Veterinary clinic inventory ledger
//!
//! Tracks the on-hand balance of every stock item through an append-only
//! movement ledger. Clinical flows (prescriptions, antiparasitic treatments)
//! deduct stock through a single gateway that serializes changes per item and
//! treats a replayed reference as a no-op.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod routes;
pub mod services;

pub use config::Config;

use repository::StockRepository;
use services::{AlertingView, DeductionGateway, ItemLocks, MovementLedger, StockItemStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn StockRepository>,
    pub locks: Arc<ItemLocks>,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn StockRepository>) -> Self {
        Self {
            config: Arc::new(config),
            repo,
            locks: Arc::new(ItemLocks::new()),
        }
    }

    pub fn stock_items(&self) -> StockItemStore {
        StockItemStore::new(
            self.repo.clone(),
            self.locks.clone(),
            self.config.inventory.lock_timeout(),
        )
    }

    pub fn ledger(&self) -> MovementLedger {
        MovementLedger::new(self.repo.clone(), self.config.inventory.history_page_size)
    }

    pub fn gateway(&self) -> DeductionGateway {
        DeductionGateway::new(
            self.repo.clone(),
            self.ledger(),
            self.locks.clone(),
            self.config.inventory.lock_timeout(),
        )
    }

    pub fn alerts(&self) -> AlertingView {
        AlertingView::new(self.repo.clone(), self.config.inventory.expiring_soon_days)
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Veterinary Inventory Ledger API v1"
}
