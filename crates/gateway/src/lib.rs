//! ProofPulse Ingestion Gateway
//!
//! Accepts evidence events over HTTP and forwards each, exactly once from
//! the caller's perspective, to the downstream ledger service. The router is
//! exposed for in-process integration testing.

pub mod config;
pub mod events_api;
pub mod health;
pub mod idempotency;
pub mod ledger;

use axum::routing::{get, post};
use axum::Router;

pub use config::GatewayConfig;
pub use events_api::AppState;
pub use idempotency::{
    IdempotencyCoordinator, IdempotencyStore, MemoryStore, StoreError, StoredResponse,
};
pub use ledger::{ForwardOutcome, HttpLedgerClient, LedgerClient};

/// Build the gateway router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(events_api::ingest_event))
        .route("/health", get(health::health))
        .with_state(state)
}
