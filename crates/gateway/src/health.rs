//! GET /health: gateway liveness plus a best-effort downstream probe.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events_api::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ledger: LedgerHealth,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerHealth {
    pub healthy: bool,
    pub base_url: String,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let healthy = state.ledger.health_check().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        ledger: LedgerHealth {
            healthy,
            base_url: state.ledger.base_url().to_string(),
        },
        checked_at: Utc::now(),
    })
}
