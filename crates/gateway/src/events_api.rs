//! POST /events: idempotent write-through to the ledger.
//!
//! Flow per request: derive key → validate → per-key critical section →
//! cache lookup → [miss] forward → store → respond. A cache hit replays the
//! stored status and body verbatim. Only accepted submissions are cached;
//! a caller retrying after a 400/409/503 re-attempts the forward.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use proofpulse_core::{EvidenceEvent, GatewayError};

use crate::idempotency::{IdempotencyCoordinator, StoredResponse};
use crate::ledger::{ForwardOutcome, LedgerClient};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IdempotencyCoordinator>,
    pub ledger: Arc<dyn LedgerClient>,
}

/// Caller-facing error response: `{"error": <detail>}` with the taxonomy's
/// status code.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub(crate) async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw): Json<serde_json::Value>,
) -> Response {
    let header_value = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok());
    let key = match state.coordinator.derive_key(header_value) {
        Ok(key) => key,
        Err(e) => return ApiError(e).into_response(),
    };

    // Deserialize from the raw value so shape errors surface as 400
    // ValidationFailure, resolved locally before any forward attempt.
    let event: EvidenceEvent = match serde_json::from_value(raw) {
        Ok(event) => event,
        Err(e) => return ApiError(GatewayError::ValidationFailure(e.to_string())).into_response(),
    };
    if let Err(reason) = event.validate() {
        return ApiError(GatewayError::ValidationFailure(reason)).into_response();
    }

    // Per-key critical section: concurrent duplicates wait here and then hit
    // the winner's stored response. Released on every exit path by drop.
    let _guard = state.coordinator.acquire(&key).await;

    // Fail closed on a store outage: forwarding without idempotency
    // protection risks a duplicate downstream write.
    match state.coordinator.lookup(&key).await {
        Ok(Some(cached)) => {
            tracing::debug!(%key, "replaying cached response");
            return replay_response(&cached);
        }
        Ok(None) => {}
        Err(e) => return ApiError(e).into_response(),
    }

    match state.ledger.forward(&event).await {
        ForwardOutcome::Accepted => {
            let body =
                serde_json::json!({ "eventId": event.event_id, "status": "ACCEPTED" }).to_string();
            let stored = StoredResponse {
                status: StatusCode::CREATED.as_u16(),
                body: body.clone(),
            };
            // The write already happened; a store failure only widens the
            // replay window, so answer 201 and leave a trace.
            if let Err(e) = state.coordinator.store(&key, stored).await {
                tracing::warn!(%key, error = %e, "failed to cache accepted response");
            }
            tracing::info!(event_id = %event.event_id, "event accepted");
            json_response(StatusCode::CREATED, body)
        }
        ForwardOutcome::Conflict => ApiError(GatewayError::DownstreamConflict).into_response(),
        ForwardOutcome::Rejected { reason } => {
            ApiError(GatewayError::DownstreamRejected { reason }).into_response()
        }
        ForwardOutcome::UpstreamError { status, body } => {
            ApiError(GatewayError::DownstreamUpstreamError { status, body }).into_response()
        }
        ForwardOutcome::Unreachable { detail } => {
            // Probe only to sharpen the message; the write attempt was
            // never gated on it.
            let detail = if state.ledger.health_check().await {
                format!("Upstream ledger error: {}", detail)
            } else {
                format!(
                    "Ledger service unavailable (check {}/health)",
                    state.ledger.base_url()
                )
            };
            ApiError(GatewayError::DownstreamUnreachable { detail }).into_response()
        }
    }
}

fn replay_response(cached: &StoredResponse) -> Response {
    json_response(
        StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
        cached.body.clone(),
    )
}

fn json_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
