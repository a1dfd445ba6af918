//! Ledger write client.
//!
//! Performs a single forwarding attempt per call (no hidden retries:
//! retrying a non-idempotent downstream write without coordination risks
//! duplication) and classifies the outcome into [`ForwardOutcome`] so the
//! request handler never sees raw transport errors.

use async_trait::async_trait;
use proofpulse_core::EvidenceEvent;

use crate::config::GatewayConfig;

/// Classified result of one forwarding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Ledger durably accepted the event.
    Accepted,
    /// Ledger explicitly rejected the event as malformed.
    Rejected { reason: String },
    /// Ledger reports the logical record (eventId) already exists.
    Conflict,
    /// Ledger responded with an unexpected status.
    UpstreamError { status: u16, body: String },
    /// No response received: connection failure or timeout.
    Unreachable { detail: String },
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Issue a single forwarding attempt with the configured timeout.
    async fn forward(&self, event: &EvidenceEvent) -> ForwardOutcome;

    /// Best-effort liveness probe with the shorter timeout. Used only to
    /// enrich diagnostics, never to gate a write attempt.
    async fn health_check(&self) -> bool;

    /// Base URL of the downstream, for diagnostic messages.
    fn base_url(&self) -> &str;
}

/// HTTP implementation backed by `reqwest`, with separate clients so the
/// probe timeout cannot stretch a write and vice versa.
pub struct HttpLedgerClient {
    base_url: String,
    write_client: reqwest::Client,
    probe_client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let write_client = reqwest::Client::builder()
            .timeout(config.forward_timeout)
            .build()?;
        let probe_client = reqwest::Client::builder()
            .timeout(config.health_timeout)
            .build()?;
        Ok(Self {
            base_url: config.ledger_base_url.trim_end_matches('/').to_string(),
            write_client,
            probe_client,
        })
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn forward(&self, event: &EvidenceEvent) -> ForwardOutcome {
        let url = format!("{}/internal/ledger/events", self.base_url);
        match self.write_client.post(&url).json(event).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let outcome = classify_response(status, body);
                tracing::debug!(event_id = %event.event_id, ?outcome, "ledger forward completed");
                outcome
            }
            Err(e) => {
                let detail = if e.is_timeout() {
                    format!("request to {} timed out", url)
                } else {
                    e.to_string()
                };
                tracing::warn!(event_id = %event.event_id, %detail, "ledger unreachable");
                ForwardOutcome::Unreachable { detail }
            }
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.probe_client.get(&url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map an observed ledger response onto the outcome taxonomy.
pub(crate) fn classify_response(status: u16, body: String) -> ForwardOutcome {
    match status {
        200..=299 => ForwardOutcome::Accepted,
        409 => ForwardOutcome::Conflict,
        400 => ForwardOutcome::Rejected {
            reason: rejection_reason(&body),
        },
        _ => ForwardOutcome::UpstreamError { status, body },
    }
}

/// The ledger reports rejections as `{"error": "..."}`; fall back to the raw
/// body when it is shaped differently.
fn rejection_reason(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if body.is_empty() {
                "Ledger rejected request".to_string()
            } else {
                body.to_string()
            }
        })
}
