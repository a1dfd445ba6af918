//! Error taxonomy for the ingestion gateway.
//!
//! Downstream classification errors carry the observed status and body so an
//! operator can distinguish a downstream bug from a downstream outage. None
//! of these are retried by the gateway itself.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Idempotency-Key required")]
    MissingIdempotencyKey,

    /// Event shape or field rules violated; rejected before any forward.
    #[error("invalid event: {0}")]
    ValidationFailure(String),

    /// Ledger explicitly rejected the event as malformed.
    #[error("{reason}")]
    DownstreamRejected { reason: String },

    /// Ledger reports the logical record already exists.
    #[error("Duplicate eventId")]
    DownstreamConflict,

    /// Ledger responded with an unexpected status.
    #[error("Ledger returned HTTP {status}: {body}")]
    DownstreamUpstreamError { status: u16, body: String },

    /// No response received: connection failure or timeout.
    #[error("{detail}")]
    DownstreamUnreachable { detail: String },

    /// Idempotency store could not be reached. Distinct from "no cached
    /// entry": the gateway fails closed instead of forwarding uncoordinated.
    #[error("idempotency store unavailable: {detail}")]
    CacheBackendUnavailable { detail: String },
}

impl GatewayError {
    /// HTTP status the caller observes for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::MissingIdempotencyKey
            | GatewayError::ValidationFailure(_)
            | GatewayError::DownstreamRejected { .. } => 400,
            GatewayError::DownstreamConflict => 409,
            GatewayError::DownstreamUpstreamError { .. }
            | GatewayError::DownstreamUnreachable { .. }
            | GatewayError::CacheBackendUnavailable { .. } => 503,
        }
    }
}
