//! ProofPulse Core
//!
//! Shared types for the ingestion gateway:
//! - Evidence event model + field validation
//! - Caller-facing error taxonomy

pub mod error;
pub mod event;

pub use error::GatewayError;
pub use event::{EvidenceEvent, SCHEMA_VERSION};
