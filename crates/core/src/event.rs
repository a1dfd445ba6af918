use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Current evidence event schema version. Submissions carrying any other
/// version are rejected before reaching the ledger.
pub const SCHEMA_VERSION: u32 = 1;

/// An externally-submitted evidence event.
///
/// The tuple (schemaVersion, eventId) is the caller's logical identity for
/// the event; the ledger enforces per-event uniqueness on it. `payload` is
/// opaque to the gateway and is forwarded unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvidenceEvent {
    pub schema_version: u32,
    pub event_id: Uuid,
    /// e.g. "proofpulse-core"
    pub project_id: String,
    /// e.g. "repo:proofpulse/service:ledger"
    pub artifact_id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Map<String, Value>,
}

impl EvidenceEvent {
    /// Validate field rules beyond JSON shape.
    /// Rules:
    /// - schemaVersion must equal [`SCHEMA_VERSION`]
    /// - projectId: 3..=64 chars of [a-zA-Z0-9._-]
    /// - artifactId: 3..=128 chars of [a-zA-Z0-9./:_-]
    /// - source and type must be non-empty
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "unsupported schemaVersion: {} (expected {})",
                self.schema_version, SCHEMA_VERSION
            ));
        }

        check_identifier("projectId", &self.project_id, 3, 64, is_project_char)?;
        check_identifier("artifactId", &self.artifact_id, 3, 128, is_artifact_char)?;

        if self.source.is_empty() {
            return Err("source must not be empty".to_string());
        }
        if self.event_type.is_empty() {
            return Err("type must not be empty".to_string());
        }

        Ok(())
    }
}

fn is_project_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn is_artifact_char(c: char) -> bool {
    is_project_char(c) || matches!(c, '/' | ':')
}

fn check_identifier(
    field: &str,
    value: &str,
    min_len: usize,
    max_len: usize,
    allowed: fn(char) -> bool,
) -> Result<(), String> {
    let len = value.chars().count();
    if len < min_len || len > max_len {
        return Err(format!(
            "{} must be {}..={} characters, found {}",
            field, min_len, max_len, len
        ));
    }
    if let Some(bad) = value.chars().find(|c| !allowed(*c)) {
        return Err(format!("{} contains invalid character: {:?}", field, bad));
    }
    Ok(())
}
