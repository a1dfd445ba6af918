//! Gateway configuration.
//!
//! Built once at startup from environment variables (CLI flags may override
//! in `main`); request-handling code only ever sees the resulting struct.

use std::time::Duration;

/// Default port the gateway listens on.
pub const DEFAULT_PORT: u16 = 3001;

/// Default downstream ledger base URL (local development).
pub const DEFAULT_LEDGER_URL: &str = "http://localhost:8081";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the downstream ledger service.
    pub ledger_base_url: String,
    /// Client-side timeout for a single forward attempt.
    pub forward_timeout: Duration,
    /// Shorter timeout for the best-effort liveness probe.
    pub health_timeout: Duration,
    /// How long a stored idempotent response stays replayable.
    pub idempotency_ttl: Duration,
    /// Listen port.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ledger_base_url: DEFAULT_LEDGER_URL.to_string(),
            forward_timeout: Duration::from_secs(5),
            health_timeout: Duration::from_secs(2),
            idempotency_ttl: Duration::from_secs(300),
            port: DEFAULT_PORT,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `LEDGER_URL`, `GATEWAY_PORT`,
    /// `IDEMPOTENCY_TTL_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("LEDGER_URL") {
            if !url.trim().is_empty() {
                config.ledger_base_url = url;
            }
        }
        if let Some(port) = std::env::var("GATEWAY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.port = port;
        }
        if let Some(secs) = std::env::var("IDEMPOTENCY_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.idempotency_ttl = Duration::from_secs(secs);
        }

        config
    }
}
