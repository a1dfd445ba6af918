//! End-to-end idempotency properties over the in-process router:
//! - sequential replay is byte-identical with a single forward
//! - concurrent same-key submissions forward at most once
//! - failures are never cached, so retries re-forward
//! - TTL expiry reopens the forward path

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use proofpulse_core::EvidenceEvent;
use proofpulse_gateway::{
    build_router, AppState, ForwardOutcome, IdempotencyCoordinator, LedgerClient, MemoryStore,
};
use serde_json::{json, Value};

// ============================================================================
// Test Fixtures
// ============================================================================

struct FakeLedger {
    outcome: Mutex<ForwardOutcome>,
    forward_delay: Duration,
    forward_calls: AtomicUsize,
}

impl FakeLedger {
    fn new(outcome: ForwardOutcome) -> Arc<Self> {
        Self::with_delay(outcome, Duration::ZERO)
    }

    fn with_delay(outcome: ForwardOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            forward_delay: delay,
            forward_calls: AtomicUsize::new(0),
        })
    }

    fn set_outcome(&self, outcome: ForwardOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    fn calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn forward(&self, _event: &EvidenceEvent) -> ForwardOutcome {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        if !self.forward_delay.is_zero() {
            tokio::time::sleep(self.forward_delay).await;
        }
        self.outcome.lock().unwrap().clone()
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn base_url(&self) -> &str {
        "http://ledger.test"
    }
}

fn gateway_with_ttl(ledger: Arc<FakeLedger>, ttl: Duration) -> TestServer {
    let coordinator = Arc::new(IdempotencyCoordinator::new(
        Arc::new(MemoryStore::new()),
        ttl,
    ));
    TestServer::new(build_router(AppState {
        coordinator,
        ledger,
    }))
    .unwrap()
}

fn gateway(ledger: Arc<FakeLedger>) -> TestServer {
    gateway_with_ttl(ledger, Duration::from_secs(300))
}

fn sample_event() -> Value {
    json!({
        "schemaVersion": 1,
        "eventId": "11111111-1111-1111-1111-111111111111",
        "projectId": "proofpulse-core",
        "artifactId": "repo:proofpulse/service:ledger",
        "source": "ci",
        "timestamp": "2024-01-01T00:00:00Z",
        "type": "build",
        "payload": {}
    })
}

async fn submit(server: &TestServer, key: &str) -> TestResponse {
    server
        .post("/events")
        .add_header(
            HeaderName::from_static("idempotency-key"),
            HeaderValue::from_str(key).unwrap(),
        )
        .json(&sample_event())
        .await
}

// ============================================================================
// Sequential replay
// ============================================================================

#[tokio::test]
async fn replay_returns_byte_identical_response_with_single_forward() {
    let ledger = FakeLedger::new(ForwardOutcome::Accepted);
    let server = gateway(ledger.clone());

    let first = submit(&server, "abc").await;
    first.assert_status(StatusCode::CREATED);

    let second = submit(&server, "abc").await;
    second.assert_status(StatusCode::CREATED);

    assert_eq!(first.text(), second.text());
    assert_eq!(ledger.calls(), 1);
}

#[tokio::test]
async fn distinct_keys_are_independent() {
    let ledger = FakeLedger::new(ForwardOutcome::Accepted);
    let server = gateway(ledger.clone());

    submit(&server, "key-one").await.assert_status(StatusCode::CREATED);

    // Same event under a new key reaches the ledger, whose duplicate-eventId
    // check must surface as 409 rather than being masked by the cache.
    ledger.set_outcome(ForwardOutcome::Conflict);
    let second = submit(&server, "key-two").await;
    second.assert_status(StatusCode::CONFLICT);
    assert_eq!(ledger.calls(), 2);
}

// ============================================================================
// Failures are not cached
// ============================================================================

#[tokio::test]
async fn unreachable_failure_is_not_cached() {
    let ledger = FakeLedger::new(ForwardOutcome::Unreachable {
        detail: "connection refused".to_string(),
    });
    let server = gateway(ledger.clone());

    submit(&server, "abc")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    // The ledger comes back; a retry with the same key must re-forward.
    ledger.set_outcome(ForwardOutcome::Accepted);
    submit(&server, "abc").await.assert_status(StatusCode::CREATED);
    assert_eq!(ledger.calls(), 2);
}

#[tokio::test]
async fn rejection_is_not_cached() {
    let ledger = FakeLedger::new(ForwardOutcome::Rejected {
        reason: "bad timestamp".to_string(),
    });
    let server = gateway(ledger.clone());

    submit(&server, "abc").await.assert_status(StatusCode::BAD_REQUEST);

    ledger.set_outcome(ForwardOutcome::Accepted);
    submit(&server, "abc").await.assert_status(StatusCode::CREATED);
    assert_eq!(ledger.calls(), 2);
}

// ============================================================================
// TTL expiry
// ============================================================================

#[tokio::test]
async fn replay_after_ttl_expiry_forwards_again() {
    let ledger = FakeLedger::new(ForwardOutcome::Accepted);
    let server = gateway_with_ttl(ledger.clone(), Duration::from_millis(50));

    submit(&server, "abc").await.assert_status(StatusCode::CREATED);
    submit(&server, "abc").await.assert_status(StatusCode::CREATED);
    assert_eq!(ledger.calls(), 1, "replay within TTL must not forward");

    tokio::time::sleep(Duration::from_millis(120)).await;

    submit(&server, "abc").await.assert_status(StatusCode::CREATED);
    assert_eq!(ledger.calls(), 2, "expired key must forward again");
}

// ============================================================================
// Concurrent duplicates
// ============================================================================

#[tokio::test]
async fn concurrent_same_key_submissions_forward_once() {
    let ledger = FakeLedger::with_delay(ForwardOutcome::Accepted, Duration::from_millis(50));
    let server = Arc::new(gateway(ledger.clone()));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let server = Arc::clone(&server);
        handles.push(tokio::spawn(async move {
            let response = submit(&server, "racing").await;
            (response.status_code(), response.text())
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        bodies.push(body);
    }

    assert_eq!(ledger.calls(), 1, "only one forward for concurrent duplicates");
    assert!(
        bodies.windows(2).all(|w| w[0] == w[1]),
        "all callers must observe the same stored response"
    );
}
