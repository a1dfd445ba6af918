// proofpulse-gateway main.rs
// HTTP ingestion gateway in front of the ProofPulse ledger service

use std::sync::Arc;

use proofpulse_gateway::{
    build_router, AppState, GatewayConfig, HttpLedgerClient, IdempotencyCoordinator, MemoryStore,
};
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proofpulse_gateway=info".into()),
        )
        .init();

    let mut config = GatewayConfig::from_env();

    // CLI port override: --port / -p
    let args: Vec<String> = std::env::args().collect();
    if let Some(port) = args
        .iter()
        .position(|a| a == "--port" || a == "-p")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
    {
        config.port = port;
    }

    tracing::info!("📒 Ledger: {}", config.ledger_base_url);
    tracing::info!("⏱  Idempotency TTL: {:?}", config.idempotency_ttl);

    let ledger =
        Arc::new(HttpLedgerClient::new(&config).expect("Failed to build ledger HTTP client"));
    let coordinator = Arc::new(IdempotencyCoordinator::new(
        Arc::new(MemoryStore::new()),
        config.idempotency_ttl,
    ));
    let state = AppState {
        coordinator,
        ledger,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("🚀 ProofPulse ingestion gateway running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");
    tracing::info!("Shutting down...");
}
