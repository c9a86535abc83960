mod store;

use std::net::SocketAddr;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use poll_gateway::proof::{normalize_key, user_identifier_key};
use poll_gateway::ProofSubmission;
use serde::Deserialize;
use serde_json::{json, Value};
use store::ProofStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting proof relay service");

    let app = router(ProofStore::new());

    // Run the server
    let port = env_parse("PORT", 3000u16);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(store: ProofStore) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/proof", post(store_proof).get(fetch_proof))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Parse an environment variable into a type implementing FromStr, with a
/// default fallback.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Handle POST /proof: derive the storage key from the public signals and
/// keep the blob, unread, until the voter comes back for it.
async fn store_proof(
    State(store): State<ProofStore>,
    Json(submission): Json<ProofSubmission>,
) -> Result<Json<Value>, StatusCode> {
    info!("POST /proof - proof submission received");

    let Some(key) = user_identifier_key(&submission.public_signals) else {
        info!("Rejecting submission without a readable user identifier signal");
        return Err(StatusCode::BAD_REQUEST);
    };

    store.put(&key, submission);
    info!("Stored proof under key {}", key);

    Ok(Json(json!({
        "status": "success",
        "result": true,
    })))
}

#[derive(Debug, Deserialize)]
struct FetchQuery {
    address: String,
}

/// Handle GET /proof?address=...: a miss (never stored, or expired) is a
/// normal response, not an error.
async fn fetch_proof(
    State(store): State<ProofStore>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<Value>, StatusCode> {
    let key = normalize_key(&query.address);
    info!("GET /proof - lookup for {}", key);

    match store.fetch(&key) {
        Some(record) => Ok(Json(json!({
            "status": "success",
            "proof": record.proof,
            "publicSignals": record.public_signals,
        }))),
        None => Ok(Json(json!({
            "status": "not_found",
        }))),
    }
}
