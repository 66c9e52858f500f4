//! HTTP surface of the VeSync mock
//!
//! Every request except `/health` goes through a single fallback handler
//! into the [`Engine`], which answers with a `{code, msg, result}` envelope.
//! The HTTP status is always 200; failures are signalled by `code`, as the
//! vendor cloud does.

pub mod engine;
pub mod synthesizer;

pub use engine::{Engine, SetupError};
pub use synthesizer::{RenderContext, ResponseSynthesizer, Shape, ShapeRules, VendorShapes};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use vs_core::{EngineError, Mismatch, ResponseEnvelope};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server
pub async fn start_server(state: AppState, addr: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("VeSync mock listening on {}", addr);
    axum::serve(listener, router).await
}

// ==================== Handlers ====================

/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Any other method and path - run the engine
async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<ResponseEnvelope> {
    let envelope = match parse_body(&body) {
        Ok(body) => state
            .engine
            .handle(method.as_str(), uri.path(), &headers, &body),
        Err(err) => ResponseEnvelope::from_error(&err),
    };
    Json(envelope)
}

/// An empty body is `null`; anything else must be JSON
fn parse_body(body: &Bytes) -> Result<Value, EngineError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        EngineError::BodyFieldMismatch(vec![Mismatch::body("(body)", "valid JSON", e.to_string())])
    })
}
