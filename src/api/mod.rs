//! HTTP server exposing the caller transport

pub mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::ResponseGenerator;
use crate::db::{AgentDirectory, ConversationStore};
use crate::session::SessionRegistry;
use crate::voice::{SpeechToText, TextToSpeech};
use crate::Result;

/// Shared state for connection handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub stt: Arc<dyn SpeechToText>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn TextToSpeech>,
    pub store: Arc<dyn ConversationStore>,
    pub directory: Arc<dyn AgentDirectory>,
}

/// Build the full router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(websocket::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serve the caller transport until the process exits
///
/// # Errors
///
/// Returns error if the listener cannot bind or the server fails
pub async fn serve(state: Arc<ApiState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "caller transport listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
