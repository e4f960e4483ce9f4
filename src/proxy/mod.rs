//! Request-augmentation proxy
//!
//! An OpenAI-compatible HTTP server in front of the backend inference
//! process. Requests forward unchanged while retrieval is Idle; once an
//! ingest arms retrieval, the chat handler injects a context message
//! synthesized from the vector index and appends source attributions to
//! the response.
//!
//! All shared state lives on [`AppState`] and is threaded through the
//! handlers; there are no process-wide globals. The retrieval engine sits
//! behind a read-write lock: ingestion is exclusive, queries share the
//! lock and block while an ingest is rebuilding the index.

pub mod commands;
pub mod handlers;
pub mod state;
pub mod stream;

use crate::backend::BackendClient;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::retrieval::RetrievalEngine;
use axum::routing::{get, post};
use axum::Router;
use state::RetrievalState;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The retrieval engine; write lock for ingest, read lock for queries
    pub engine: Arc<RwLock<RetrievalEngine>>,
    /// Retrieval arming state machine
    pub retrieval: Arc<RwLock<RetrievalState>>,
    /// Client for the backend inference server
    pub backend: Arc<BackendClient>,
    /// Gateway settings
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(engine: RetrievalEngine, backend: BackendClient, config: GatewayConfig) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            retrieval: Arc::new(RwLock::new(RetrievalState::new())),
            backend: Arc::new(backend),
            config: Arc::new(config),
        }
    }
}

/// Build the `/v1` router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/testmessage", get(handlers::test_message))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/disablerag", get(handlers::disable_rag))
        .route("/v1/ragupdatepdf", post(handlers::rag_update_pdf))
        .route("/v1/ragupdateweb", post(handlers::rag_update_web))
        .route("/v1/ragupdatetext", post(handlers::rag_update_text))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the gateway until Ctrl-C
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "gateway proxy listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
