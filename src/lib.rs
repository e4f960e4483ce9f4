//! LLM Kickstart Gateway Library
//!
//! A local, OpenAI-compatible HTTP gateway that integrates:
//! - A retrieval engine indexing PDFs and web crawls into an in-memory
//!   HNSW vector index
//! - A request-augmentation proxy that injects retrieved context into
//!   chat completions and relays backend streams with source attributions
//! - A process supervisor that launches and tears down backend inference
//!   processes with process-group cleanup
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_kickstart::backend::BackendClient;
//! use llm_kickstart::config::GatewayConfig;
//! use llm_kickstart::crawler::WebCrawler;
//! use llm_kickstart::embedding::MiniLmEmbedder;
//! use llm_kickstart::proxy::{self, AppState};
//! use llm_kickstart::retrieval::RetrievalEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::default();
//!     let engine = RetrievalEngine::new(
//!         Arc::new(MiniLmEmbedder::load()?),
//!         WebCrawler::new(WebCrawler::DEFAULT_TIMEOUT)?,
//!         config.document_base(),
//!     );
//!     let backend = BackendClient::new(config.backend_base_url())?;
//!     let port = config.proxy_port();
//!     proxy::serve(AppState::new(engine, backend, config), port).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chunker;
pub mod config;
pub mod crawler;
pub mod embedding;
pub mod error;
pub mod index;
pub mod pdf;
pub mod proxy;
pub mod retrieval;
pub mod supervisor;

// Re-export main types
pub use backend::BackendClient;
pub use chunker::TextSplitter;
pub use config::{AppConfig, ConfigStore, EndpointConfig, GatewayConfig};
pub use crawler::{CrawledPage, WebCrawler};
pub use embedding::{Embedder, HashingEmbedder, MiniLmEmbedder, EMBEDDING_DIM};
pub use error::{KickstartError, Result};
pub use index::VectorIndex;
pub use proxy::state::{IngestMode, RetrievalState};
pub use proxy::AppState;
pub use retrieval::{RetrievalEngine, ScoredChunk};
pub use supervisor::{ProcessRecord, ProcessStatus, ProcessSupervisor};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
