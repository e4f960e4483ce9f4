//! Kickstart Gateway - OpenAI-compatible RAG proxy for a local backend
//!
//! Loads the config files from the user config directory (creating them
//! with defaults on first run), optionally auto-starts a named backend
//! endpoint, and serves the proxy until Ctrl-C. All supervised backend
//! processes are stopped on shutdown.
//!
//! Usage:
//!   kickstart-gateway [OPTIONS]
//!
//! Options:
//!   --config-dir <PATH>  Config directory (default: user config dir)
//!   --start <NAME>       Auto-start the named backend endpoint
//!   --port <PORT>        Override the configured proxy port

use anyhow::Context;
use llm_kickstart::backend::BackendClient;
use llm_kickstart::config::ConfigStore;
use llm_kickstart::crawler::WebCrawler;
use llm_kickstart::embedding::MiniLmEmbedder;
use llm_kickstart::proxy::{self, AppState};
use llm_kickstart::retrieval::RetrievalEngine;
use llm_kickstart::supervisor::ProcessSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Default)]
struct CliOptions {
    config_dir: Option<PathBuf>,
    start_endpoint: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> CliOptions {
    let mut options = CliOptions::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config-dir" => {
                if let Some(path) = args.next() {
                    options.config_dir = Some(PathBuf::from(path));
                }
            }
            "--start" => {
                if let Some(name) = args.next() {
                    options.start_endpoint = Some(name);
                }
            }
            "--port" => {
                if let Some(port) = args.next() {
                    if let Ok(port) = port.parse() {
                        options.port = Some(port);
                    }
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    options
}

fn print_help() {
    println!("Kickstart Gateway - OpenAI-compatible RAG proxy for a local backend");
    println!();
    println!("USAGE:");
    println!("    kickstart-gateway [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config-dir <PATH>  Config directory (default: user config dir)");
    println!("    --start <NAME>       Auto-start the named backend endpoint");
    println!("    --port <PORT>        Override the configured proxy port");
    println!("    --help, -h           Print this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_args();

    let store = match options.config_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create config dir {}", dir.display()))?;
            ConfigStore::new(dir)
        }
        None => ConfigStore::open_default().context("failed to open config directory")?,
    };
    info!(config_dir = %store.dir().display(), "using config directory");

    let config = store
        .load_gateway_config()
        .context("failed to load gateway config")?;
    std::fs::create_dir_all(config.document_base()).ok();

    let supervisor =
        Arc::new(ProcessSupervisor::new(store.clone()).context("failed to create supervisor")?);

    if let Some(name) = &options.start_endpoint {
        match supervisor.create(name).await {
            Ok(record) => info!(%name, pid = record.pid, "backend endpoint started"),
            Err(e) => error!(%name, error = %e, "failed to auto-start endpoint"),
        }
    }

    // Model load is blocking I/O plus allocation; keep it off the runtime
    let embedder = tokio::task::spawn_blocking(MiniLmEmbedder::load)
        .await?
        .context("failed to load the embedding model")?;

    let engine = RetrievalEngine::new(
        Arc::new(embedder),
        WebCrawler::new(WebCrawler::DEFAULT_TIMEOUT)?,
        config.document_base(),
    );
    let backend = BackendClient::new(config.backend_base_url())?;
    let port = options.port.unwrap_or_else(|| config.proxy_port());

    let state = AppState::new(engine, backend, config);
    let result = proxy::serve(state, port).await;

    info!("stopping supervised backend processes");
    supervisor.stop_all().await;

    result.context("gateway server failed")?;
    Ok(())
}
