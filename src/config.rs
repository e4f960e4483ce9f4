//! Configuration management for the gateway
//!
//! Three JSON files live in the user config directory
//! (`~/.config/llm-kickstart` on Linux):
//!
//! - `llm_config.json`: ordered list of named endpoint configurations, each
//!   mapping backend flags to string values
//! - `app_config.json`: path to the backend inference executable
//! - `rag_server_config.json`: gateway/retrieval settings
//!
//! Every loader writes a default file when the file is missing, then reads
//! it back, so a fresh installation is immediately editable. Values are kept
//! as strings on disk (the format predates this implementation); typed
//! accessors parse them with sane fallbacks.

use crate::error::{KickstartError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "llm-kickstart";

/// File holding the endpoint list
pub const ENDPOINT_CONFIG_FILE: &str = "llm_config.json";

/// File holding the application config
pub const APP_CONFIG_FILE: &str = "app_config.json";

/// File holding the gateway/retrieval config
pub const GATEWAY_CONFIG_FILE: &str = "rag_server_config.json";

/// Snapshot of supervised processes, written by the supervisor
pub const PROCESS_LIST_FILE: &str = "process_list.json";

/// Resolve the default config directory
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or_else(|| KickstartError::Config("no user config directory available".to_string()))
}

/// Gateway and retrieval settings (`rag_server_config.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base directory tried for document paths that do not exist verbatim
    #[serde(rename = "rag-document-base-dir")]
    pub document_base_dir: String,

    /// Link depth for `/deep` website crawls ("1" or "2")
    #[serde(rename = "website-crawl-depth")]
    pub website_crawl_depth: String,

    /// Number of chunks retrieved per query
    #[serde(rename = "rag-chunk-count")]
    pub chunk_count: String,

    /// Rewrite the search query through the backend before retrieval
    #[serde(rename = "enable-query-optimization")]
    pub enable_query_optimization: String,

    /// Port the gateway proxy listens on
    #[serde(rename = "rag-proxy-serve-port")]
    pub serve_port: String,

    /// Port of the backend inference server
    #[serde(rename = "llm-server-port")]
    pub backend_port: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            document_base_dir: "~/llm-kickstart/documents".to_string(),
            website_crawl_depth: "2".to_string(),
            chunk_count: "5".to_string(),
            enable_query_optimization: "False".to_string(),
            serve_port: "4001".to_string(),
            backend_port: "4000".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Document base directory with a leading `~` expanded
    pub fn document_base(&self) -> PathBuf {
        expand_home(&self.document_base_dir)
    }

    /// Crawl depth for deep website ingestion, clamped to the supported range
    pub fn crawl_depth(&self) -> usize {
        self.website_crawl_depth
            .trim()
            .parse::<usize>()
            .unwrap_or(2)
            .clamp(1, 2)
    }

    /// Retrieved chunk count `k`, clamped to the supported 4..=10 range
    pub fn retrieval_chunk_count(&self) -> usize {
        self.chunk_count
            .trim()
            .parse::<usize>()
            .unwrap_or(5)
            .clamp(4, 10)
    }

    pub fn query_optimization_enabled(&self) -> bool {
        self.enable_query_optimization.trim().eq_ignore_ascii_case("true")
    }

    pub fn proxy_port(&self) -> u16 {
        self.serve_port.trim().parse().unwrap_or(4001)
    }

    pub fn llm_server_port(&self) -> u16 {
        self.backend_port.trim().parse().unwrap_or(4000)
    }

    /// Base URL of the backend's OpenAI-compatible API
    pub fn backend_base_url(&self) -> String {
        format!("http://localhost:{}/v1", self.llm_server_port())
    }
}

/// Application settings (`app_config.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the llama-server executable launched for each endpoint
    #[serde(rename = "llama-server-path")]
    pub llama_server_path: String,

    /// Legacy switch kept for file compatibility; the python server
    /// bindings are not supported by this gateway
    #[serde(rename = "use-llama-server-python")]
    pub use_llama_server_python: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llama_server_path: "/usr/local/bin/llama-server".to_string(),
            use_llama_server_python: "False".to_string(),
        }
    }
}

impl AppConfig {
    pub fn python_server_requested(&self) -> bool {
        self.use_llama_server_python.trim().eq_ignore_ascii_case("true")
    }
}

/// A named backend endpoint: `name` plus an ordered map of backend flags.
///
/// Key order in the JSON file is preserved and determines argv order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,

    #[serde(flatten)]
    pub flags: serde_json::Map<String, Value>,
}

impl EndpointConfig {
    /// Build the backend command line from the flag map.
    ///
    /// Rules: empty values and the literal `default` are omitted; `true`
    /// emits the bare flag, `false` emits nothing; everything else emits
    /// `--key value`.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (key, value) in &self.flags {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            };

            if value.is_empty() || value.eq_ignore_ascii_case("default") {
                continue;
            }

            let arg_key = format!("--{key}");
            if value.eq_ignore_ascii_case("true") {
                args.push(arg_key);
            } else if value.eq_ignore_ascii_case("false") {
                // absent flag
            } else {
                args.push(arg_key);
                args.push(value);
            }
        }
        args
    }
}

fn default_endpoints() -> Vec<EndpointConfig> {
    let mut flags = serde_json::Map::new();
    for (key, value) in [
        ("ip", ""),
        ("port", "4000"),
        ("model", "llm_model.gguf"),
        ("ctx-size", ""),
        ("flash-attn", ""),
        ("no-kv-offload", ""),
        ("no-mmap", ""),
        ("cache-type-k", ""),
        ("cache-type-v", ""),
        ("n-gpu-layers", ""),
        ("lora", ""),
        ("no-context-shift", ""),
        ("api-key", ""),
    ] {
        flags.insert(key.to_string(), Value::String(value.to_string()));
    }
    vec![EndpointConfig {
        name: "Local_LLM_Model".to_string(),
        flags,
    }]
}

/// Accessor for the gateway's config files in a single directory.
///
/// Each load writes the default file first if none exists.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Open the default user config directory, creating it if needed
    pub fn open_default() -> Result<Self> {
        let dir = default_config_dir()?;
        std::fs::create_dir_all(&dir)?;
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn process_list_path(&self) -> PathBuf {
        self.dir.join(PROCESS_LIST_FILE)
    }

    pub fn load_gateway_config(&self) -> Result<GatewayConfig> {
        load_or_init(&self.dir.join(GATEWAY_CONFIG_FILE), GatewayConfig::default)
    }

    pub fn load_app_config(&self) -> Result<AppConfig> {
        load_or_init(&self.dir.join(APP_CONFIG_FILE), AppConfig::default)
    }

    pub fn load_endpoints(&self) -> Result<Vec<EndpointConfig>> {
        load_or_init(&self.dir.join(ENDPOINT_CONFIG_FILE), default_endpoints)
    }

    /// Look up a single endpoint by name
    pub fn find_endpoint(&self, name: &str) -> Result<Option<EndpointConfig>> {
        Ok(self.load_endpoints()?.into_iter().find(|e| e.name == name))
    }
}

fn load_or_init<T, F>(path: &Path, default: F) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned,
    F: FnOnce() -> T,
{
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let initial = default();
        std::fs::write(path, serde_json::to_string_pretty(&initial)?)?;
        tracing::info!(path = %path.display(), "created default config file");
        return Ok(initial);
    }

    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        KickstartError::Config(format!("failed to parse {}: {e}", path.display()))
    })
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
