//! Backend process supervision
//!
//! Launches, tracks, and terminates backend inference processes by
//! endpoint name. Every child is started in its own process group so a
//! stop reaches worker processes the backend may have forked; a single-PID
//! signal would leak them. Teardown sends SIGTERM to the whole group,
//! waits up to five seconds, then force-kills the group.
//!
//! Supervisor operations are serialized through one mutex; the process
//! table has at most one live record per name. A `process_list.json`
//! snapshot is written to the config directory after every mutation.

use crate::config::{AppConfig, ConfigStore, EndpointConfig};
use crate::error::{Result, SupervisorError};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Grace period between SIGTERM and SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Stopped,
}

/// Snapshot of one supervised process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRecord {
    pub name: String,
    pub pid: u32,
    pub status: ProcessStatus,
}

/// A running backend child owning its OS handle.
///
/// Teardown must go through [`ProcessSupervisor::stop`], which signals the
/// process group; dropping the handle alone would leave the group running.
struct BackendProcess {
    child: Child,
    pid: u32,
}

impl BackendProcess {
    fn status(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(Some(_)) => ProcessStatus::Stopped,
            _ => ProcessStatus::Running,
        }
    }
}

struct SupervisorState {
    app_config: AppConfig,
    endpoints: Vec<EndpointConfig>,
    processes: HashMap<String, BackendProcess>,
}

/// Launches and tears down backend inference processes
pub struct ProcessSupervisor {
    store: ConfigStore,
    state: Mutex<SupervisorState>,
}

impl ProcessSupervisor {
    /// Create a supervisor over the given config store, loading the
    /// endpoint list and app config from disk.
    pub fn new(store: ConfigStore) -> Result<Self> {
        let app_config = store.load_app_config()?;
        let endpoints = store.load_endpoints()?;
        Ok(Self {
            store,
            state: Mutex::new(SupervisorState {
                app_config,
                endpoints,
                processes: HashMap::new(),
            }),
        })
    }

    /// Start the named endpoint in its own process group.
    ///
    /// Fails when the name is already tracked, unknown, or the backend
    /// executable is missing; state is unchanged on failure.
    pub async fn create(&self, name: &str) -> Result<ProcessRecord> {
        let mut state = self.state.lock().await;

        if state.processes.contains_key(name) {
            return Err(SupervisorError::NameConflict(name.to_string()).into());
        }

        let endpoint = state
            .endpoints
            .iter()
            .find(|endpoint| endpoint.name == name)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownEndpoint(name.to_string()))?;

        if state.app_config.python_server_requested() {
            warn!("python server bindings are not supported, launching the native executable");
        }

        let executable = state.app_config.llama_server_path.clone();
        if !Path::new(&executable).exists() {
            return Err(SupervisorError::ExecutableMissing(executable).into());
        }

        let args = endpoint.build_args();
        info!(name, %executable, ?args, "starting backend process");

        let mut command = Command::new(&executable);
        command.args(&args);
        // New process group so stop can signal the backend and any workers
        // it forks without reaching the gateway itself
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| SupervisorError::SpawnFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let pid = child.id().unwrap_or_default();

        state
            .processes
            .insert(name.to_string(), BackendProcess { child, pid });
        info!(name, pid, "backend process started");

        Self::write_process_list(&self.store, &mut state);
        Ok(ProcessRecord {
            name: name.to_string(),
            pid,
            status: ProcessStatus::Running,
        })
    }

    /// Stop the named process and drop its record.
    ///
    /// Signals the entire process group, waits up to five seconds, then
    /// force-kills the group. Safe to call on already-exited processes.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut process) = state.processes.remove(name) else {
            return Err(SupervisorError::UnknownProcess(name.to_string()).into());
        };

        if let Ok(Some(exit)) = process.child.try_wait() {
            info!(name, %exit, "process had already exited");
        } else {
            signal_group(process.pid, Signal::Term);
            match tokio::time::timeout(STOP_GRACE, process.child.wait()).await {
                Ok(Ok(exit)) => info!(name, %exit, "process stopped"),
                Ok(Err(e)) => warn!(name, error = %e, "failed to reap process"),
                Err(_) => {
                    warn!(name, pid = process.pid, "grace period elapsed, killing process group");
                    signal_group(process.pid, Signal::Kill);
                    let _ = process.child.wait().await;
                }
            }
        }

        Self::write_process_list(&self.store, &mut state);
        Ok(())
    }

    /// Stop, re-read the config files, and start again under the same name
    pub async fn restart(&self, name: &str) -> Result<ProcessRecord> {
        if let Err(e) = self.stop(name).await {
            warn!(name, error = %e, "restart: nothing to stop");
        }
        self.refresh_config().await?;
        self.create(name).await
    }

    /// Stop every tracked process
    pub async fn stop_all(&self) {
        let names: Vec<String> = {
            let state = self.state.lock().await;
            state.processes.keys().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(%name, error = %e, "failed to stop process");
            }
        }
    }

    /// Snapshot of all records with freshly polled statuses
    pub async fn list(&self) -> Vec<ProcessRecord> {
        let mut state = self.state.lock().await;
        let mut records: Vec<ProcessRecord> = state
            .processes
            .iter_mut()
            .map(|(name, process)| ProcessRecord {
                name: name.clone(),
                pid: process.pid,
                status: process.status(),
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        Self::write_process_list(&self.store, &mut state);
        records
    }

    /// Re-read the endpoint list and app config from disk
    pub async fn refresh_config(&self) -> Result<()> {
        let app_config = self.store.load_app_config()?;
        let endpoints = self.store.load_endpoints()?;

        let mut state = self.state.lock().await;
        state.app_config = app_config;
        state.endpoints = endpoints;
        info!("supervisor configuration reloaded");
        Ok(())
    }

    fn write_process_list(store: &ConfigStore, state: &mut SupervisorState) {
        let mut list = serde_json::Map::new();
        for (name, process) in state.processes.iter_mut() {
            list.insert(
                name.clone(),
                json!({ "pid": process.pid, "status": process.status() }),
            );
        }

        let path = store.process_list_path();
        match serde_json::to_string_pretty(&list) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&path, content) {
                    warn!(path = %path.display(), error = %e, "failed to write process list");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize process list"),
        }
    }
}

enum Signal {
    Term,
    Kill,
}

/// Signal the child's entire process group. The child was spawned as its
/// own group leader, so its pid doubles as the group id.
#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    let signal = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    unsafe {
        libc::killpg(pid as i32, signal);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {}
