//! Retrieval arming state machine
//!
//! Replaces the original bag of booleans with a sum type: the proxy is
//! either **Idle** (no index, requests forward untouched) or **Armed**
//! (index populated, context injection active). The generation counter
//! increments on every successful ingest and survives disarming, which
//! makes index replacement observable to tests.

use chrono::{DateTime, Utc};

/// What kind of content the current index was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    File,
    Web,
    Clipboard,
}

/// Proxy-wide retrieval state
#[derive(Debug, Clone)]
pub enum RetrievalState {
    Idle {
        generation: u64,
    },
    Armed {
        generation: u64,
        mode: IngestMode,
        /// Paths or URLs the index was built from
        sources: Vec<String>,
        updated_at: DateTime<Utc>,
    },
}

impl RetrievalState {
    pub fn new() -> Self {
        RetrievalState::Idle { generation: 0 }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, RetrievalState::Armed { .. })
    }

    pub fn generation(&self) -> u64 {
        match self {
            RetrievalState::Idle { generation } => *generation,
            RetrievalState::Armed { generation, .. } => *generation,
        }
    }

    /// Successful ingest: transition to Armed with a fresh generation
    pub fn arm(&mut self, mode: IngestMode, sources: Vec<String>) {
        *self = RetrievalState::Armed {
            generation: self.generation() + 1,
            mode,
            sources,
            updated_at: Utc::now(),
        };
    }

    /// Failed ingest, `/v1/disablerag`, or `/forgetcontext`. Idempotent.
    pub fn disarm(&mut self) {
        *self = RetrievalState::Idle {
            generation: self.generation(),
        };
    }
}

impl Default for RetrievalState {
    fn default() -> Self {
        Self::new()
    }
}
