//! Solve progress events and their consumer.
//!
//! The executor reports progress as batches ([`SolveStatus`]) of vertex
//! lifecycle updates, sub-step progress, captured logs and warnings. Events
//! for one vertex arrive in order; events for different vertices interleave.
//! The stream ends when the channel closes.

mod consumer;
mod display;

pub use consumer::{consume, spawn_consumer, StatusSummary};
pub use display::{PlainDisplay, ProgressMode, QuietDisplay, StatusDisplay, TtyDisplay};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Standard output stream id for [`VertexLog::stream`].
pub const STREAM_STDOUT: u8 = 1;
/// Standard error stream id for [`VertexLog::stream`].
pub const STREAM_STDERR: u8 = 2;

/// One batch of progress events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveStatus {
    #[serde(default)]
    pub vertexes: Vec<Vertex>,
    #[serde(default)]
    pub statuses: Vec<VertexStatus>,
    #[serde(default)]
    pub logs: Vec<VertexLog>,
    #[serde(default)]
    pub warnings: Vec<VertexWarning>,
}

impl SolveStatus {
    pub fn is_empty(&self) -> bool {
        self.vertexes.is_empty()
            && self.statuses.is_empty()
            && self.logs.is_empty()
            && self.warnings.is_empty()
    }
}

/// Lifecycle update for a graph vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub digest: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Where a vertex is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexState {
    Pending,
    Running,
    Cached,
    Completed,
    Errored,
}

impl VertexState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VertexState::Cached | VertexState::Completed | VertexState::Errored)
    }
}

impl Vertex {
    /// A pending vertex with no timing information.
    pub fn named(digest: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            inputs: Vec::new(),
            name: name.into(),
            cached: false,
            started: None,
            completed: None,
            error: None,
        }
    }

    pub fn state(&self) -> VertexState {
        if self.error.is_some() {
            VertexState::Errored
        } else if self.cached {
            VertexState::Cached
        } else if self.completed.is_some() {
            VertexState::Completed
        } else if self.started.is_some() {
            VertexState::Running
        } else {
            VertexState::Pending
        }
    }

    /// Wall time between start and completion, if both are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started, self.completed) {
            (Some(started), Some(completed)) => (completed - started).to_std().ok(),
            _ => None,
        }
    }
}

/// Progress of a sub-step of a vertex (e.g. bytes transferred).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexStatus {
    pub id: String,
    pub vertex: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
}

/// Raw output captured from a vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexLog {
    pub vertex: String,
    pub stream: u8,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl VertexLog {
    pub fn stdout(vertex: impl Into<String>, data: Vec<u8>) -> Self {
        Self { vertex: vertex.into(), stream: STREAM_STDOUT, data, timestamp: None }
    }

    pub fn stderr(vertex: impl Into<String>, data: Vec<u8>) -> Self {
        Self { vertex: vertex.into(), stream: STREAM_STDERR, data, timestamp: None }
    }
}

/// Non-fatal diagnostic attached to a vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexWarning {
    pub vertex: String,
    #[serde(default)]
    pub level: i64,
    pub short: String,
    #[serde(default)]
    pub detail: Vec<String>,
}

/// Serde bridge for `Vec<u8>` via standard base64.
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
