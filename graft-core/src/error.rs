//! Error types for graft.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.
//! Every variant is fatal to a run; [`GraftError::stage`] names the pipeline
//! stage the error belongs to so a single boundary can report it.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for graft operations.
pub type Result<T> = std::result::Result<T, GraftError>;

/// Main error type for graft.
#[derive(Error, Debug)]
pub enum GraftError {
    // Connection errors
    #[error("cannot reach executor at {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid executor address {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // Graph errors
    #[error("build graph cannot be marshalled: {reason}")]
    Serialization { reason: String },

    #[error("cannot write build definition")]
    SideChannelWrite {
        #[source]
        source: std::io::Error,
    },

    // Solve errors
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("solve cancelled")]
    Cancelled,

    #[error("solve did not finish within {after:?}")]
    Timeout { after: std::time::Duration },

    #[error("protocol error: {0}")]
    Protocol(String),

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures reported by the executor for an accepted connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("local directory {name:?} is referenced by the graph but has no binding")]
    MissingLocalDir { name: String },

    #[error("local directory {name:?} must be bound to an absolute path, got {path:?}")]
    RelativeLocalDir { name: String, path: PathBuf },

    #[error("step {vertex} failed{}: {message}", exit_suffix(.exit_code))]
    CommandFailed { vertex: String, exit_code: Option<i32>, message: String },

    #[error("executor rejected the request: {message}")]
    Rejected { message: String },
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Connect,
    Marshal,
    Write,
    Solve,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Connect => "connect",
            Stage::Marshal => "marshal",
            Stage::Write => "write",
            Stage::Solve => "solve",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GraftError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            GraftError::Connection { .. } | GraftError::InvalidEndpoint { .. } => Stage::Connect,
            GraftError::Serialization { .. } => Stage::Marshal,
            GraftError::SideChannelWrite { .. } => Stage::Write,
            GraftError::Submission(_)
            | GraftError::Cancelled
            | GraftError::Timeout { .. }
            | GraftError::Protocol(_)
            | GraftError::Internal(_) => Stage::Solve,
            GraftError::InvalidConfig { .. } | GraftError::IoError { .. } => Stage::Configure,
        }
    }
}

impl From<serde_json::Error> for GraftError {
    fn from(err: serde_json::Error) -> Self {
        GraftError::Serialization { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_attribution() {
        let err = GraftError::Connection {
            endpoint: "tcp://127.0.0.1:1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.stage(), Stage::Connect);

        let err = GraftError::Serialization { reason: "empty command".to_string() };
        assert_eq!(err.stage(), Stage::Marshal);

        let err = GraftError::SideChannelWrite {
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert_eq!(err.stage(), Stage::Write);

        let err: GraftError = SubmissionError::Rejected { message: "busy".to_string() }.into();
        assert_eq!(err.stage(), Stage::Solve);
        assert_eq!(GraftError::Cancelled.stage(), Stage::Solve);
    }

    #[test]
    fn test_relative_local_dir_message() {
        let err: GraftError = SubmissionError::RelativeLocalDir {
            name: "src".to_string(),
            path: PathBuf::from("project"),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "local directory \"src\" must be bound to an absolute path, got \"project\""
        );
        assert_eq!(err.stage(), Stage::Solve);
    }

    #[test]
    fn test_command_failed_message() {
        let err = SubmissionError::CommandFailed {
            vertex: "go build".to_string(),
            exit_code: Some(2),
            message: "compile error".to_string(),
        };
        assert_eq!(err.to_string(), "step go build failed with exit code 2: compile error");

        let err = SubmissionError::CommandFailed {
            vertex: "go build".to_string(),
            exit_code: None,
            message: "killed".to_string(),
        };
        assert_eq!(err.to_string(), "step go build failed: killed");
    }

    #[test]
    fn test_bad_address_is_a_connect_failure() {
        let err = GraftError::InvalidEndpoint {
            endpoint: "localhost".to_string(),
            reason: "expected tcp://host:port or unix:///path".to_string(),
        };
        assert_eq!(err.stage(), Stage::Connect);
    }

    #[test]
    fn test_io_cause_reported_once_in_chain() {
        let err = GraftError::Connection {
            endpoint: "tcp://127.0.0.1:1".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "cannot reach executor at tcp://127.0.0.1:1");

        let mut chain = Vec::new();
        let mut current: Option<&dyn std::error::Error> = Some(&err);
        while let Some(e) = current {
            chain.push(e.to_string());
            current = e.source();
        }
        assert_eq!(chain.join(": "), "cannot reach executor at tcp://127.0.0.1:1: refused");

        let err = GraftError::SideChannelWrite {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"),
        };
        assert!(!err.to_string().contains("broken pipe"));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Marshal.to_string(), "marshal");
        assert_eq!(Stage::Configure.as_str(), "configure");
    }
}
