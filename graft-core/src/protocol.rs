//! Wire protocol between the solve client and a build executor.
//!
//! # Wire Format
//!
//! All messages are length-prefixed:
//!
//! ```text
//! ┌─────────────────┬──────────────────────────────┐
//! │ Length (4 bytes)│ Message Body (variable)      │
//! │ big-endian      │ JSON                         │
//! └─────────────────┴──────────────────────────────┘
//! ```
//!
//! # Exchange
//!
//! ```text
//! client                         executor
//!   │── Solve(request) ───────────►│
//!   │◄────────────── Status(batch) │  zero or more
//!   │◄──────── Done(resp) | Failed │  exactly one
//!   │── Cancel(ref) ──────────────►│  only when the caller gives up
//! ```

use crate::error::{GraftError, Result, SubmissionError};
use crate::graph::Definition;
use crate::status::SolveStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Solve(SolveRequest),
    Cancel { solve_ref: String },
}

/// Messages sent by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ExecutorMessage {
    Status(SolveStatus),
    Done(SolveResponse),
    Failed(SolveFailure),
}

/// A single solve request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    /// Unique reference for this request, used for cancellation.
    pub solve_ref: String,
    pub definition: Definition,
    /// Symbolic local directory name -> absolute path on the client host.
    pub local_dirs: BTreeMap<String, PathBuf>,
    /// Executor-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub frontend_attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<ExportEntry>,
}

/// Where the executor should put the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Exporter kind, e.g. `local` or `image`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

/// Successful result of a solve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveResponse {
    #[serde(default)]
    pub exporter_response: BTreeMap<String, String>,
}

/// Terminal failure reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Vertex digest or name the failure is attributed to.
    #[serde(default)]
    pub vertex: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingLocalDir,
    CommandFailed,
    Rejected,
    Internal,
}

impl From<SolveFailure> for GraftError {
    fn from(failure: SolveFailure) -> Self {
        match failure.kind {
            FailureKind::MissingLocalDir => SubmissionError::MissingLocalDir {
                name: failure.vertex.unwrap_or(failure.message),
            }
            .into(),
            FailureKind::CommandFailed => SubmissionError::CommandFailed {
                vertex: failure.vertex.unwrap_or_else(|| "<unknown>".to_string()),
                exit_code: failure.exit_code,
                message: failure.message,
            }
            .into(),
            FailureKind::Rejected => {
                SubmissionError::Rejected { message: failure.message }.into()
            }
            FailureKind::Internal => GraftError::Protocol(failure.message),
        }
    }
}

/// Encode a message body.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(GraftError::Protocol(format!(
            "message of {} bytes exceeds frame limit of {} bytes",
            body.len(),
            MAX_FRAME_LEN
        )));
    }
    Ok(body)
}

/// Decode a message body.
pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T> {
    serde_json::from_slice(buf).map_err(|e| GraftError::Protocol(format!("malformed message: {}", e)))
}

/// Send a message as one frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let bytes = encode(msg)?;

    // Send length prefix (4 bytes, big-endian)
    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| GraftError::Protocol(format!("Failed to send message length: {}", e)))?;

    writer
        .write_all(&bytes)
        .await
        .map_err(|e| GraftError::Protocol(format!("Failed to send message: {}", e)))?;

    writer
        .flush()
        .await
        .map_err(|e| GraftError::Protocol(format!("Failed to flush message: {}", e)))?;

    Ok(())
}

/// Receive one frame. Returns `None` when the peer closed the stream
/// between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(GraftError::Protocol(format!("Failed to read message length: {}", e)))
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(GraftError::Protocol(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, MAX_FRAME_LEN
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| GraftError::Protocol(format!("Failed to read message: {}", e)))?;

    decode(&buf).map(Some)
}
