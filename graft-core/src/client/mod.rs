//! Solve client for a build executor.
//!
//! One [`Client`] owns one connection. [`Client::solve`] submits a marshalled
//! [`Definition`] and forwards the executor's progress to a status channel
//! until the solve reaches a terminal outcome.

mod endpoint;

pub use endpoint::{Endpoint, DEFAULT_ADDR};

use crate::error::{GraftError, Result, SubmissionError};
use crate::graph::Definition;
use crate::protocol::{
    read_frame, write_frame, ClientMessage, ExecutorMessage, ExportEntry, SolveRequest,
    SolveResponse,
};
use crate::status::SolveStatus;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Byte stream to an executor.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { endpoint: Endpoint::default(), connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

/// Per-solve options.
#[derive(Debug, Clone, Default)]
pub struct SolveOpt {
    /// Symbolic local directory name -> host path. Every local source in the
    /// graph needs an entry.
    pub local_dirs: BTreeMap<String, PathBuf>,
    pub frontend_attrs: BTreeMap<String, String>,
    pub exports: Vec<ExportEntry>,
    /// Reference for the request. A random one is generated when unset.
    pub solve_ref: Option<String>,
}

impl SolveOpt {
    pub fn with_local_dir(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.local_dirs.insert(name.into(), path.into());
        self
    }
}

pub struct Client {
    endpoint: Endpoint,
    conn: Box<dyn Connection>,
}

impl Client {
    /// Connect to the executor.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone();
        debug!(%endpoint, "connecting to executor");

        let conn = tokio::time::timeout(config.connect_timeout, dial(&endpoint))
            .await
            .map_err(|_| GraftError::Connection {
                endpoint: endpoint.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no connection after {:?}", config.connect_timeout),
                ),
            })?
            .map_err(|e| GraftError::Connection { endpoint: endpoint.to_string(), source: e })?;

        info!(%endpoint, "connected to executor");
        Ok(Self { endpoint, conn })
    }

    /// Wrap an already established stream.
    pub fn from_connection(endpoint: Endpoint, conn: Box<dyn Connection>) -> Self {
        Self { endpoint, conn }
    }

    /// Submit `def` and stream progress into `status_tx` until the executor
    /// reports an outcome.
    ///
    /// `status_tx` is consumed: it is dropped on every return path, which is
    /// what ends the status stream for the consumer. A closed receiver does
    /// not affect the solve. `cancel` is observed while the request is
    /// written, while waiting on the executor and while a status is waiting
    /// for room in the channel. Once the request is out, cancelling sends a
    /// best-effort cancel request. Either way [`GraftError::Cancelled`] is
    /// returned.
    ///
    /// Every bound path must be absolute.
    #[instrument(skip_all, fields(endpoint = %self.endpoint, ops = def.ops.len()))]
    pub async fn solve(
        &mut self,
        def: &Definition,
        opt: SolveOpt,
        status_tx: mpsc::Sender<SolveStatus>,
        cancel: CancellationToken,
    ) -> Result<SolveResponse> {
        if let Some(name) = def.local_names().into_iter().find(|n| !opt.local_dirs.contains_key(n))
        {
            return Err(SubmissionError::MissingLocalDir { name }.into());
        }
        if let Some((name, path)) = opt.local_dirs.iter().find(|(_, p)| !p.is_absolute()) {
            let (name, path) = (name.clone(), path.clone());
            return Err(SubmissionError::RelativeLocalDir { name, path }.into());
        }

        let solve_ref = opt.solve_ref.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let request = SolveRequest {
            solve_ref: solve_ref.clone(),
            definition: def.clone(),
            local_dirs: opt.local_dirs,
            frontend_attrs: opt.frontend_attrs,
            exports: opt.exports,
        };
        let submit = ClientMessage::Solve(request);
        tokio::select! {
            biased;
            // A half-written request cannot be followed by a cancel frame.
            _ = cancel.cancelled() => {
                warn!(%solve_ref, "solve cancelled before the request was sent");
                return Err(GraftError::Cancelled);
            }
            written = write_frame(&mut self.conn, &submit) => written?,
        }
        info!(%solve_ref, "solve submitted");

        let mut receiver_open = true;
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abandon(&solve_ref).await,
                frame = read_frame::<_, ExecutorMessage>(&mut self.conn) => frame?,
            };

            match message {
                Some(ExecutorMessage::Status(status)) if receiver_open => {
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.abandon(&solve_ref).await,
                        sent = status_tx.send(status) => sent,
                    };
                    if sent.is_err() {
                        debug!("status receiver closed, discarding further progress");
                        receiver_open = false;
                    }
                }
                Some(ExecutorMessage::Status(_)) => {}
                Some(ExecutorMessage::Done(response)) => {
                    info!(%solve_ref, "solve completed");
                    return Ok(response);
                }
                Some(ExecutorMessage::Failed(failure)) => {
                    warn!(%solve_ref, kind = ?failure.kind, message = %failure.message, "solve failed");
                    return Err(failure.into());
                }
                None => {
                    return Err(GraftError::Protocol(
                        "executor closed the connection before the solve finished".to_string(),
                    ));
                }
            }
        }
    }

    /// Ask the executor to stop `solve_ref`. Delivery is best effort.
    async fn abandon<T>(&mut self, solve_ref: &str) -> Result<T> {
        warn!(%solve_ref, "solve cancelled, notifying executor");
        let cancel_msg = ClientMessage::Cancel { solve_ref: solve_ref.to_string() };
        if let Err(e) = write_frame(&mut self.conn, &cancel_msg).await {
            debug!(error = %e, "cancel request not delivered");
        }
        Err(GraftError::Cancelled)
    }

    /// Shut down the write half of the connection.
    pub async fn close(mut self) {
        if let Err(e) = self.conn.shutdown().await {
            debug!(error = %e, "connection shutdown failed");
        }
    }
}

async fn dial(endpoint: &Endpoint) -> std::io::Result<Box<dyn Connection>> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}
