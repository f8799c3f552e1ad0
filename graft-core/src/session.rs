//! One end-to-end run: connect, marshal, emit, solve.
//!
//! ```text
//! connect ─► marshal ─► side channel ─► spawn consumer ─► solve ─► join consumer
//! ```
//!
//! The connection is closed on every path once it is open. The consumer is
//! joined before the outcome is returned, so every event that preceded the
//! outcome has been displayed by then.

use crate::client::{Client, ClientConfig, SolveOpt};
use crate::error::{GraftError, Result};
use crate::graph::{Definition, State};
use crate::observability::metrics;
use crate::protocol::SolveResponse;
use crate::status::{spawn_consumer, StatusDisplay, StatusSummary};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default capacity of the status channel.
pub const DEFAULT_STATUS_BUFFER: usize = 64;

/// What to do when the definition cannot be written to the side channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideChannelPolicy {
    /// Abort the run before submitting.
    #[default]
    Fail,
    /// Log the failure and submit anyway.
    Warn,
}

impl FromStr for SideChannelPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(SideChannelPolicy::Fail),
            "warn" => Ok(SideChannelPolicy::Warn),
            other => Err(format!("unknown side channel policy {:?} (expected fail or warn)", other)),
        }
    }
}

impl fmt::Display for SideChannelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SideChannelPolicy::Fail => f.write_str("fail"),
            SideChannelPolicy::Warn => f.write_str("warn"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub client: ClientConfig,
    /// Deadline for the solve itself. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub side_channel: SideChannelPolicy,
    pub status_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            timeout: None,
            side_channel: SideChannelPolicy::default(),
            status_buffer: DEFAULT_STATUS_BUFFER,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub response: SolveResponse,
    pub summary: StatusSummary,
    pub duration: Duration,
}

/// Run one solve of `state` against the configured executor.
///
/// The marshalled definition is written to `side_channel` before anything is
/// submitted. `display` receives every status event of the solve.
pub async fn run_solve<W, D>(
    config: &SessionConfig,
    state: &State,
    opt: SolveOpt,
    side_channel: &mut W,
    display: D,
    cancel: CancellationToken,
) -> Result<SolveReport>
where
    W: Write + ?Sized,
    D: StatusDisplay + Send + 'static,
{
    let start = Instant::now();
    let result = run(config, state, opt, side_channel, display, cancel)
        .await
        .map(|(response, summary)| SolveReport { response, summary, duration: start.elapsed() });
    let duration = start.elapsed();

    match &result {
        Ok(report) => {
            metrics::record_solve(duration, "success");
            info!(
                duration_ms = duration.as_millis() as u64,
                vertices = report.summary.vertices,
                cached = report.summary.cached,
                "solve finished"
            );
        }
        Err(e) => {
            metrics::record_solve(duration, "failure");
            metrics::record_solve_failure(e.stage());
            warn!(stage = %e.stage(), error = %e, "solve aborted");
        }
    }

    result
}

async fn run<W, D>(
    config: &SessionConfig,
    state: &State,
    opt: SolveOpt,
    side_channel: &mut W,
    display: D,
    cancel: CancellationToken,
) -> Result<(SolveResponse, StatusSummary)>
where
    W: Write + ?Sized,
    D: StatusDisplay + Send + 'static,
{
    let mut client = Client::connect(&config.client).await?;
    let result = submit(&mut client, config, state, opt, side_channel, display, cancel).await;
    client.close().await;
    result
}

async fn submit<W, D>(
    client: &mut Client,
    config: &SessionConfig,
    state: &State,
    opt: SolveOpt,
    side_channel: &mut W,
    display: D,
    cancel: CancellationToken,
) -> Result<(SolveResponse, StatusSummary)>
where
    W: Write + ?Sized,
    D: StatusDisplay + Send + 'static,
{
    let def = Definition::marshal(state)?;

    if let Err(e) = def.write_to(side_channel) {
        match config.side_channel {
            SideChannelPolicy::Fail => return Err(e),
            SideChannelPolicy::Warn => warn!(error = %e, "definition not written, submitting anyway"),
        }
    }

    let (tx, rx) = mpsc::channel(config.status_buffer.max(1));
    let consumer = spawn_consumer(rx, display);

    let solve_cancel = cancel.child_token();
    let timer = config.timeout.map(|timeout| {
        let token = solve_cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            token.cancel();
        })
    });

    let outcome = client.solve(&def, opt, tx, solve_cancel).await;
    if let Some(timer) = timer {
        timer.abort();
    }

    // The sender was dropped inside solve, so the consumer is draining to the end.
    // A failed display never changes the outcome of the solve.
    let summary = match consumer.await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "status consumer failed, progress output is incomplete");
            StatusSummary::default()
        }
    };

    let outcome = match (outcome, config.timeout) {
        (Err(GraftError::Cancelled), Some(timeout)) if !cancel.is_cancelled() => {
            Err(GraftError::Timeout { after: timeout })
        }
        (outcome, _) => outcome,
    };
    outcome.map(|response| (response, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_channel_policy_parse() {
        assert_eq!("fail".parse::<SideChannelPolicy>().unwrap(), SideChannelPolicy::Fail);
        assert_eq!("WARN".parse::<SideChannelPolicy>().unwrap(), SideChannelPolicy::Warn);
        assert!("ignore".parse::<SideChannelPolicy>().is_err());
        assert_eq!(SideChannelPolicy::default(), SideChannelPolicy::Fail);
    }

    #[test]
    fn test_policy_serde_lowercase() {
        let json = serde_json::to_string(&SideChannelPolicy::Warn).unwrap();
        assert_eq!(json, "\"warn\"");
    }
}
