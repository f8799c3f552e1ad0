//! Status consumer task.
//!
//! Drains the status channel for the lifetime of one solve and hands every
//! event to a [`StatusDisplay`]. It only observes: nothing it does can change
//! the outcome of the solve. It returns once the channel closes, which the
//! solve client guarantees on every exit path.

use crate::observability::metrics;
use crate::status::{SolveStatus, StatusDisplay, Vertex, VertexState};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Totals observed over one status stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    /// Batches received.
    pub batches: usize,
    /// Distinct vertices seen.
    pub vertices: usize,
    pub completed: usize,
    pub cached: usize,
    pub errored: usize,
    /// Vertices never reported in a terminal state.
    pub unfinished: usize,
    pub statuses: usize,
    pub logs: usize,
    pub log_bytes: usize,
    pub warnings: usize,
}

/// Spawn the consumer as its own task. Await the handle to join it.
pub fn spawn_consumer<D>(rx: mpsc::Receiver<SolveStatus>, display: D) -> JoinHandle<StatusSummary>
where
    D: StatusDisplay + Send + 'static,
{
    tokio::spawn(consume(rx, display))
}

/// Drain `rx` until it closes.
pub async fn consume<D>(mut rx: mpsc::Receiver<SolveStatus>, mut display: D) -> StatusSummary
where
    D: StatusDisplay,
{
    let mut tracker = Tracker::default();

    while let Some(status) = rx.recv().await {
        tracker.summary.batches += 1;
        metrics::record_status_batch(&status);

        for vertex in &status.vertexes {
            tracker.observe(vertex);
            display.vertex(vertex);
        }
        for vertex_status in &status.statuses {
            tracker.summary.statuses += 1;
            display.status(vertex_status);
        }
        for log in &status.logs {
            tracker.summary.logs += 1;
            tracker.summary.log_bytes += log.data.len();
            display.log(log);
        }
        for warning in &status.warnings {
            tracker.summary.warnings += 1;
            display.warning(warning);
        }
    }

    let summary = tracker.finish();
    debug!(?summary, "status stream closed");
    display.finish(&summary);
    summary
}

#[derive(Default)]
struct Tracker {
    states: HashMap<String, VertexState>,
    summary: StatusSummary,
}

impl Tracker {
    fn observe(&mut self, vertex: &Vertex) {
        let next = vertex.state();
        let entry = self.states.entry(vertex.digest.clone()).or_insert(next);
        // A terminal state is final; late non-terminal updates do not revert it.
        if !entry.is_terminal() || next.is_terminal() {
            *entry = next;
        }
    }

    fn finish(mut self) -> StatusSummary {
        self.summary.vertices = self.states.len();
        for state in self.states.values() {
            match state {
                VertexState::Completed => self.summary.completed += 1,
                VertexState::Cached => self.summary.cached += 1,
                VertexState::Errored => self.summary.errored += 1,
                VertexState::Pending | VertexState::Running => self.summary.unfinished += 1,
            }
        }
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{VertexLog, VertexStatus, VertexWarning};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    /// Records every dispatched event as a line.
    #[derive(Clone, Default)]
    struct Recorder {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl StatusDisplay for Recorder {
        fn vertex(&mut self, vertex: &Vertex) {
            self.lines.lock().unwrap().push(format!("vertex {} {:?}", vertex.name, vertex.state()));
        }
        fn status(&mut self, status: &VertexStatus) {
            self.lines.lock().unwrap().push(format!("status {} {}", status.id, status.current));
        }
        fn log(&mut self, log: &VertexLog) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("log {}", String::from_utf8_lossy(&log.data).trim_end()));
        }
        fn warning(&mut self, warning: &VertexWarning) {
            self.lines.lock().unwrap().push(format!("warning {}", warning.short));
        }
        fn finish(&mut self, _summary: &StatusSummary) {
            self.lines.lock().unwrap().push("finish".to_string());
        }
    }

    fn started(digest: &str, name: &str) -> Vertex {
        let mut vertex = Vertex::named(digest, name);
        vertex.started = Some(Utc::now());
        vertex
    }

    fn completed(digest: &str, name: &str) -> Vertex {
        let mut vertex = started(digest, name);
        vertex.completed = Some(Utc::now());
        vertex
    }

    #[tokio::test]
    async fn test_events_dispatched_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let recorder = Recorder::default();
        let handle = spawn_consumer(rx, recorder.clone());

        tx.send(SolveStatus { vertexes: vec![started("a", "first")], ..Default::default() })
            .await
            .unwrap();
        tx.send(SolveStatus {
            statuses: vec![VertexStatus {
                id: "pull".to_string(),
                vertex: "a".to_string(),
                name: String::new(),
                current: 10,
                total: 100,
                timestamp: None,
                started: None,
                completed: None,
            }],
            logs: vec![VertexLog::stdout("a", b"hello\n".to_vec())],
            warnings: vec![VertexWarning {
                vertex: "a".to_string(),
                level: 1,
                short: "deprecated".to_string(),
                detail: vec![],
            }],
            ..Default::default()
        })
        .await
        .unwrap();
        tx.send(SolveStatus { vertexes: vec![completed("a", "first")], ..Default::default() })
            .await
            .unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        let lines = recorder.lines.lock().unwrap().clone();
        assert_eq!(
            lines,
            vec![
                "vertex first Running",
                "status pull 10",
                "log hello",
                "warning deprecated",
                "vertex first Completed",
                "finish",
            ]
        );
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.vertices, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.log_bytes, 6);
    }

    #[tokio::test]
    async fn test_summary_counts_distinct_vertices() {
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_consumer(rx, Recorder::default());

        let mut cached = Vertex::named("b", "cached");
        cached.cached = true;
        let mut failed = started("c", "failed");
        failed.error = Some("exit code 1".to_string());

        tx.send(SolveStatus {
            vertexes: vec![started("a", "a"), completed("a", "a"), cached, failed],
            ..Default::default()
        })
        .await
        .unwrap();
        // A stale update after completion does not reopen the vertex.
        tx.send(SolveStatus { vertexes: vec![started("a", "a")], ..Default::default() })
            .await
            .unwrap();
        tx.send(SolveStatus { vertexes: vec![started("d", "d")], ..Default::default() })
            .await
            .unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.vertices, 4);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.unfinished, 1);
    }

    #[tokio::test]
    async fn test_consumer_ends_when_channel_closes_without_events() {
        let (tx, rx) = mpsc::channel::<SolveStatus>(1);
        drop(tx);
        let summary = consume(rx, Recorder::default()).await;
        assert_eq!(summary, StatusSummary::default());
    }
}
