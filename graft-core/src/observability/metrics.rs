//! Client metrics.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration
//! - `_bytes` suffix for byte counters
//!
//! No exporter is installed here; an embedding process may install one.

use crate::error::Stage;
use crate::status::SolveStatus;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Register all client metrics with descriptions.
pub fn register_core_metrics() {
    describe_histogram!(
        "graft_solve_duration_seconds",
        "Wall time of a solve from connect to final status (by outcome)"
    );
    describe_counter!("graft_solves_total", "Total number of solves (by outcome)");
    describe_counter!("graft_solve_failures_total", "Total number of failed solves (by stage)");

    describe_counter!("graft_status_batches_total", "Status batches received from the executor");
    describe_counter!("graft_status_vertices_total", "Vertex updates received");
    describe_counter!("graft_status_log_bytes_total", "Bytes of vertex log output received");
}

pub fn record_solve(duration: Duration, outcome: &str) {
    histogram!("graft_solve_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
    counter!("graft_solves_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_solve_failure(stage: Stage) {
    counter!("graft_solve_failures_total", "stage" => stage.as_str()).increment(1);
}

pub fn record_status_batch(status: &SolveStatus) {
    counter!("graft_status_batches_total").increment(1);
    counter!("graft_status_vertices_total").increment(status.vertexes.len() as u64);
    let bytes: usize = status.logs.iter().map(|log| log.data.len()).sum();
    counter!("graft_status_log_bytes_total").increment(bytes as u64);
}
