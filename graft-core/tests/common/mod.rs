//! Fake build executor for integration tests.
//!
//! Accepts one connection, records every client message and answers a solve
//! according to a scripted [`Behaviour`].

#![allow(dead_code)]

use chrono::Utc;
use graft_core::graph::{Definition, Op};
use graft_core::protocol::{
    read_frame, write_frame, ClientMessage, ExecutorMessage, FailureKind, SolveFailure,
    SolveResponse,
};
use graft_core::status::{SolveStatus, StatusDisplay, StatusSummary, Vertex, VertexLog};
use graft_core::status::{VertexStatus, VertexWarning};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Complete every vertex, then report success.
    Succeed,
    /// Complete the first vertex, fail the last exec vertex.
    FailCommand { exit_code: i32 },
    /// Report one running vertex, then never finish.
    Hang,
    /// Refuse the request.
    Reject,
}

pub struct FakeExecutor {
    pub addr: String,
    received: Arc<Mutex<Vec<ClientMessage>>>,
    handle: JoinHandle<()>,
    _dir: Option<tempfile::TempDir>,
}

impl FakeExecutor {
    pub async fn tcp(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("tcp://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, behaviour, log).await;
        });

        Self { addr, received, handle, _dir: None }
    }

    #[cfg(unix)]
    pub async fn unix(behaviour: Behaviour) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("executor.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let addr = format!("unix://{}", path.display());
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, behaviour, log).await;
        });

        Self { addr, received, handle, _dir: Some(dir) }
    }

    /// Wait for the client to hang up and return what it sent.
    pub async fn finish(self) -> Vec<ClientMessage> {
        self.handle.await.unwrap();
        let received = self.received.lock().unwrap().clone();
        received
    }
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", listener.local_addr().unwrap());
    drop(listener);
    addr
}

async fn serve<S>(mut stream: S, behaviour: Behaviour, log: Arc<Mutex<Vec<ClientMessage>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(first) = read_frame::<_, ClientMessage>(&mut stream).await.unwrap() else {
        return;
    };
    log.lock().unwrap().push(first.clone());

    if let ClientMessage::Solve(request) = first {
        let def = request.definition;
        match behaviour {
            Behaviour::Succeed => {
                for record in &def.ops {
                    send(&mut stream, started(&def, &record.digest)).await;
                    send(&mut stream, completed(&def, &record.digest)).await;
                }
                let mut exporter_response = BTreeMap::new();
                if let Some(output) = &def.output {
                    exporter_response.insert("output".to_string(), output.clone());
                }
                let done = ExecutorMessage::Done(SolveResponse { exporter_response });
                let _ = write_frame(&mut stream, &done).await;
            }
            Behaviour::FailCommand { exit_code } => {
                let first = &def.ops[0].digest;
                send(&mut stream, started(&def, first)).await;
                send(&mut stream, completed(&def, first)).await;

                let failing = def
                    .ops
                    .iter()
                    .rev()
                    .find(|r| matches!(r.op, Op::Exec(_)))
                    .map(|r| r.digest.clone())
                    .unwrap_or_else(|| first.clone());
                send(&mut stream, started(&def, &failing)).await;
                let log = SolveStatus {
                    logs: vec![VertexLog::stderr(&failing, b"compile error\n".to_vec())],
                    ..Default::default()
                };
                let _ = write_frame(&mut stream, &ExecutorMessage::Status(log)).await;
                let mut errored = vertex(&def, &failing);
                errored.started = Some(Utc::now());
                errored.error = Some(format!("exit code {}", exit_code));
                send(&mut stream, errored).await;

                let failure = SolveFailure {
                    kind: FailureKind::CommandFailed,
                    message: "process did not complete successfully".to_string(),
                    vertex: Some(def.name_of(&failing).to_string()),
                    exit_code: Some(exit_code),
                };
                let _ = write_frame(&mut stream, &ExecutorMessage::Failed(failure)).await;
            }
            Behaviour::Hang => {
                send(&mut stream, started(&def, &def.ops[0].digest)).await;
            }
            Behaviour::Reject => {
                let failure = SolveFailure {
                    kind: FailureKind::Rejected,
                    message: "executor is shutting down".to_string(),
                    vertex: None,
                    exit_code: None,
                };
                let _ = write_frame(&mut stream, &ExecutorMessage::Failed(failure)).await;
            }
        }
    }

    // Record anything else the client sends until it hangs up.
    while let Ok(Some(msg)) = read_frame::<_, ClientMessage>(&mut stream).await {
        log.lock().unwrap().push(msg);
    }
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, vertex: Vertex) {
    let status = SolveStatus { vertexes: vec![vertex], ..Default::default() };
    let _ = write_frame(stream, &ExecutorMessage::Status(status)).await;
}

fn vertex(def: &Definition, digest: &str) -> Vertex {
    let mut vertex = Vertex::named(digest, def.name_of(digest));
    vertex.inputs = def.get(digest).map(|r| r.inputs.clone()).unwrap_or_default();
    vertex
}

fn started(def: &Definition, digest: &str) -> Vertex {
    let mut vertex = vertex(def, digest);
    vertex.started = Some(Utc::now());
    vertex
}

fn completed(def: &Definition, digest: &str) -> Vertex {
    let mut vertex = started(def, digest);
    vertex.completed = Some(Utc::now());
    vertex
}

/// Display that records every event as a line.
#[derive(Clone, Default)]
pub struct Recorder {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl StatusDisplay for Recorder {
    fn vertex(&mut self, vertex: &Vertex) {
        self.lines.lock().unwrap().push(format!("vertex {} {:?}", vertex.name, vertex.state()));
    }
    fn status(&mut self, status: &VertexStatus) {
        self.lines.lock().unwrap().push(format!("status {}", status.id));
    }
    fn log(&mut self, log: &VertexLog) {
        let text = String::from_utf8_lossy(&log.data).trim_end().to_string();
        self.lines.lock().unwrap().push(format!("log {}", text));
    }
    fn warning(&mut self, warning: &VertexWarning) {
        self.lines.lock().unwrap().push(format!("warning {}", warning.short));
    }
    fn finish(&mut self, _summary: &StatusSummary) {
        self.lines.lock().unwrap().push("end".to_string());
    }
}

/// Directory bound to a recipe's local name.
pub fn source_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();
    let path = dir.path().to_path_buf();
    (dir, path)
}
