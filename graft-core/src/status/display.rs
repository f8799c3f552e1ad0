//! Human-readable rendering of solve progress.
//!
//! This is a PURE PRESENTATION LAYER. It has zero influence on the solve:
//! write failures are swallowed and nothing here feeds back into the client.

use crate::status::{StatusSummary, Vertex, VertexLog, VertexState, VertexStatus, VertexWarning};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{IsTerminal, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Receives every event the consumer drains.
pub trait StatusDisplay {
    fn vertex(&mut self, vertex: &Vertex);
    fn status(&mut self, status: &VertexStatus);
    fn log(&mut self, log: &VertexLog);
    fn warning(&mut self, warning: &VertexWarning);
    /// Called once after the stream closed.
    fn finish(&mut self, _summary: &StatusSummary) {}
}

impl<D: StatusDisplay + ?Sized> StatusDisplay for Box<D> {
    fn vertex(&mut self, vertex: &Vertex) {
        (**self).vertex(vertex)
    }
    fn status(&mut self, status: &VertexStatus) {
        (**self).status(status)
    }
    fn log(&mut self, log: &VertexLog) {
        (**self).log(log)
    }
    fn warning(&mut self, warning: &VertexWarning) {
        (**self).warning(warning)
    }
    fn finish(&mut self, summary: &StatusSummary) {
        (**self).finish(summary)
    }
}

/// How progress is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// `tty` when stderr is a terminal, `plain` otherwise.
    #[default]
    Auto,
    Plain,
    Tty,
    Quiet,
}

impl ProgressMode {
    /// Build the display for this mode. Output goes to stderr.
    pub fn display(self) -> Box<dyn StatusDisplay + Send> {
        match self {
            ProgressMode::Auto if std::io::stderr().is_terminal() => Box::new(TtyDisplay::new()),
            ProgressMode::Auto | ProgressMode::Plain => {
                let color = std::io::stderr().is_terminal();
                Box::new(PlainDisplay::new(std::io::stderr(), color))
            }
            ProgressMode::Tty => Box::new(TtyDisplay::new()),
            ProgressMode::Quiet => Box::new(QuietDisplay),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProgressMode::Auto),
            "plain" => Ok(ProgressMode::Plain),
            "tty" => Ok(ProgressMode::Tty),
            "quiet" => Ok(ProgressMode::Quiet),
            other => Err(format!(
                "unknown progress mode {:?} (expected auto, plain, tty or quiet)",
                other
            )),
        }
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ProgressMode::Auto => "auto",
            ProgressMode::Plain => "plain",
            ProgressMode::Tty => "tty",
            ProgressMode::Quiet => "quiet",
        };
        f.write_str(s)
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct QuietDisplay;

impl StatusDisplay for QuietDisplay {
    fn vertex(&mut self, _vertex: &Vertex) {}
    fn status(&mut self, _status: &VertexStatus) {}
    fn log(&mut self, _log: &VertexLog) {}
    fn warning(&mut self, _warning: &VertexWarning) {}
}

/// Line-oriented output, one record per event, numbered per vertex:
///
/// ```text
/// #1 docker.io/library/golang:1.17-alpine
/// #1 DONE 0.4s
/// #2 go build -o app main.go
/// #2 0.812 compiling...
/// #2 ERROR: exit code 2
/// ```
pub struct PlainDisplay<W: Write> {
    out: W,
    color: bool,
    start: Instant,
    numbers: HashMap<String, usize>,
    reported: HashMap<String, VertexState>,
}

impl<W: Write> PlainDisplay<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color, start: Instant::now(), numbers: HashMap::new(), reported: HashMap::new() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn number(&mut self, digest: &str) -> usize {
        let next = self.numbers.len() + 1;
        *self.numbers.entry(digest.to_string()).or_insert(next)
    }

    fn tag(&mut self, digest: &str) -> String {
        let tag = format!("#{}", self.number(digest));
        if self.color {
            tag.blue().bold().to_string()
        } else {
            tag
        }
    }

    fn line(&mut self, text: String) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write> StatusDisplay for PlainDisplay<W> {
    fn vertex(&mut self, vertex: &Vertex) {
        let state = vertex.state();
        let previous = self.reported.insert(vertex.digest.clone(), state);
        if previous == Some(state) {
            return;
        }

        let tag = self.tag(&vertex.digest);
        if previous.is_none() || previous == Some(VertexState::Pending) {
            self.line(format!("{} {}", tag, vertex.name));
        }

        let text = match state {
            VertexState::Pending | VertexState::Running => return,
            VertexState::Cached => {
                if self.color {
                    "CACHED".cyan().to_string()
                } else {
                    "CACHED".to_string()
                }
            }
            VertexState::Completed => {
                let done = match vertex.duration() {
                    Some(d) => format!("DONE {:.1}s", d.as_secs_f64()),
                    None => "DONE".to_string(),
                };
                if self.color {
                    done.green().to_string()
                } else {
                    done
                }
            }
            VertexState::Errored => {
                let error = format!("ERROR: {}", vertex.error.as_deref().unwrap_or_default());
                if self.color {
                    error.red().bold().to_string()
                } else {
                    error
                }
            }
        };
        self.line(format!("{} {}", tag, text));
    }

    fn status(&mut self, status: &VertexStatus) {
        let tag = self.tag(&status.vertex);
        let label = if status.name.is_empty() { &status.id } else { &status.name };
        let progress = if status.total > 0 {
            format!("{}/{}", status.current, status.total)
        } else {
            status.current.to_string()
        };
        let done = if status.completed.is_some() { " done" } else { "" };
        self.line(format!("{} {} {}{}", tag, label, progress, done));
    }

    fn log(&mut self, log: &VertexLog) {
        let tag = self.tag(&log.vertex);
        let elapsed = format!("{:.3}", self.start.elapsed().as_secs_f64());
        let elapsed = if self.color { elapsed.dimmed().to_string() } else { elapsed };
        let text = String::from_utf8_lossy(&log.data);
        for line in text.lines() {
            self.line(format!("{} {} {}", tag, elapsed, line));
        }
    }

    fn warning(&mut self, warning: &VertexWarning) {
        let tag = self.tag(&warning.vertex);
        let text = format!("WARN: {}", warning.short);
        let text = if self.color { text.yellow().to_string() } else { text };
        self.line(format!("{} {}", tag, text));
        for detail in &warning.detail {
            self.line(format!("{}   {}", tag, detail));
        }
    }

    fn finish(&mut self, _summary: &StatusSummary) {
        let _ = self.out.flush();
    }
}

/// Interactive spinner with a running count of finished steps.
pub struct TtyDisplay {
    bar: ProgressBar,
    names: HashMap<String, String>,
    reported: HashMap<String, VertexState>,
}

impl TtyDisplay {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed}] {pos} done  {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, names: HashMap::new(), reported: HashMap::new() }
    }

    fn name_of(&self, digest: &str) -> String {
        self.names.get(digest).cloned().unwrap_or_else(|| digest.to_string())
    }
}

impl Default for TtyDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusDisplay for TtyDisplay {
    fn vertex(&mut self, vertex: &Vertex) {
        self.names.insert(vertex.digest.clone(), vertex.name.clone());
        let state = vertex.state();
        if self.reported.insert(vertex.digest.clone(), state) == Some(state) {
            return;
        }

        match state {
            VertexState::Pending => {}
            VertexState::Running => self.bar.set_message(vertex.name.clone()),
            VertexState::Cached => {
                self.bar.inc(1);
                self.bar.println(format!(
                    "{} {} {}",
                    "✓".green(),
                    vertex.name,
                    "CACHED".cyan()
                ));
            }
            VertexState::Completed => {
                self.bar.inc(1);
                let duration = vertex
                    .duration()
                    .map(|d| format!("{:.1}s", d.as_secs_f64()))
                    .unwrap_or_default();
                self.bar.println(format!("{} {} {}", "✓".green(), vertex.name, duration.dimmed()));
            }
            VertexState::Errored => {
                self.bar.println(format!(
                    "{} {}: {}",
                    "✗".red().bold(),
                    vertex.name,
                    vertex.error.as_deref().unwrap_or_default().red()
                ));
            }
        }
    }

    fn status(&mut self, status: &VertexStatus) {
        let name = self.name_of(&status.vertex);
        let progress = if status.total > 0 {
            format!("{}/{}", status.current, status.total)
        } else {
            status.current.to_string()
        };
        self.bar.set_message(format!("{} {} {}", name, status.id, progress));
    }

    fn log(&mut self, log: &VertexLog) {
        let text = String::from_utf8_lossy(&log.data);
        for line in text.lines() {
            self.bar.println(format!("  {} {}", "│".dimmed(), line));
        }
    }

    fn warning(&mut self, warning: &VertexWarning) {
        let name = self.name_of(&warning.vertex);
        self.bar.println(format!("{} {}: {}", "⚠".yellow().bold(), name, warning.short.yellow()));
    }

    fn finish(&mut self, summary: &StatusSummary) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} steps: {} done, {} cached, {} failed",
            "»".bold().blue(),
            summary.completed,
            summary.cached,
            summary.errored
        );
    }
}
