//! Operation types recorded in the build graph.
//!
//! Operations reference their inputs by index into the owning vertex's
//! input list. `None` stands for the empty filesystem.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier prefix for container image sources.
pub const IMAGE_SCHEME: &str = "docker-image://";

/// Identifier prefix for local directory sources.
pub const LOCAL_SCHEME: &str = "local://";

/// A single step of the build graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    /// Base filesystem: an image or a named local directory.
    Source(SourceOp),
    /// Filesystem mutation: directory creation or file copy.
    File(FileOp),
    /// Process execution on top of a root filesystem.
    Exec(ExecOp),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOp {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl SourceOp {
    /// Symbolic local directory name, if this source is one.
    pub fn local_name(&self) -> Option<&str> {
        self.identifier.strip_prefix(LOCAL_SCHEME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOp {
    pub action: FileAction,
}

/// A filesystem action applied by a [`FileOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileAction {
    Mkdir {
        base: Option<usize>,
        path: String,
        mode: u32,
        make_parents: bool,
    },
    Copy {
        base: Option<usize>,
        source: Option<usize>,
        src: String,
        dest: String,
        create_dest_path: bool,
        allow_wildcard: bool,
    },
}

impl FileAction {
    pub fn kind(&self) -> &'static str {
        match self {
            FileAction::Mkdir { .. } => "mkdir",
            FileAction::Copy { .. } => "copy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOp {
    pub meta: ExecMeta,
    /// Input index mounted as the root filesystem.
    pub root: Option<usize>,
}

/// Process metadata for an [`ExecOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecMeta {
    pub args: Vec<String>,
    /// `KEY=value` entries sorted by key.
    pub env: Vec<String>,
    pub cwd: String,
}

/// Per-vertex metadata carried next to the definition, not part of the digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpMetadata {
    /// Human-readable label the executor reports progress under.
    pub name: String,
}
