//! Marshalled build graph (the definition submitted to the executor).
//!
//! Marshalling walks the ancestors of a state depth-first, emits every vertex
//! after its inputs, and addresses each one by the SHA-256 of its canonical
//! JSON encoding. Because an input's digest is part of its consumer's
//! encoding, equal chains always marshal to byte-identical records, and a
//! vertex reachable through several paths is emitted once.

use crate::error::{GraftError, Result};
use crate::graph::op::{Op, OpMetadata};
use crate::graph::state::{State, Vertex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

/// Error type for graph marshalling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A `run` step was recorded with no arguments.
    #[error("empty command in step {vertex:?}")]
    EmptyCommand { vertex: String },

    /// An operation referenced an input it does not have.
    #[error("operation {vertex:?} references missing input {index}")]
    MissingInput { vertex: String, index: usize },
}

impl From<GraphError> for GraftError {
    fn from(err: GraphError) -> Self {
        GraftError::Serialization { reason: err.to_string() }
    }
}

/// One marshalled vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpRecord {
    /// `sha256:<hex>` over the canonical encoding of `inputs` and `op`.
    pub digest: String,
    /// Digests of the input records, in input-index order.
    pub inputs: Vec<String>,
    pub op: Op,
}

/// The part of a record that is hashed.
#[derive(Serialize)]
struct Canonical<'a> {
    inputs: &'a [String],
    op: &'a Op,
}

/// Flattened, wire-ready build graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Records in dependency order: inputs always precede consumers.
    pub ops: Vec<OpRecord>,
    /// Digest of the requested result, `None` for the empty filesystem.
    pub output: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, OpMetadata>,
}

impl Definition {
    /// Marshal the full ancestor graph of `state`.
    pub fn marshal(state: &State) -> Result<Self> {
        let mut marshaller = Marshaller::default();
        let output = match state.output() {
            Some(vertex) => Some(marshaller.visit(vertex)?),
            None => None,
        };
        Ok(Definition { ops: marshaller.ops, output, metadata: marshaller.metadata })
    }

    /// Encode the definition as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a definition previously produced by [`Definition::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| GraftError::Protocol(format!("invalid definition: {}", e)))
    }

    /// Write the encoded definition, newline-terminated, to `writer`.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer
            .write_all(&bytes)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|source| GraftError::SideChannelWrite { source })
    }

    /// Look up a record by digest.
    pub fn get(&self, digest: &str) -> Option<&OpRecord> {
        self.ops.iter().find(|r| r.digest == digest)
    }

    /// Label for a digest, falling back to the digest itself.
    pub fn name_of<'a>(&'a self, digest: &'a str) -> &'a str {
        self.metadata.get(digest).map(|m| m.name.as_str()).unwrap_or(digest)
    }

    /// Symbolic local directory names referenced by the graph.
    pub fn local_names(&self) -> BTreeSet<String> {
        self.ops
            .iter()
            .filter_map(|record| match &record.op {
                Op::Source(source) => source.local_name().map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

impl State {
    /// Marshal this state's ancestor graph. See [`Definition::marshal`].
    pub fn marshal(&self) -> Result<Definition> {
        Definition::marshal(self)
    }
}

#[derive(Default)]
struct Marshaller {
    ops: Vec<OpRecord>,
    metadata: BTreeMap<String, OpMetadata>,
    /// Vertex identity -> digest, so shared vertices are walked once.
    visited: HashMap<*const Vertex, String>,
    emitted: HashSet<String>,
}

impl Marshaller {
    fn visit(&mut self, vertex: &Arc<Vertex>) -> Result<String> {
        let key = Arc::as_ptr(vertex);
        if let Some(digest) = self.visited.get(&key) {
            return Ok(digest.clone());
        }

        let mut inputs = Vec::with_capacity(vertex.inputs().len());
        for input in vertex.inputs() {
            inputs.push(self.visit(input)?);
        }

        validate(vertex)?;

        let encoded = serde_json::to_vec(&Canonical { inputs: &inputs, op: vertex.op() })?;
        let digest = format!("sha256:{:x}", Sha256::digest(&encoded));

        if self.emitted.insert(digest.clone()) {
            self.metadata
                .insert(digest.clone(), OpMetadata { name: vertex.name().to_string() });
            self.ops.push(OpRecord { digest: digest.clone(), inputs, op: vertex.op().clone() });
        }

        self.visited.insert(key, digest.clone());
        Ok(digest)
    }
}

fn validate(vertex: &Vertex) -> std::result::Result<(), GraphError> {
    use crate::graph::op::FileAction;

    let check = |index: Option<usize>| match index {
        Some(index) if index >= vertex.inputs().len() => {
            Err(GraphError::MissingInput { vertex: vertex.name().to_string(), index })
        }
        _ => Ok(()),
    };

    match vertex.op() {
        Op::Source(_) => Ok(()),
        Op::Exec(exec) => {
            if exec.meta.args.is_empty() {
                return Err(GraphError::EmptyCommand { vertex: vertex.name().to_string() });
            }
            check(exec.root)
        }
        Op::File(file) => match &file.action {
            FileAction::Mkdir { base, .. } => check(*base),
            FileAction::Copy { base, source, .. } => {
                check(*base)?;
                check(*source)
            }
        },
    }
}
