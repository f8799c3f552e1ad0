//! Immutable filesystem states and the builder calls that derive them.
//!
//! A [`State`] is a value: every builder call returns a new state and leaves
//! its receiver untouched. Vertices are shared through `Arc`, so one state can
//! feed any number of downstream branches without being rebuilt.

use crate::graph::op::{
    ExecMeta, ExecOp, FileAction, FileOp, Op, SourceOp, IMAGE_SCHEME, LOCAL_SCHEME,
};
use crate::graph::shlex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default directory mode for `mkdir` when none is given.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// A node of the in-memory build graph.
#[derive(Debug)]
pub struct Vertex {
    op: Op,
    inputs: Vec<Arc<Vertex>>,
    name: String,
}

impl Vertex {
    fn new(op: Op, inputs: Vec<Arc<Vertex>>, name: String) -> Arc<Self> {
        Arc::new(Self { op, inputs, name })
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[Arc<Vertex>] {
        &self.inputs
    }

    /// Progress label reported for this vertex.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Filesystem state after a chain of operations.
///
/// Environment and working directory are metadata carried by the state and
/// applied to every later `run` on its descendants.
#[derive(Debug, Clone)]
pub struct State {
    output: Option<Arc<Vertex>>,
    env: BTreeMap<String, String>,
    cwd: String,
}

impl Default for State {
    fn default() -> Self {
        Self { output: None, env: BTreeMap::new(), cwd: "/".to_string() }
    }
}

/// Start from a container image. The reference is resolved by the executor.
pub fn image(reference: impl Into<String>) -> State {
    let reference = reference.into();
    let identifier = if reference.contains("://") {
        reference.clone()
    } else {
        format!("{}{}", IMAGE_SCHEME, reference)
    };
    let op = Op::Source(SourceOp { identifier, attrs: BTreeMap::new() });
    State::default().with_output(Vertex::new(op, Vec::new(), reference))
}

/// The empty filesystem.
pub fn scratch() -> State {
    State::default()
}

/// A symbolic local directory, bound to a real path at submission time.
pub fn local(name: impl Into<String>) -> State {
    let name = name.into();
    let op = Op::Source(SourceOp {
        identifier: format!("{}{}", LOCAL_SCHEME, name),
        attrs: BTreeMap::new(),
    });
    State::default().with_output(Vertex::new(op, Vec::new(), format!("local://{}", name)))
}

impl State {
    /// The vertex producing this state, `None` for the empty filesystem.
    pub fn output(&self) -> Option<&Arc<Vertex>> {
        self.output.as_ref()
    }

    pub fn is_scratch(&self) -> bool {
        self.output.is_none()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Record an environment variable for later `run` calls. Last write wins.
    pub fn add_env(&self, key: impl Into<String>, value: impl Into<String>) -> State {
        let mut next = self.clone();
        next.env.insert(key.into(), value.into());
        next
    }

    /// Set the working directory. Relative paths resolve against the current one.
    pub fn dir(&self, path: impl AsRef<str>) -> State {
        let mut next = self.clone();
        let resolved = resolve_path(&self.cwd, path.as_ref());
        next.cwd = if resolved.len() > 1 {
            resolved.trim_end_matches('/').to_string()
        } else {
            resolved
        };
        next
    }

    /// Apply a filesystem action.
    pub fn file(&self, step: impl Into<FileStep>) -> State {
        let mut inputs = Vec::new();
        let (action, name) = match step.into() {
            FileStep::Mkdir(spec) => {
                let path = resolve_path(&self.cwd, &spec.path);
                let name = format!("mkdir {}", path);
                let action = FileAction::Mkdir {
                    base: push_input(&mut inputs, self.output.as_ref()),
                    path,
                    mode: spec.mode,
                    make_parents: spec.make_parents,
                };
                (action, name)
            }
            FileStep::Copy(spec) => {
                let src = resolve_path(&spec.source.cwd, &spec.src);
                let dest = resolve_path(&self.cwd, &spec.dest);
                let origin = spec
                    .source
                    .output
                    .as_ref()
                    .and_then(|v| match v.op() {
                        Op::Source(source) if source.local_name().is_some() => {
                            Some(v.name().to_string())
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                let name = format!("copy {}{} {}", origin, src, dest);
                let action = FileAction::Copy {
                    base: push_input(&mut inputs, self.output.as_ref()),
                    source: push_input(&mut inputs, spec.source.output.as_ref()),
                    src,
                    dest,
                    create_dest_path: spec.create_dest_path,
                    allow_wildcard: spec.allow_wildcard,
                };
                (action, name)
            }
        };
        self.with_output(Vertex::new(Op::File(FileOp { action }), inputs, name))
    }

    /// Record a command to run with this state's environment and working directory.
    pub fn run(&self, command: impl Into<RunCommand>) -> ExecState {
        let args = command.into().into_args();
        let name = args.join(" ");
        let mut inputs = Vec::new();
        let meta = ExecMeta {
            args,
            env: self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
            cwd: self.cwd.clone(),
        };
        let op = Op::Exec(ExecOp { meta, root: push_input(&mut inputs, self.output.as_ref()) });
        ExecState { root: self.with_output(Vertex::new(op, inputs, name)) }
    }

    fn with_output(&self, vertex: Arc<Vertex>) -> State {
        State { output: Some(vertex), env: self.env.clone(), cwd: self.cwd.clone() }
    }
}

/// Result of a `run` call.
#[derive(Debug, Clone)]
pub struct ExecState {
    root: State,
}

impl ExecState {
    /// Filesystem state after the command completes.
    pub fn root(&self) -> State {
        self.root.clone()
    }

    pub fn into_root(self) -> State {
        self.root
    }
}

/// Command for [`State::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunCommand {
    /// Shell form, split with shell quoting rules: `go build -o app .`
    Shell(String),
    /// Exec form, used verbatim.
    Exec(Vec<String>),
}

impl RunCommand {
    pub fn into_args(self) -> Vec<String> {
        match self {
            RunCommand::Shell(line) => shlex::split(&line),
            RunCommand::Exec(args) => args,
        }
    }
}

impl From<&str> for RunCommand {
    fn from(line: &str) -> Self {
        RunCommand::Shell(line.to_string())
    }
}

impl From<String> for RunCommand {
    fn from(line: String) -> Self {
        RunCommand::Shell(line)
    }
}

impl From<Vec<String>> for RunCommand {
    fn from(args: Vec<String>) -> Self {
        RunCommand::Exec(args)
    }
}

/// A filesystem action for [`State::file`].
#[derive(Debug, Clone)]
pub enum FileStep {
    Mkdir(MkdirSpec),
    Copy(CopySpec),
}

#[derive(Debug, Clone)]
pub struct MkdirSpec {
    path: String,
    mode: u32,
    make_parents: bool,
}

impl MkdirSpec {
    /// Create missing parent directories (default: true).
    pub fn make_parents(mut self, make_parents: bool) -> Self {
        self.make_parents = make_parents;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CopySpec {
    source: State,
    src: String,
    dest: String,
    create_dest_path: bool,
    allow_wildcard: bool,
}

impl CopySpec {
    pub fn create_dest_path(mut self, create: bool) -> Self {
        self.create_dest_path = create;
        self
    }

    pub fn allow_wildcard(mut self, allow: bool) -> Self {
        self.allow_wildcard = allow;
        self
    }
}

impl From<MkdirSpec> for FileStep {
    fn from(spec: MkdirSpec) -> Self {
        FileStep::Mkdir(spec)
    }
}

impl From<CopySpec> for FileStep {
    fn from(spec: CopySpec) -> Self {
        FileStep::Copy(spec)
    }
}

/// Create a directory. Missing parents are created unless disabled.
pub fn mkdir(path: impl Into<String>, mode: u32) -> MkdirSpec {
    MkdirSpec { path: path.into(), mode, make_parents: true }
}

/// Copy `src` out of `source` to `dest`. A `dest` ending in `/` (or `.`)
/// names a directory to copy into.
pub fn copy(source: &State, src: impl Into<String>, dest: impl Into<String>) -> CopySpec {
    CopySpec {
        source: source.clone(),
        src: src.into(),
        dest: dest.into(),
        create_dest_path: false,
        allow_wildcard: false,
    }
}

fn push_input(inputs: &mut Vec<Arc<Vertex>>, vertex: Option<&Arc<Vertex>>) -> Option<usize> {
    let vertex = vertex?;
    if let Some(index) = inputs.iter().position(|v| Arc::ptr_eq(v, vertex)) {
        return Some(index);
    }
    inputs.push(Arc::clone(vertex));
    Some(inputs.len() - 1)
}

/// Resolve `path` against `cwd` using POSIX rules, keeping a trailing `/`
/// when the input names a directory.
pub(crate) fn resolve_path(cwd: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", cwd, path)
    };
    let names_dir =
        path.ends_with('/') || path == "." || path == ".." || path.ends_with("/.");

    let mut parts: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    let mut resolved = format!("/{}", parts.join("/"));
    if names_dir && resolved != "/" {
        resolved.push('/');
    }
    resolved
}
