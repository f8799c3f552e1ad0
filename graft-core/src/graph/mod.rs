//! Build graph construction.
//!
//! States are built bottom-up with pure builder calls, then marshalled into a
//! [`Definition`] for submission. The graph is a DAG by construction: a vertex
//! can only reference states that already exist.

mod assemble;
mod definition;
pub mod op;
pub mod shlex;
mod state;

pub use assemble::assemble_output;
pub use definition::{Definition, GraphError, OpRecord};
pub use op::{ExecMeta, ExecOp, FileAction, FileOp, Op, OpMetadata, SourceOp};
pub use state::{
    copy, image, local, mkdir, scratch, CopySpec, ExecState, FileStep, MkdirSpec, RunCommand,
    State, Vertex, DEFAULT_DIR_MODE,
};

/// Default `PATH` for Unix images, used when a recipe extends it.
pub const DEFAULT_PATH_ENV_UNIX: &str =
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
