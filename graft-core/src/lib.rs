//! Graft Core Library
//!
//! Build graph construction, definition marshalling and a solve client for
//! remote build executors.

pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod observability;
pub mod paths;
pub mod protocol;
pub mod recipe;
pub mod session;
pub mod status;

// Re-export commonly used items
pub use client::{Client, ClientConfig, Endpoint, SolveOpt};
pub use config::Config;
pub use error::{GraftError, Result, Stage, SubmissionError};
pub use graph::{assemble_output, image, local, scratch, Definition, State};
pub use observability::init as init_observability;
pub use recipe::Recipe;
pub use session::{run_solve, SessionConfig, SideChannelPolicy, SolveReport};
pub use status::{ProgressMode, SolveStatus, StatusDisplay, StatusSummary};
