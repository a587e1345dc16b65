//! Core library for the hashfleet password-cracking tool.
//!
//! A batch of hashcat tasks is staged against an S3-compatible artifact
//! store, compiled into one shell script, and run inside a `screen` session
//! on a short-lived Scaleway GPU instance. The script pushes its results back
//! to the store, so the operator's machine can disconnect once the job has
//! started.

pub mod backend;
pub mod batch;
pub mod cli;
pub mod config;
pub mod files;
pub mod input;
pub mod local_fs;
pub mod orchestrator;
pub mod prompt;
pub mod scaleway;
pub mod session;
pub mod store;
pub mod table;
pub mod test_support;

pub use backend::{
    Backend, InstanceHandle, InstanceNetworking, InstanceRequest, InstanceRequestBuilder,
    InstanceSummary,
};
pub use batch::{Batch, BatchError, TaskSpec, parse_task_line};
pub use config::{ConfigError, CrackConfig, ScalewayConfig};
pub use orchestrator::{
    CrackOptions, Launch, Orchestrator, OrchestratorConfig, OrchestratorError, ScriptInput,
    SessionOptions,
};
pub use prompt::{Prompter, TerminalPrompter};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use session::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteSession, SessionConfig, SessionError,
};
pub use store::{ArtifactStore, Namespace, S3CliStore, StoreConfig, StoreError};
pub use table::Table;
