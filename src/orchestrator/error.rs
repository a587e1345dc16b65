//! Errors surfaced by the instance orchestrator.

use thiserror::Error;

use crate::batch::BatchError;
use crate::session::SessionError;

/// Errors raised while driving an instance.
#[derive(Debug, Error)]
pub enum OrchestratorError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when a task or script is unusable before anything remote runs.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },
    /// Raised when the batch cannot be parsed or staged.
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// Raised when provisioning a new instance fails.
    #[error("failed to create instance: {0}")]
    Provision(#[source] BackendError),
    /// Raised when the instance does not become reachable over SSH.
    #[error("instance did not become ready: {message}")]
    RemoteProvisioning {
        /// Human-readable description of the failure.
        message: String,
        /// Provider-specific error.
        #[source]
        source: BackendError,
    },
    /// Raised when the operator interrupts the run.
    #[error("cancelled: {message}")]
    Cancelled {
        /// What was interrupted, plus any teardown note.
        message: String,
    },
    /// Raised when no instance matches an id or session name.
    #[error("no instance found for {identifier}")]
    InstanceNotFound {
        /// Identifier given by the operator.
        identifier: String,
    },
    /// Raised when the provider cannot be queried.
    #[error("provider request failed: {0}")]
    Backend(#[source] BackendError),
    /// Raised when an instance cannot be destroyed.
    #[error("failed to destroy instance: {0}")]
    Teardown(#[source] BackendError),
    /// Raised when preparing the node fails before the job starts.
    #[error("failed to bootstrap instance: {message}")]
    Bootstrap {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// Raised when a remote command or transfer fails.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl<E> OrchestratorError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` for argument errors, which map to exit status 2.
    #[must_use]
    pub const fn is_invalid_arguments(&self) -> bool {
        match self {
            Self::InvalidArguments { .. } => true,
            Self::Batch(err) => err.is_invalid_arguments(),
            _ => false,
        }
    }
}
