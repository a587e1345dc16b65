//! Errors raised while expanding and staging a batch.

use thiserror::Error;

use crate::local_fs::LocalFsError;
use crate::prompt::PromptError;
use crate::store::StoreError;

/// Errors raised by the batch compiler.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BatchError {
    /// Raised when a task specification is malformed.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },
    /// Raised when one line of a batch file cannot be parsed.
    #[error("invalid arguments on batch line {line} `{text}`: {message}")]
    InvalidLine {
        /// 1-based line number in the batch input.
        line: usize,
        /// Offending line text.
        text: String,
        /// Description of the problem.
        message: String,
    },
    /// Raised when a batch contains no tasks.
    #[error("batch contains no tasks")]
    EmptyBatch,
    /// Raised when an artifact is missing locally and from the store.
    #[error("file not found locally or in the store: {path}")]
    ArtifactNotFound {
        /// Identifier as given by the user.
        path: String,
    },
    /// Wraps artifact store failures.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Wraps operator prompt failures.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// Wraps local file inspection failures.
    #[error(transparent)]
    Local(#[from] LocalFsError),
}

impl BatchError {
    /// Returns `true` for argument errors, which map to exit status 2.
    #[must_use]
    pub const fn is_invalid_arguments(&self) -> bool {
        matches!(
            self,
            Self::InvalidArguments { .. } | Self::InvalidLine { .. } | Self::EmptyBatch
        )
    }
}
