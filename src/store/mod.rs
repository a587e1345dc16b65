//! Typed access to the S3-compatible artifact store.
//!
//! Artifacts live in four namespaces under one bucket. Every operation takes
//! the [`Namespace`] as a value, and the [`ArtifactStore`] trait lets the
//! batch compiler and the file commands run against an in-memory store in
//! tests.

use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use thiserror::Error;

use crate::local_fs::LocalFsError;
use crate::session::SessionError;

mod config;
mod s3;

pub use config::StoreConfig;
pub use s3::S3CliStore;

/// Artifact namespaces within the bucket.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Namespace {
    /// Hash lists to crack.
    Hashlists,
    /// Cracked hashes in `hash:salt:pass:hex` form.
    Dumps,
    /// Dictionaries, including those built from cracked passwords.
    Wordlists,
    /// Hashcat rule files.
    Rules,
}

impl Namespace {
    /// Every namespace, in display order.
    pub const ALL: [Self; 4] = [Self::Hashlists, Self::Dumps, Self::Wordlists, Self::Rules];

    /// Key prefix used in the bucket.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hashlists => "hashlists",
            Self::Dumps => "dumps",
            Self::Wordlists => "wordlists",
            Self::Rules => "rules",
        }
    }

    /// Singular form used as a file extension when merging downloads.
    #[must_use]
    pub const fn singular(self) -> &'static str {
        match self {
            Self::Hashlists => "hashlist",
            Self::Dumps => "dump",
            Self::Wordlists => "wordlist",
            Self::Rules => "rule",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|namespace| namespace.as_str() == value)
            .ok_or_else(|| StoreError::UnknownNamespace(value.to_owned()))
    }
}

/// One stored object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArtifactEntry {
    /// Name within the namespace.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification timestamp as reported by the store.
    pub last_modified: String,
}

/// Key-addressed blob storage with typed namespaces.
pub trait ArtifactStore {
    /// Returns `true` when `name` exists in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the listing fails.
    fn exists(&self, namespace: Namespace, name: &str) -> Result<bool, StoreError>;

    /// Lists the objects of `namespace` in lexical order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the listing fails.
    fn list(&self, namespace: Namespace) -> Result<Vec<ArtifactEntry>, StoreError>;

    /// Uploads `local` as `remote_name`, defaulting to its basename.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LocalNotFound`] when `local` is not a file.
    fn upload(
        &self,
        namespace: Namespace,
        local: &Utf8Path,
        remote_name: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Downloads `remote_name` to `local`, defaulting to the current
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the object is absent.
    fn download(
        &self,
        namespace: Namespace,
        remote_name: &str,
        local: Option<&Utf8Path>,
    ) -> Result<(), StoreError>;

    /// Returns the content of an object as text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the object is absent.
    fn read(&self, namespace: Namespace, name: &str) -> Result<String, StoreError>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the object is absent.
    fn delete(&self, namespace: Namespace, name: &str) -> Result<(), StoreError>;
}

/// Errors raised by artifact store operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set HASHFLEET_STORE_{env_suffix} or add {field} to [store] in hashfleet.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("store configuration parsing failed: {0}")]
    Config(String),
    /// Raised when an object does not exist.
    #[error("{namespace}/{name} does not exist in bucket {bucket}")]
    NotFound {
        /// Namespace that was searched.
        namespace: Namespace,
        /// Object name.
        name: String,
        /// Bucket that was searched.
        bucket: String,
    },
    /// Raised when a local file to upload is missing.
    #[error("local file {path} does not exist")]
    LocalNotFound {
        /// Local path that was expected.
        path: String,
    },
    /// Raised when a namespace name is not recognised.
    #[error("unknown artifact type: {0}")]
    UnknownNamespace(String),
    /// Raised when the store CLI exits with a non-zero status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when the listing output cannot be decoded.
    #[error("failed to parse store listing: {0}")]
    Parse(String),
    /// Raised when the store CLI cannot be spawned.
    #[error(transparent)]
    Runner(#[from] SessionError),
    /// Raised when a local file cannot be inspected.
    #[error(transparent)]
    Local(#[from] LocalFsError),
}
