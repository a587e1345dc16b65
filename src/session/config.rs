//! SSH session configuration and the errors raised by remote execution.
//!
//! [`SessionConfig`] is loaded via `ortho-config`, which merges defaults,
//! configuration files, and environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Working directory on the node. Every staged artifact lives here.
pub const REMOTE_WORKDIR: &str = "/tmp";

/// SSH and SCP settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HASHFLEET_SESSION",
    discovery(
        app_name = "hashfleet",
        env_var = "HASHFLEET_CONFIG_PATH",
        config_file_name = "hashfleet.toml",
        dotfile_name = ".hashfleet.toml",
        project_file_name = "hashfleet.toml"
    )
)]
pub struct SessionConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; ephemeral hosts default to off.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null` for ephemeral hosts.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Path to the SSH private key. Supports tilde expansion. When absent,
    /// `ssh` falls back to its default key locations.
    pub ssh_identity_file: Option<String>,
}

/// Errors raised when loading the session configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SessionConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("session configuration parsing failed: {0}")]
    Parse(String),
}

impl SessionConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when any required field is
    /// empty.
    pub fn validate(&self) -> Result<(), SessionError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_optional_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        Ok(())
    }

    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SessionConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("hashfleet")])
            .map_err(|err| SessionConfigLoadError::Parse(err.to_string()))
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), SessionError> {
        match value {
            None => Ok(()),
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(SessionError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), SessionError> {
        Self::require_optional_value(Some(value), field)
    }
}

/// Errors surfaced while talking to the node or running local tools.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set HASHFLEET_SESSION_{env_suffix} or add {field} to [session] in hashfleet.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a local helper command exits with a non-zero status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when a command run on the node fails.
    #[error("remote command `{command}` exited with status {status_text}: {stderr}")]
    RemoteFailure {
        /// Command line passed to the remote shell.
        command: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from `ssh`.
        stderr: String,
    },
    /// Raised when a local staging file cannot be written.
    #[error("failed to prepare local file {path}: {message}")]
    LocalFile {
        /// Path of the file being prepared.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },
}
