//! Remote execution on a provisioned node over `ssh` and `scp`.
//!
//! [`RemoteSession`] wraps a [`CommandRunner`] and the node's networking
//! details. Long-running work is started inside named `screen` sessions so a
//! dropped connection never kills the job.

use std::ffi::OsString;
use std::io::Write;

use camino::Utf8Path;
use sha2::{Digest, Sha256};
use shell_escape::unix::escape;
use tracing::debug;

use crate::backend::InstanceNetworking;

mod config;
mod types;
mod util;

pub use config::{REMOTE_WORKDIR, SessionConfig, SessionConfigLoadError, SessionError};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput};
pub(crate) use types::status_text;
pub use util::{basename, expand_tilde};

/// Interpreter line prepended to every generated script.
pub const SCRIPT_SHEBANG: &str = "#!/bin/bash";

/// Permissions applied to generated scripts.
pub const SCRIPT_MODE: u32 = 0o755;

/// Number of hex digits of the content digest used in script file names.
const SCRIPT_NAME_DIGITS: usize = 16;

/// Connection to a single node.
#[derive(Clone, Debug)]
pub struct RemoteSession<R: CommandRunner> {
    config: SessionConfig,
    runner: R,
    networking: InstanceNetworking,
}

impl<R: CommandRunner> RemoteSession<R> {
    /// Creates a session for the node reachable at `networking`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(
        config: SessionConfig,
        runner: R,
        networking: InstanceNetworking,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            runner,
            networking,
        })
    }

    /// Returns the networking details of the node.
    #[must_use]
    pub const fn networking(&self) -> &InstanceNetworking {
        &self.networking
    }

    /// Returns the underlying command runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Executes `command` inside the remote working directory.
    ///
    /// # Errors
    ///
    /// Propagates any failure to spawn `ssh`.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote shell. Callers must quote
    /// untrusted values.
    pub fn run_command(&self, command: &str) -> Result<RemoteCommandOutput, SessionError> {
        let wrapped = format!("cd {REMOTE_WORKDIR} && {command}");
        let args = self.build_ssh_args(false, Some(&wrapped));
        debug!(command = %wrapped, host = %self.networking.public_ip, "running remote command");
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        Ok(output.into())
    }

    /// Executes `command` and fails unless it exits with status zero.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteFailure`] on a non-zero exit.
    pub fn run_checked(&self, command: &str) -> Result<RemoteCommandOutput, SessionError> {
        let output = self.run_command(command)?;
        if output.is_success() {
            return Ok(output);
        }
        Err(SessionError::RemoteFailure {
            command: command.to_owned(),
            status_text: status_text(output.exit_code),
            stderr: output.stderr,
        })
    }

    /// Copies a local file to `remote_path`, optionally setting its mode.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CommandFailure`] when `scp` fails, or
    /// [`SessionError::RemoteFailure`] when `chmod` fails.
    pub fn copy_file(
        &self,
        local: &Utf8Path,
        remote_path: &str,
        mode: Option<u32>,
    ) -> Result<(), SessionError> {
        let args = self.build_scp_args(local, remote_path);
        debug!(%local, remote = remote_path, "copying file to node");
        let output = self.runner.run(&self.config.scp_bin, &args)?;
        if !output.is_success() {
            return Err(SessionError::CommandFailure {
                program: self.config.scp_bin.clone(),
                status: output.code,
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }

        if let Some(bits) = mode {
            let escaped = escape(remote_path.into());
            self.run_checked(&format!("chmod {bits:o} {escaped}"))?;
        }
        Ok(())
    }

    /// Writes `lines` to `remote_path` on the node via a local temp file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LocalFile`] when the temp file cannot be
    /// written, or any error from [`RemoteSession::copy_file`].
    pub fn create_file(
        &self,
        remote_path: &str,
        lines: &[String],
        mode: Option<u32>,
    ) -> Result<(), SessionError> {
        let mut file = tempfile::NamedTempFile::new().map_err(|err| SessionError::LocalFile {
            path: remote_path.to_owned(),
            message: err.to_string(),
        })?;
        let local_display = file.path().to_string_lossy().into_owned();
        let io_error = |err: std::io::Error| SessionError::LocalFile {
            path: local_display.clone(),
            message: err.to_string(),
        };
        for line in lines {
            writeln!(file, "{line}").map_err(io_error)?;
        }
        file.flush().map_err(io_error)?;

        let local = Utf8Path::from_path(file.path()).ok_or_else(|| SessionError::LocalFile {
            path: local_display.clone(),
            message: String::from("temporary path is not valid UTF-8"),
        })?;
        self.copy_file(local, remote_path, mode)
    }

    /// Uploads `lines` as an executable bash script and returns its remote
    /// path.
    ///
    /// The file name is derived from the content digest, so identical scripts
    /// land on the same path.
    ///
    /// # Errors
    ///
    /// Returns any error from [`RemoteSession::create_file`].
    pub fn create_script(&self, lines: &[String]) -> Result<String, SessionError> {
        let mut content = Vec::with_capacity(lines.len() + 1);
        content.push(SCRIPT_SHEBANG.to_owned());
        content.extend(lines.iter().cloned());

        let remote_path = script_path(&content);
        self.create_file(&remote_path, &content, Some(SCRIPT_MODE))?;
        Ok(remote_path)
    }

    /// Runs `command` inside the `screen` session `name`.
    ///
    /// When `attach` is set the caller's terminal is attached until the
    /// session ends; otherwise the session starts detached and this returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteFailure`] when the session cannot be
    /// started.
    pub fn run_in_session(&self, name: &str, command: &str, attach: bool) -> Result<(), SessionError> {
        let escaped_name = escape(name.into());
        if attach {
            let remote = format!("cd {REMOTE_WORKDIR} && screen -S {escaped_name} {command}");
            return self.run_terminal(&remote);
        }
        self.run_checked(&format!("screen -dmS {escaped_name} {command}"))
            .map(|_| ())
    }

    /// Re-attaches the caller's terminal to the `screen` session `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RemoteFailure`] when `screen -r` fails.
    pub fn attach_session(&self, name: &str) -> Result<(), SessionError> {
        let escaped_name = escape(name.into());
        self.run_terminal(&format!("screen -r {escaped_name}"))
    }

    /// Opens an interactive login shell on the node.
    ///
    /// # Errors
    ///
    /// Propagates any failure to spawn `ssh`.
    pub fn open_shell(&self) -> Result<(), SessionError> {
        let args = self.build_ssh_args(true, None);
        self.runner
            .run_interactive(&self.config.ssh_bin, &args)
            .map(|_| ())
    }

    fn run_terminal(&self, command: &str) -> Result<(), SessionError> {
        let args = self.build_ssh_args(true, Some(command));
        debug!(command, "running remote command on a terminal");
        let code = self.runner.run_interactive(&self.config.ssh_bin, &args)?;
        if matches!(code, Some(0)) {
            return Ok(());
        }
        Err(SessionError::RemoteFailure {
            command: command.to_owned(),
            status_text: status_text(code),
            stderr: String::new(),
        })
    }

    pub(crate) fn build_ssh_args(&self, tty: bool, command: Option<&str>) -> Vec<OsString> {
        let mut args = self.common_options("-p");
        if tty {
            args.push(OsString::from("-t"));
        }
        args.push(OsString::from(format!(
            "{}@{}",
            self.config.ssh_user, self.networking.public_ip
        )));
        if let Some(remote) = command {
            args.push(OsString::from(remote));
        }
        args
    }

    pub(crate) fn build_scp_args(&self, local: &Utf8Path, remote_path: &str) -> Vec<OsString> {
        let mut args = self.common_options("-P");
        args.push(OsString::from("-q"));
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(format!(
            "{}@{}:{remote_path}",
            self.config.ssh_user,
            host_for_scp(&self.networking)
        )));
        args
    }

    fn common_options(&self, port_flag: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(port_flag),
            OsString::from(self.networking.ssh_port.to_string()),
        ];

        if let Some(ref identity_file) = self.config.ssh_identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args
    }
}

/// Remote path of a script with the given content.
#[must_use]
pub fn script_path(content: &[String]) -> String {
    let mut hasher = Sha256::new();
    for line in content {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());
    let prefix = digest.get(..SCRIPT_NAME_DIGITS).unwrap_or(&digest);
    format!("{REMOTE_WORKDIR}/{prefix}.sh")
}

fn host_for_scp(networking: &InstanceNetworking) -> String {
    if networking.public_ip.is_ipv6() {
        format!("[{}]", networking.public_ip)
    } else {
        networking.public_ip.to_string()
    }
}
