//! Command runner abstraction and captured process output.

use std::ffi::OsString;
use std::process::Command;

use super::SessionError;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable exit status used in error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        status_text(self.code)
    }
}

/// Output of a command executed on the remote node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by `ssh`, which mirrors the remote command.
    pub exit_code: Option<i32>,
    /// Captured standard output stream.
    pub stdout: String,
    /// Captured standard error stream.
    pub stderr: String,
}

impl RemoteCommandOutput {
    /// Returns `true` when the remote command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

impl From<CommandOutput> for RemoteCommandOutput {
    fn from(output: CommandOutput) -> Self {
        Self {
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError>;

    /// Runs `program` attached to the caller's terminal and returns its exit
    /// code.
    ///
    /// The default implementation delegates to [`CommandRunner::run`], which
    /// is what scripted runners want.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Spawn`] if the command cannot be started.
    fn run_interactive(&self, program: &str, args: &[OsString]) -> Result<Option<i32>, SessionError> {
        self.run(program, args).map(|output| output.code)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| SessionError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_interactive(&self, program: &str, args: &[OsString]) -> Result<Option<i32>, SessionError> {
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|err| SessionError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;
        Ok(status.code())
    }
}

/// Formats an optional exit code for humans.
pub(crate) fn status_text(code: Option<i32>) -> String {
    code.map_or_else(|| String::from("unknown"), |value| value.to_string())
}
