//! Reads batch files and scripts from a path, stdin (`-`), or the terminal
//! (`+`).

use std::io::BufRead;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::local_fs::{self, LocalFsError};
use crate::orchestrator::ScriptInput;
use crate::prompt::{PromptError, Prompter, read_lines_until_empty};

/// Errors raised while reading operator input.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InputError {
    /// Raised when a named input file does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// Path as given.
        path: Utf8PathBuf,
    },
    /// Raised when standard input cannot be read.
    #[error("failed to read standard input: {0}")]
    Stdin(String),
    /// Wraps terminal prompt failures.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// Wraps local file failures.
    #[error(transparent)]
    Local(#[from] LocalFsError),
}

/// Where lines are read from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputSource {
    /// Standard input, selected by `-`.
    Stdin,
    /// Lines typed at a prompt until an empty line, selected by `+`.
    Interactive,
    /// A local file.
    File(Utf8PathBuf),
}

impl InputSource {
    /// Interprets a command-line argument.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "-" => Self::Stdin,
            "+" => Self::Interactive,
            path => Self::File(Utf8PathBuf::from(path)),
        }
    }

    /// Returns `true` when the input consumes standard input, which rules
    /// out attaching a terminal afterwards.
    #[must_use]
    pub const fn is_stdin(&self) -> bool {
        matches!(self, Self::Stdin)
    }
}

fn ensure_file(path: &Utf8Path) -> Result<(), InputError> {
    if local_fs::is_file(path)? {
        Ok(())
    } else {
        Err(InputError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Reads every line of `source`.
///
/// # Errors
///
/// Returns [`InputError`] when the file is missing or reading fails.
pub fn read_lines<P, I>(
    source: &InputSource,
    prompter: &P,
    prompt: &str,
    stdin: I,
) -> Result<Vec<String>, InputError>
where
    P: Prompter + ?Sized,
    I: BufRead,
{
    match source {
        InputSource::Stdin => stdin
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| InputError::Stdin(err.to_string())),
        InputSource::Interactive => Ok(read_lines_until_empty(prompter, prompt)?),
        InputSource::File(path) => {
            ensure_file(path)?;
            let content = local_fs::read_to_string(path)?;
            Ok(content.lines().map(str::to_owned).collect())
        }
    }
}

/// Builds the script for `runscript`. Files are copied untouched; stdin and
/// typed scripts are collected as lines.
///
/// # Errors
///
/// Returns [`InputError`] when the file is missing or reading fails.
pub fn script_input<P, I>(
    source: &InputSource,
    prompter: &P,
    stdin: I,
) -> Result<ScriptInput, InputError>
where
    P: Prompter + ?Sized,
    I: BufRead,
{
    if let InputSource::File(path) = source {
        ensure_file(path)?;
        return Ok(ScriptInput::File(path.clone()));
    }
    let lines = read_lines(source, prompter, "script> ", stdin)?
        .into_iter()
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    Ok(ScriptInput::Lines(lines))
}
