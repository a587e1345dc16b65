//! Interactive confirmation and line input.
//!
//! Commands ask before destructive actions. The [`Prompter`] trait keeps the
//! terminal out of the batch compiler and the file commands so tests can
//! script answers.

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Errors raised while talking to the operator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PromptError {
    /// Raised when the terminal cannot be read or written.
    #[error("terminal I/O failed: {0}")]
    Io(String),
}

/// Source of operator answers.
pub trait Prompter {
    /// Asks a yes/no `question`.
    ///
    /// Returns `default` without asking when `skip` is set, or when the
    /// operator enters an empty answer.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when the terminal fails.
    fn confirm(&self, question: &str, default: bool, skip: bool) -> Result<bool, PromptError>;

    /// Reads one line after printing `prompt`. Returns `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when the terminal fails.
    fn read_line(&self, prompt: &str) -> Result<Option<String>, PromptError>;
}

/// Reads lines from `prompter` until an empty line or end of input.
///
/// # Errors
///
/// Returns [`PromptError`] when the terminal fails.
pub fn read_lines_until_empty<P: Prompter + ?Sized>(
    prompter: &P,
    prompt: &str,
) -> Result<Vec<String>, PromptError> {
    let mut lines = Vec::new();
    while let Some(line) = prompter.read_line(prompt)? {
        if line.trim().is_empty() {
            break;
        }
        lines.push(line);
    }
    Ok(lines)
}

/// Interprets a typed answer. `None` means the answer must be asked again.
#[must_use]
pub fn parse_answer(answer: &str, default: bool) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Prompter bound to the process's stdin and stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn io_error(err: &io::Error) -> PromptError {
        PromptError::Io(err.to_string())
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default: bool, skip: bool) -> Result<bool, PromptError> {
        if skip {
            return Ok(default);
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let Some(answer) = self.read_line(&format!("{question} {hint} "))? else {
                return Ok(default);
            };
            if let Some(decision) = parse_answer(&answer, default) {
                return Ok(decision);
            }
        }
    }

    fn read_line(&self, prompt: &str) -> Result<Option<String>, PromptError> {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(prompt.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|err| Self::io_error(&err))?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|err| Self::io_error(&err))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }
}
