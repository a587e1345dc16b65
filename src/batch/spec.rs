//! Task specifications and batch expansion.

use std::collections::HashSet;

use clap::Parser;

use super::BatchError;
use crate::cli::TaskArgs;
use crate::session::basename;

/// Character marking a source as a hashcat mask rather than a wordlist.
pub const MASK_MARKER: char = '?';

/// Prefix selecting a rule file bundled with hashcat on the node.
pub const BUILTIN_RULES_PREFIX: &str = "builtin:";

/// Marker that starts a comment line in batch input.
const COMMENT_MARKER: char = '#';

/// One attack input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Source {
    /// Wordlist identifier: a local path or a stored name.
    Wordlist(String),
    /// Literal hashcat mask, never staged.
    Mask(String),
}

impl Source {
    /// Classifies a raw source argument.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.contains(MASK_MARKER) {
            Self::Mask(raw.to_owned())
        } else {
            Self::Wordlist(raw.to_owned())
        }
    }

    /// Returns the text as given by the user.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Wordlist(value) | Self::Mask(value) => value,
        }
    }
}

/// Rule set applied by an attack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rules {
    /// Rule file shipped with hashcat, addressed by name.
    Builtin(String),
    /// Rule file identifier: a local path or a stored name.
    Artifact(String),
}

impl Rules {
    /// Classifies a raw `--rules` value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix(BUILTIN_RULES_PREFIX).map_or_else(
            || Self::Artifact(raw.to_owned()),
            |name| Self::Builtin(name.to_owned()),
        )
    }
}

/// One cracking task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskSpec {
    /// Hashlist identifier.
    pub target: String,
    /// Wordlists and masks; empty means every stored wordlist.
    pub sources: Vec<Source>,
    /// Optional rule set.
    pub rules: Option<Rules>,
    /// Hashcat attack mode.
    pub attack_mode: String,
    /// Hashcat hash type.
    pub hash_type: String,
    /// Extra hashcat flags, passed through verbatim.
    pub extra_args: String,
    /// Upload the reduced hashlist after the attack.
    pub update_hashlist: bool,
    /// Merge and upload the cracked hash dump.
    pub dump_cracked: bool,
    /// Merge and upload a wordlist of cracked passwords.
    pub make_dict: bool,
}

fn required(value: Option<String>, what: &str) -> Result<String, BatchError> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| BatchError::InvalidArguments {
            message: format!("missing {what}"),
        })
}

impl TryFrom<TaskArgs> for TaskSpec {
    type Error = BatchError;

    fn try_from(args: TaskArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            target: required(args.target, "HASHLIST")?,
            attack_mode: required(args.attack_mode, "--attack-mode")?,
            hash_type: required(args.hash_type, "--hash-type")?,
            sources: args.sources.iter().map(|raw| Source::parse(raw)).collect(),
            rules: args.rules.as_deref().map(Rules::parse),
            extra_args: args.hashcat_args,
            update_hashlist: args.update_hashlist,
            dump_cracked: args.dump_cracked,
            make_dict: args.make_dict,
        })
    }
}

/// Parses one batch line with the same grammar as `hashfleet crack`.
///
/// The line is split with POSIX shell rules. A leading `crack` word is
/// accepted and ignored.
///
/// # Errors
///
/// Returns [`BatchError::InvalidArguments`] when the line cannot be split or
/// parsed, or lacks a required field.
pub fn parse_task_line(line: &str) -> Result<TaskSpec, BatchError> {
    let mut words = shlex::split(line).ok_or_else(|| BatchError::InvalidArguments {
        message: String::from("unbalanced quotes"),
    })?;
    if words.first().is_some_and(|word| word == "crack") {
        words.remove(0);
    }

    let args = TaskArgs::try_parse_from(std::iter::once(String::from("crack")).chain(words))
        .map_err(|err| BatchError::InvalidArguments {
            message: first_line(&err.to_string()),
        })?;
    TaskSpec::try_from(args)
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unparseable arguments")
        .trim_start_matches("error: ")
        .to_owned()
}

/// Ordered, non-empty sequence of tasks sharing one node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Batch {
    tasks: Vec<TaskSpec>,
}

impl Batch {
    /// Wraps a single task.
    #[must_use]
    pub fn single(task: TaskSpec) -> Self {
        Self { tasks: vec![task] }
    }

    /// Builds a batch from already-parsed tasks.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::EmptyBatch`] when `tasks` is empty.
    pub fn from_tasks(tasks: Vec<TaskSpec>) -> Result<Self, BatchError> {
        if tasks.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        Ok(Self { tasks })
    }

    /// Parses batch input, one task per line.
    ///
    /// Blank lines and lines starting with `#` are skipped. Line order is
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidLine`] for the first malformed line, or
    /// [`BatchError::EmptyBatch`] when no task remains.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tasks = Vec::new();
        for (index, raw) in lines.into_iter().enumerate() {
            let text = raw.as_ref().trim();
            if text.is_empty() || text.starts_with(COMMENT_MARKER) {
                continue;
            }
            let task = parse_task_line(text).map_err(|err| BatchError::InvalidLine {
                line: index + 1,
                text: text.to_owned(),
                message: match err {
                    BatchError::InvalidArguments { message } => message,
                    other => other.to_string(),
                },
            })?;
            tasks.push(task);
        }
        Self::from_tasks(tasks)
    }

    /// Tasks in input order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Always `false`; a batch holds at least one task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Default session name: distinct target basenames joined with `+`, in
    /// first-seen order.
    #[must_use]
    pub fn session_name(&self) -> String {
        let mut seen = HashSet::new();
        self.tasks
            .iter()
            .map(|task| basename(&task.target))
            .filter(|name| seen.insert(*name))
            .collect::<Vec<_>>()
            .join("+")
    }
}
