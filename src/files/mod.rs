//! Operator commands over the artifact store: list, get, put, cat, delete.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

use crate::backend::InstanceSummary;
use crate::local_fs::{self, LocalFsError};
use crate::prompt::{PromptError, Prompter};
use crate::session::basename;
use crate::store::{ArtifactStore, Namespace, StoreError};
use crate::table::Table;

/// Errors raised by the file commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FilesError {
    /// Raised when the request cannot be satisfied as given.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },
    /// Raised when the operator declines a confirmation.
    #[error("cancelled")]
    Cancelled,
    /// Raised when output cannot be written.
    #[error("failed to write output: {0}")]
    Output(String),
    /// Wraps artifact store failures.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Wraps operator prompt failures.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// Wraps local file failures.
    #[error(transparent)]
    Local(#[from] LocalFsError),
}

impl FilesError {
    /// Returns `true` for argument errors, which map to exit status 2.
    #[must_use]
    pub const fn is_invalid_arguments(&self) -> bool {
        matches!(self, Self::InvalidArguments { .. })
    }
}

/// How downloaded artifacts are combined by `get --merge`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MergeStrategy {
    /// Concatenate in the order given.
    Cat,
    /// Sorted unique lines.
    Uniq,
    /// Unique lines ranked by how often they occur, most frequent first.
    Sort,
}

impl MergeStrategy {
    /// Strategy used when none is given: frequency ranking for wordlists,
    /// unique lines otherwise.
    #[must_use]
    pub const fn default_for(namespace: Namespace) -> Self {
        match namespace {
            Namespace::Wordlists => Self::Sort,
            Namespace::Hashlists | Namespace::Dumps | Namespace::Rules => Self::Uniq,
        }
    }

    /// Merges file contents into one newline-terminated text.
    #[must_use]
    pub fn merge(self, contents: &[String]) -> String {
        let lines = contents.iter().flat_map(|content| content.lines());
        let merged: Vec<&str> = match self {
            Self::Cat => lines.collect(),
            Self::Uniq => lines.collect::<BTreeSet<_>>().into_iter().collect(),
            Self::Sort => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for line in lines {
                    *counts.entry(line).or_default() += 1;
                }
                let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                ranked.into_iter().map(|(line, _)| line).collect()
            }
        };
        merged.iter().fold(String::new(), |mut out, line| {
            out.push_str(line);
            out.push('\n');
            out
        })
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cat => "cat",
            Self::Uniq => "uniq",
            Self::Sort => "sort",
        })
    }
}

impl FromStr for MergeStrategy {
    type Err = FilesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cat" => Ok(Self::Cat),
            "uniq" => Ok(Self::Uniq),
            "sort" => Ok(Self::Sort),
            other => Err(FilesError::InvalidArguments {
                message: format!("unknown merge strategy: {other}"),
            }),
        }
    }
}

/// Name of the merged output: stems joined with `+`, then the singular
/// namespace as extension.
#[must_use]
pub fn merged_file_name(namespace: Namespace, names: &[String]) -> String {
    let stems: Vec<&str> = names
        .iter()
        .map(|name| {
            let base = basename(name);
            base.rsplit_once('.').map_or(base, |(stem, _)| stem)
        })
        .collect();
    format!("{}.{}", stems.join("+"), namespace.singular())
}

/// Table of artifacts in one namespace, or in all of them with
/// `namespace/name` keys when `namespace` is `None`.
///
/// # Errors
///
/// Returns [`FilesError::Store`] when a listing fails.
pub fn artifact_table<S>(store: &S, namespace: Option<Namespace>) -> Result<Table, FilesError>
where
    S: ArtifactStore + ?Sized,
{
    let mut table = Table::new(["Filename", "Size", "Last Modified"]);
    let namespaces = namespace.map_or_else(|| Namespace::ALL.to_vec(), |single| vec![single]);
    for current in namespaces {
        for entry in store.list(current)? {
            let name = if namespace.is_some() {
                entry.name
            } else {
                format!("{current}/{}", entry.name)
            };
            table.push_row([name, entry.size.to_string(), entry.last_modified]);
        }
    }
    Ok(table)
}

/// Table of instances managed by this tool.
#[must_use]
pub fn session_table(instances: &[InstanceSummary]) -> Table {
    let mut table = Table::new(["ID", "Session", "Type", "State", "IP"]);
    for instance in instances {
        table.push_row([
            instance.handle.id.clone(),
            instance.session.clone().unwrap_or_default(),
            instance.instance_type.clone(),
            instance.state.clone(),
            instance
                .networking
                .as_ref()
                .map_or_else(String::new, |net| net.public_ip.to_string()),
        ]);
    }
    table
}

/// How overwrite questions are answered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Overwrite {
    /// Replace without asking.
    pub force: bool,
    /// Default answer is yes.
    pub yes: bool,
    /// Take the default answer without asking.
    pub quiet: bool,
}

impl Overwrite {
    fn confirm<P>(self, prompter: &P, question: &str) -> Result<bool, PromptError>
    where
        P: Prompter + ?Sized,
    {
        prompter.confirm(question, self.force || self.yes, self.force || self.quiet)
    }
}

/// Options for [`get`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GetOptions {
    /// Answers to overwrite questions for existing local files.
    pub overwrite: Overwrite,
    /// Merge every artifact into one file.
    pub merge: bool,
    /// Merge strategy; defaults per namespace.
    pub strategy: Option<MergeStrategy>,
    /// Output path.
    pub outfile: Option<Utf8PathBuf>,
}

fn names_or_all<S>(
    store: &S,
    namespace: Namespace,
    names: &[String],
) -> Result<Vec<String>, FilesError>
where
    S: ArtifactStore + ?Sized,
{
    if !names.is_empty() {
        return Ok(names.to_vec());
    }
    Ok(store
        .list(namespace)?
        .into_iter()
        .map(|entry| entry.name)
        .collect())
}

/// Downloads artifacts, optionally merging them; returns the files written.
///
/// # Errors
///
/// Returns [`FilesError::InvalidArguments`] when nothing matches, or when an
/// output file is given for several unmerged downloads. Store, prompt, and
/// local file failures are propagated.
pub fn get<S, P>(
    store: &S,
    prompter: &P,
    namespace: Namespace,
    names: &[String],
    options: &GetOptions,
) -> Result<Vec<Utf8PathBuf>, FilesError>
where
    S: ArtifactStore + ?Sized,
    P: Prompter + ?Sized,
{
    let selected = names_or_all(store, namespace, names)?;
    if selected.is_empty() {
        return Err(FilesError::InvalidArguments {
            message: String::from("cannot find any files to download"),
        });
    }
    if !options.merge && options.outfile.is_some() && selected.len() > 1 {
        return Err(FilesError::InvalidArguments {
            message: String::from(
                "cannot specify outfile when not merging and requesting more than one file",
            ),
        });
    }

    if options.merge {
        let strategy = options
            .strategy
            .unwrap_or_else(|| MergeStrategy::default_for(namespace));
        let outfile = options
            .outfile
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(merged_file_name(namespace, &selected)));
        let contents = selected
            .iter()
            .map(|name| store.read(namespace, name))
            .collect::<Result<Vec<_>, _>>()?;
        info!(%strategy, "Merging files...");
        local_fs::write(&outfile, strategy.merge(&contents))?;
        info!(%outfile, "Saved");
        return Ok(vec![outfile]);
    }

    let mut written = Vec::with_capacity(selected.len());
    for name in &selected {
        let local = options
            .outfile
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(basename(name)));
        if local_fs::is_file(&local)?
            && !options.overwrite.confirm(
                prompter,
                &format!("File '{local}' already exists, replace with '{namespace}/{name}'?"),
            )?
        {
            continue;
        }
        store.download(namespace, name, Some(&local))?;
        written.push(local);
    }
    Ok(written)
}

/// Uploads local files; returns the names stored.
///
/// An existing artifact is replaced only after confirmation.
///
/// # Errors
///
/// Returns [`FilesError::Store`] when a file is missing or the upload fails.
pub fn put<S, P>(
    store: &S,
    prompter: &P,
    namespace: Namespace,
    files: &[Utf8PathBuf],
    overwrite: Overwrite,
) -> Result<Vec<String>, FilesError>
where
    S: ArtifactStore + ?Sized,
    P: Prompter + ?Sized,
{
    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let name = basename(file.as_str());
        if store.exists(namespace, name)?
            && !overwrite.confirm(
                prompter,
                &format!(
                    "File '{namespace}/{name}' already exists in the store, replace with '{file}'?"
                ),
            )?
        {
            continue;
        }
        store.upload(namespace, file, None)?;
        uploaded.push(name.to_owned());
    }
    Ok(uploaded)
}

/// Writes an artifact's content to `out`.
///
/// # Errors
///
/// Returns [`FilesError::Store`] when the artifact is missing, or
/// [`FilesError::Output`] when writing fails.
pub fn cat<S>(
    store: &S,
    namespace: Namespace,
    name: &str,
    mut out: impl Write,
) -> Result<(), FilesError>
where
    S: ArtifactStore + ?Sized,
{
    let content = store.read(namespace, name)?;
    out.write_all(content.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| FilesError::Output(err.to_string()))
}

/// Options for [`delete`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeleteOptions {
    /// Delete everything without asking when no names are given.
    pub force: bool,
    /// Ask before each deletion.
    pub interactive: bool,
}

/// Deletes artifacts; returns the names removed.
///
/// With no names, every artifact of the namespace is deleted after one
/// confirmation (skipped by `force`).
///
/// # Errors
///
/// Returns [`FilesError::Cancelled`] when the bulk deletion is declined.
pub fn delete<S, P>(
    store: &S,
    prompter: &P,
    namespace: Namespace,
    names: &[String],
    options: DeleteOptions,
) -> Result<Vec<String>, FilesError>
where
    S: ArtifactStore + ?Sized,
    P: Prompter + ?Sized,
{
    if names.is_empty()
        && !options.force
        && !prompter.confirm(
            &format!("Really delete all files of type '{namespace}'?"),
            false,
            false,
        )?
    {
        return Err(FilesError::Cancelled);
    }

    let mut deleted = Vec::new();
    for name in names_or_all(store, namespace, names)? {
        if options.interactive
            && !prompter.confirm(&format!("Delete {namespace}/{name}?"), false, false)?
        {
            continue;
        }
        store.delete(namespace, &name)?;
        info!(%namespace, name = %name, "Deleted");
        deleted.push(name);
    }
    Ok(deleted)
}
