//! Staging resolution: uploads local inputs and rewrites task paths to their
//! location on the node.

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use super::{Batch, BatchError, Rules, Source, TaskSpec};
use crate::local_fs;
use crate::prompt::Prompter;
use crate::session::{REMOTE_WORKDIR, basename};
use crate::store::{ArtifactStore, Namespace};

/// Operator choices that affect staging.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagingOptions {
    /// Default answer to overwrite questions.
    pub yes: bool,
    /// Take the default answer without asking.
    pub quiet: bool,
    /// Hashcat install directory on the node, for `builtin:` rules.
    pub hashcat_home: String,
}

/// Local file referenced from extra hashcat arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtraFile {
    /// Path on the operator's machine.
    pub local: Utf8PathBuf,
    /// Destination on the node.
    pub remote: String,
}

/// Artifacts to pull onto the node before the script runs.
///
/// Each set holds store names in first-seen order, without duplicates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StagingPlan {
    /// Names in the `hashlists` namespace.
    pub targets: Vec<String>,
    /// Names in the `wordlists` namespace. Masks never appear here.
    pub sources: Vec<String>,
    /// Names in the `rules` namespace. Built-in rules never appear here.
    pub rules: Vec<String>,
    /// Files copied directly to the node, one entry per occurrence.
    pub extra_files: Vec<ExtraFile>,
}

/// Task with every path rewritten to its location on the node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedTask {
    /// Remote hashlist path.
    pub target: String,
    /// Remote wordlist paths and untouched masks.
    pub sources: Vec<String>,
    /// Remote rules path.
    pub rules: Option<String>,
    /// Hashcat attack mode.
    pub attack_mode: String,
    /// Hashcat hash type.
    pub hash_type: String,
    /// Extra hashcat flags with local file paths rewritten.
    pub extra_args: String,
    /// Upload the reduced hashlist after the attack.
    pub update_hashlist: bool,
    /// Merge and upload the cracked hash dump.
    pub dump_cracked: bool,
    /// Merge and upload a wordlist of cracked passwords.
    pub make_dict: bool,
}

/// Result of [`resolve_staging`]: the plan plus the rewritten batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedBatch {
    /// Artifacts to stage.
    pub plan: StagingPlan,
    /// Rewritten tasks in input order.
    pub tasks: Vec<StagedTask>,
}

/// Path of a staged artifact on the node.
#[must_use]
pub fn remote_path(identifier: &str) -> String {
    format!("{REMOTE_WORKDIR}/{}", basename(identifier))
}

fn push_unique(set: &mut Vec<String>, name: &str) {
    if !set.iter().any(|existing| existing == name) {
        set.push(name.to_owned());
    }
}

/// Uploads local inputs to the store and rewrites the batch for the node.
///
/// Runs per task in order. The input batch is left untouched.
///
/// # Errors
///
/// Returns [`BatchError::ArtifactNotFound`] when a target or rules file is
/// missing locally and from the store, or when a source is missing in a
/// single-task batch. Store and prompt failures are propagated.
pub fn resolve_staging<S, P>(
    batch: &Batch,
    store: &S,
    prompter: &P,
    options: &StagingOptions,
) -> Result<StagedBatch, BatchError>
where
    S: ArtifactStore + ?Sized,
    P: Prompter + ?Sized,
{
    info!("Uploading files to the store...");
    let mut resolver = Resolver {
        store,
        prompter,
        options,
        tolerate_missing_sources: batch.len() > 1,
        seen_targets: HashSet::new(),
        seen_sources: HashSet::new(),
        seen_rules: HashSet::new(),
        plan: StagingPlan::default(),
    };

    let mut tasks = Vec::with_capacity(batch.len());
    for task in batch.tasks() {
        tasks.push(resolver.stage_task(task)?);
    }
    Ok(StagedBatch {
        plan: resolver.plan,
        tasks,
    })
}

struct Resolver<'a, S: ?Sized, P: ?Sized> {
    store: &'a S,
    prompter: &'a P,
    options: &'a StagingOptions,
    tolerate_missing_sources: bool,
    seen_targets: HashSet<String>,
    seen_sources: HashSet<String>,
    seen_rules: HashSet<String>,
    plan: StagingPlan,
}

impl<S, P> Resolver<'_, S, P>
where
    S: ArtifactStore + ?Sized,
    P: Prompter + ?Sized,
{
    fn stage_task(&mut self, task: &TaskSpec) -> Result<StagedTask, BatchError> {
        if self.seen_targets.insert(task.target.clone()) {
            self.stage_artifact(Namespace::Hashlists, &task.target, true)?;
        }
        push_unique(&mut self.plan.targets, basename(&task.target));

        let sources = self.stage_sources(&task.sources)?;
        let rules = task
            .rules
            .as_ref()
            .map(|rules| self.stage_rules(rules))
            .transpose()?;
        let extra_args = self.stage_extra_args(&task.extra_args)?;

        Ok(StagedTask {
            target: remote_path(&task.target),
            sources,
            rules,
            attack_mode: task.attack_mode.clone(),
            hash_type: task.hash_type.clone(),
            extra_args,
            update_hashlist: task.update_hashlist,
            dump_cracked: task.dump_cracked,
            make_dict: task.make_dict,
        })
    }

    fn stage_sources(&mut self, sources: &[Source]) -> Result<Vec<String>, BatchError> {
        if sources.is_empty() {
            let wordlists = self.store.list(Namespace::Wordlists)?;
            return Ok(wordlists
                .into_iter()
                .map(|entry| {
                    push_unique(&mut self.plan.sources, &entry.name);
                    remote_path(&entry.name)
                })
                .collect());
        }

        let mut staged = Vec::with_capacity(sources.len());
        for source in sources {
            match source {
                Source::Mask(mask) => staged.push(mask.clone()),
                Source::Wordlist(wordlist) => {
                    if self.seen_sources.insert(wordlist.clone()) {
                        let required = !self.tolerate_missing_sources;
                        self.stage_artifact(Namespace::Wordlists, wordlist, required)?;
                    }
                    push_unique(&mut self.plan.sources, basename(wordlist));
                    staged.push(remote_path(wordlist));
                }
            }
        }
        Ok(staged)
    }

    fn stage_rules(&mut self, rules: &Rules) -> Result<String, BatchError> {
        match rules {
            Rules::Builtin(name) => Ok(format!(
                "{}/rules/{name}",
                self.options.hashcat_home.trim_end_matches('/')
            )),
            Rules::Artifact(identifier) => {
                if self.seen_rules.insert(identifier.clone()) {
                    self.stage_artifact(Namespace::Rules, identifier, true)?;
                }
                push_unique(&mut self.plan.rules, basename(identifier));
                Ok(remote_path(identifier))
            }
        }
    }

    fn stage_extra_args(&mut self, extra_args: &str) -> Result<String, BatchError> {
        let mut rewritten = extra_args.to_owned();
        let mut handled = HashSet::new();
        for token in extra_args.split_whitespace() {
            let candidate = token.split_once('=').map_or(token, |(_, value)| value);
            if candidate.is_empty()
                || handled.contains(candidate)
                || !local_fs::is_file(Utf8Path::new(candidate))?
            {
                continue;
            }
            handled.insert(candidate);
            let remote = remote_path(candidate);
            rewritten = rewritten.replace(candidate, &remote);
            self.plan.extra_files.push(ExtraFile {
                local: Utf8PathBuf::from(candidate),
                remote,
            });
        }
        Ok(rewritten)
    }

    fn stage_artifact(
        &self,
        namespace: Namespace,
        identifier: &str,
        required: bool,
    ) -> Result<(), BatchError> {
        let local = Utf8Path::new(identifier);
        let name = basename(identifier);
        let exists_local = local_fs::is_file(local)?;
        let exists_remote = self.store.exists(namespace, name)?;

        if exists_local {
            let upload = !exists_remote
                || self.prompter.confirm(
                    &format!(
                        "File '{namespace}/{name}' already exists in the store, replace with '{identifier}'?"
                    ),
                    self.options.yes,
                    self.options.quiet,
                )?;
            if upload {
                info!(%namespace, name, "uploading {identifier}");
                self.store.upload(namespace, local, None)?;
            }
            return Ok(());
        }

        if exists_remote {
            return Ok(());
        }
        if required {
            return Err(BatchError::ArtifactNotFound {
                path: identifier.to_owned(),
            });
        }
        warn!(%namespace, name, "{identifier} not found locally or in the store; continuing");
        Ok(())
    }
}
