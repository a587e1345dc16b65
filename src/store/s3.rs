//! [`ArtifactStore`] backed by the `aws` CLI.

use std::ffi::OsString;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

use super::{ArtifactEntry, ArtifactStore, Namespace, StoreConfig, StoreError};
use crate::local_fs;
use crate::session::{CommandOutput, CommandRunner, ProcessCommandRunner, basename};

/// Shells out to `aws s3api` and `aws s3` for every operation.
#[derive(Clone, Debug)]
pub struct S3CliStore<R: CommandRunner> {
    config: StoreConfig,
    runner: R,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsOutput {
    #[serde(default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    last_modified: String,
}

impl S3CliStore<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: StoreConfig) -> Result<Self, StoreError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> S3CliStore<R> {
    /// Creates a store client using the provided runner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] when validation fails.
    pub fn new(config: StoreConfig, runner: R) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the `s3://` URI of an object.
    #[must_use]
    pub fn uri(&self, namespace: Namespace, name: &str) -> String {
        format!("s3://{}/{namespace}/{name}", self.config.bucket)
    }

    fn invoke(&self, args: &[String]) -> Result<CommandOutput, StoreError> {
        let mut full: Vec<OsString> = self
            .config
            .global_args()
            .into_iter()
            .map(OsString::from)
            .collect();
        full.extend(args.iter().map(OsString::from));
        debug!(program = %self.config.aws_bin, args = ?args, "invoking store CLI");

        let output = self.runner.run(&self.config.aws_bin, &full)?;
        if output.is_success() {
            return Ok(output);
        }
        Err(StoreError::CommandFailure {
            program: self.config.aws_bin.clone(),
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    fn ensure_exists(&self, namespace: Namespace, name: &str) -> Result<(), StoreError> {
        if self.exists(namespace, name)? {
            return Ok(());
        }
        Err(StoreError::NotFound {
            namespace,
            name: name.to_owned(),
            bucket: self.config.bucket.clone(),
        })
    }
}

/// Decodes `aws s3api list-objects-v2 --output json` output.
///
/// Keys outside `namespace/` and the bare prefix entry are skipped. The
/// result is sorted by name.
pub(crate) fn parse_listing(
    namespace: Namespace,
    stdout: &str,
) -> Result<Vec<ArtifactEntry>, StoreError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: ListObjectsOutput =
        serde_json::from_str(stdout).map_err(|err| StoreError::Parse(err.to_string()))?;
    let prefix = format!("{namespace}/");

    let mut entries: Vec<ArtifactEntry> = parsed
        .contents
        .into_iter()
        .filter_map(|object| {
            let name = object.key.strip_prefix(&prefix)?;
            if name.is_empty() {
                return None;
            }
            Some(ArtifactEntry {
                name: name.to_owned(),
                size: object.size,
                last_modified: object.last_modified,
            })
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

impl<R: CommandRunner> ArtifactStore for S3CliStore<R> {
    fn exists(&self, namespace: Namespace, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .list(namespace)?
            .iter()
            .any(|entry| entry.name == name))
    }

    fn list(&self, namespace: Namespace) -> Result<Vec<ArtifactEntry>, StoreError> {
        let output = self.invoke(&[
            String::from("s3api"),
            String::from("list-objects-v2"),
            String::from("--bucket"),
            self.config.bucket.clone(),
            String::from("--prefix"),
            format!("{namespace}/"),
            String::from("--output"),
            String::from("json"),
        ])?;
        parse_listing(namespace, &output.stdout)
    }

    fn upload(
        &self,
        namespace: Namespace,
        local: &Utf8Path,
        remote_name: Option<&str>,
    ) -> Result<(), StoreError> {
        if !local_fs::is_file(local)? {
            return Err(StoreError::LocalNotFound {
                path: local.to_string(),
            });
        }
        let name = remote_name.unwrap_or_else(|| basename(local.as_str()));
        self.invoke(&[
            String::from("s3"),
            String::from("cp"),
            String::from("--only-show-errors"),
            local.to_string(),
            self.uri(namespace, name),
        ])
        .map(|_| ())
    }

    fn download(
        &self,
        namespace: Namespace,
        remote_name: &str,
        local: Option<&Utf8Path>,
    ) -> Result<(), StoreError> {
        self.ensure_exists(namespace, remote_name)?;
        let destination = local.map_or_else(|| remote_name.to_owned(), ToString::to_string);
        self.invoke(&[
            String::from("s3"),
            String::from("cp"),
            String::from("--only-show-errors"),
            self.uri(namespace, remote_name),
            destination,
        ])
        .map(|_| ())
    }

    fn read(&self, namespace: Namespace, name: &str) -> Result<String, StoreError> {
        self.ensure_exists(namespace, name)?;
        self.invoke(&[
            String::from("s3"),
            String::from("cp"),
            String::from("--only-show-errors"),
            self.uri(namespace, name),
            String::from("-"),
        ])
        .map(|output| output.stdout)
    }

    fn delete(&self, namespace: Namespace, name: &str) -> Result<(), StoreError> {
        self.ensure_exists(namespace, name)?;
        self.invoke(&[
            String::from("s3"),
            String::from("rm"),
            String::from("--only-show-errors"),
            self.uri(namespace, name),
        ])
        .map(|_| ())
    }
}
