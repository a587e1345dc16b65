//! Node preparation: store credentials, staged artifacts, and extra files.

use shell_escape::unix::escape;
use tracing::{info, warn};

use crate::batch::{StagingPlan, aws_prefix, object_uri, remote_path};
use crate::session::{CommandRunner, RemoteSession, SessionError};
use crate::store::{Namespace, StoreConfig};

/// Credentials file of the store CLI, relative to the remote home directory.
const CREDENTIALS_PATH: &str = ".aws/credentials";

/// Config file of the store CLI, relative to the remote home directory.
const CONFIG_PATH: &str = ".aws/config";

fn credentials_lines(access_key: &str, secret_key: &str) -> Vec<String> {
    vec![
        String::from("[default]"),
        format!("aws_access_key_id = {access_key}"),
        format!("aws_secret_access_key = {secret_key}"),
    ]
}

fn config_lines(region: Option<&str>) -> Vec<String> {
    let mut lines = vec![String::from("[default]")];
    if let Some(value) = region.filter(|value| !value.trim().is_empty()) {
        lines.push(format!("region = {value}"));
    }
    lines.push(String::from("output = json"));
    lines
}

/// Command that copies one stored object into the remote working directory.
pub(crate) fn pull_command(store: &StoreConfig, namespace: Namespace, name: &str) -> String {
    format!(
        "{} s3 cp --only-show-errors {} {}",
        aws_prefix(store.endpoint_url.as_deref()),
        object_uri(&store.bucket, namespace, name),
        escape(remote_path(name).into())
    )
}

fn write_store_credentials<R: CommandRunner>(
    remote: &RemoteSession<R>,
    store: &StoreConfig,
) -> Result<(), SessionError> {
    let (Some(access_key), Some(secret_key)) =
        (store.access_key.as_deref(), store.secret_key.as_deref())
    else {
        warn!("no store credentials configured; the node must reach the bucket on its own");
        return Ok(());
    };

    remote.run_checked("mkdir -p ~/.aws")?;
    remote.create_file(
        CREDENTIALS_PATH,
        &credentials_lines(access_key, secret_key),
        None,
    )?;
    remote.create_file(CONFIG_PATH, &config_lines(store.region.as_deref()), None)?;
    remote.run_checked(&format!("chmod 600 ~/{CREDENTIALS_PATH}"))?;
    Ok(())
}

/// Prepares the node for the generated script.
///
/// Hashlists and rules must arrive; a wordlist that fails to download is
/// logged and skipped, because batch staging tolerates missing sources.
pub(crate) fn bootstrap<R: CommandRunner>(
    remote: &RemoteSession<R>,
    plan: &StagingPlan,
    store: &StoreConfig,
) -> Result<(), SessionError> {
    info!("Bootstrapping instance...");
    write_store_credentials(remote, store)?;

    for name in &plan.targets {
        remote.run_checked(&pull_command(store, Namespace::Hashlists, name))?;
    }
    for name in &plan.rules {
        remote.run_checked(&pull_command(store, Namespace::Rules, name))?;
    }
    for name in &plan.sources {
        let output = remote.run_command(&pull_command(store, Namespace::Wordlists, name))?;
        if !output.is_success() {
            warn!(name, stderr = %output.stderr.trim(), "wordlist could not be pulled; continuing");
        }
    }
    for file in &plan.extra_files {
        remote.copy_file(&file.local, &file.remote, None)?;
    }
    Ok(())
}
