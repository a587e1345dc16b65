//! Artifact store configuration loaded via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use super::StoreError;

/// Settings for the S3-compatible artifact store.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HASHFLEET_STORE",
    discovery(
        app_name = "hashfleet",
        env_var = "HASHFLEET_CONFIG_PATH",
        config_file_name = "hashfleet.toml",
        dotfile_name = ".hashfleet.toml",
        project_file_name = "hashfleet.toml"
    )
)]
pub struct StoreConfig {
    /// Path to the `aws` CLI executable.
    #[ortho_config(default = "aws".to_owned())]
    pub aws_bin: String,
    /// Bucket that holds every namespace. Required.
    pub bucket: String,
    /// Endpoint of an S3-compatible service (for example
    /// `https://s3.fr-par.scw.cloud`). Uses AWS when unset.
    pub endpoint_url: Option<String>,
    /// Region passed to the CLI.
    pub region: Option<String>,
    /// Access key forwarded to the node so the script can upload results.
    pub access_key: Option<String>,
    /// Secret key forwarded to the node.
    pub secret_key: Option<String>,
}

impl StoreConfig {
    /// Ensures the bucket and CLI path are present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] naming the missing field.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (value, field) in [(&self.aws_bin, "aws_bin"), (&self.bucket, "bucket")] {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidConfig {
                    field: field.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, StoreError> {
        Self::load_from_iter([std::ffi::OsString::from("hashfleet")])
            .map_err(|err| StoreError::Config(err.to_string()))
    }

    /// Global `aws` options shared by every invocation.
    #[must_use]
    pub fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(endpoint) = self.endpoint_url.as_deref().filter(|v| !v.trim().is_empty()) {
            args.push(String::from("--endpoint-url"));
            args.push(endpoint.to_owned());
        }
        if let Some(region) = self.region.as_deref().filter(|v| !v.trim().is_empty()) {
            args.push(String::from("--region"));
            args.push(region.to_owned());
        }
        args
    }
}
