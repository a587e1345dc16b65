//! Configuration loading via `ortho-config`.

use crate::backend::InstanceRequest;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Scaleway specific configuration derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "hashfleet",
        env_var = "HASHFLEET_CONFIG_PATH",
        config_file_name = "hashfleet.toml",
        dotfile_name = ".hashfleet.toml",
        project_file_name = "hashfleet.toml"
    )
)]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Not needed for API
    /// calls.
    pub access_key: Option<String>,
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: String,
    /// Availability zone. Defaults to `fr-par-2`, where GPU types live.
    #[ortho_config(default = "fr-par-2".to_owned())]
    pub default_zone: String,
    /// Commercial type for new instances.
    #[ortho_config(default = "GPU-3070-S".to_owned())]
    pub default_instance_type: String,
    /// Human-friendly image label.
    #[ortho_config(default = "Ubuntu 22.04 Jammy Jellyfish".to_owned())]
    pub default_image: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Where hashcat lives on the node and how the job is named.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HASHFLEET_CRACK",
    discovery(
        app_name = "hashfleet",
        env_var = "HASHFLEET_CONFIG_PATH",
        config_file_name = "hashfleet.toml",
        dotfile_name = ".hashfleet.toml",
        project_file_name = "hashfleet.toml"
    )
)]
pub struct CrackConfig {
    /// Directory holding the hashcat install and its bundled `rules/`.
    #[ortho_config(default = "/opt/hashcat".to_owned())]
    pub hashcat_home: String,
    /// Executable name inside `hashcat_home`; also the process killed by a
    /// graceful stop.
    #[ortho_config(default = "hashcat".to_owned())]
    pub hashcat_binary: String,
    /// Name of the `screen` session jobs run in.
    #[ortho_config(default = "hashfleet".to_owned())]
    pub screen_name: String,
}

impl CrackConfig {
    /// Returns the built-in defaults, matching an unconfigured install.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            hashcat_home: String::from("/opt/hashcat"),
            hashcat_binary: String::from("hashcat"),
            screen_name: String::from("hashfleet"),
        }
    }

    /// Full path of the hashcat executable on the node.
    #[must_use]
    pub fn hashcat_path(&self) -> String {
        format!(
            "{}/{}",
            self.hashcat_home.trim_end_matches('/'),
            self.hashcat_binary
        )
    }

    /// Loads configuration from defaults, configuration files, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hashfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures every field is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a field is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.hashcat_home,
            &FieldMetadata::new("hashcat directory", "HASHFLEET_CRACK_HASHCAT_HOME", "hashcat_home", "crack"),
        )?;
        require_field(
            &self.hashcat_binary,
            &FieldMetadata::new("hashcat binary", "HASHFLEET_CRACK_HASHCAT_BINARY", "hashcat_binary", "crack"),
        )?;
        require_field(
            &self.screen_name,
            &FieldMetadata::new("screen session name", "HASHFLEET_CRACK_SCREEN_NAME", "screen_name", "crack"),
        )
    }
}


/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in hashfleet.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hashfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds an [`InstanceRequest`] for `session_name` using the configured
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_request(&self, session_name: &str) -> Result<InstanceRequest, ConfigError> {
        self.validate()?;
        InstanceRequest::builder()
            .image_label(&self.default_image)
            .instance_type(&self.default_instance_type)
            .zone(&self.default_zone)
            .project_id(&self.default_project_id)
            .organisation_id(self.default_organization_id.clone())
            .architecture(&self.default_architecture)
            .session_name(session_name)
            .build()
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            (
                &self.secret_key,
                FieldMetadata::new("Scaleway API secret key", "SCW_SECRET_KEY", "secret_key", "scaleway"),
            ),
            (
                &self.default_project_id,
                FieldMetadata::new(
                    "Scaleway project ID",
                    "SCW_DEFAULT_PROJECT_ID",
                    "default_project_id",
                    "scaleway",
                ),
            ),
            (
                &self.default_image,
                FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image", "scaleway"),
            ),
            (
                &self.default_instance_type,
                FieldMetadata::new(
                    "instance type",
                    "SCW_DEFAULT_INSTANCE_TYPE",
                    "default_instance_type",
                    "scaleway",
                ),
            ),
            (
                &self.default_zone,
                FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone", "scaleway"),
            ),
            (
                &self.default_architecture,
                FieldMetadata::new(
                    "CPU architecture",
                    "SCW_DEFAULT_ARCHITECTURE",
                    "default_architecture",
                    "scaleway",
                ),
            ),
        ];
        for (value, metadata) in &fields {
            require_field(value, metadata)?;
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
