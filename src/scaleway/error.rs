//! Failures of the Scaleway GPU backend.
//!
//! Every message names the cracking node or the zone it lives in, so an
//! operator reading `hashfleet crack` output can tell which server to clean up.

use crate::backend::BackendError;
use crate::config::ConfigError;
use scaleway_rs::ScalewayError;
use thiserror::Error;

/// Failures while managing cracking nodes.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayBackendError {
    /// `SCW_*` settings are missing or inconsistent.
    #[error("scaleway settings rejected: {0}")]
    Config(String),
    /// The node request lacks a required field such as the session tag.
    #[error("node request rejected: {0}")]
    Validation(String),
    /// No marketplace image matches the configured label.
    #[error("no '{label}' image for {arch} nodes in {zone}")]
    ImageNotFound {
        /// Marketplace label, for example `Ubuntu 22.04 Jammy Jellyfish`.
        label: String,
        /// CPU architecture of the GPU offer.
        arch: String,
        /// Zone searched.
        zone: String,
    },
    /// The GPU offer is sold out or not sold in the zone.
    #[error("GPU offer '{instance_type}' has no capacity in {zone}")]
    InstanceTypeUnavailable {
        /// Commercial type, for example `GPU-3070-S`.
        instance_type: String,
        /// Zone asked for.
        zone: String,
    },
    /// The node did not reach the awaited state in time.
    #[error("node {instance_id} gave up during {action}")]
    Timeout {
        /// Wait stage that expired.
        action: String,
        /// Server id of the node.
        instance_id: String,
    },
    /// The node booted without a routable address, so SSH cannot reach it.
    #[error("node {instance_id} has no public IPv4 address for SSH")]
    MissingPublicIp {
        /// Server id of the node.
        instance_id: String,
    },
    /// A destroyed node is still listed and may still be billed.
    #[error("node {instance_id} is still listed after termination")]
    ResidualResource {
        /// Server id of the node.
        instance_id: String,
    },
    /// The node is in a transitional state that forbids starting it.
    #[error("node {instance_id} cannot start while {state}")]
    PowerOnNotAllowed {
        /// Server id of the node.
        instance_id: String,
        /// State reported by the API.
        state: String,
    },
    /// The Scaleway API refused or failed a call.
    #[error("scaleway API: {message}")]
    Provider {
        /// SDK or HTTP error text.
        message: String,
    },
    /// A server listing did not match the expected JSON shape.
    #[error("unreadable server listing: {message}")]
    Decode {
        /// `serde_json` error text.
        message: String,
    },
}

impl From<ScalewayError> for ScalewayBackendError {
    fn from(err: ScalewayError) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }
}

impl From<BackendError> for ScalewayBackendError {
    fn from(err: BackendError) -> Self {
        let BackendError::Validation(field) = err;
        Self::Validation(field)
    }
}

impl From<ConfigError> for ScalewayBackendError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
