//! Scaleway backend implementation of the instance lifecycle.

mod error;
mod lifecycle;
mod types;

use std::time::Duration;

use crate::backend::{
    Backend, BackendFuture, InstanceHandle, InstanceNetworking, InstanceRequest, InstanceSummary,
};
use crate::config::ScalewayConfig;
use scaleway_rs::ScalewayApi;
use tracing::info;
use types::Zone;

const DEFAULT_SSH_PORT: u16 = 22;
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Tag carried by every instance this tool creates.
pub const INSTANCE_TAG: &str = "hashfleet";

/// Prefix of the tag recording the session name.
pub const SESSION_TAG_PREFIX: &str = "hashfleet-session=";

pub use error::ScalewayBackendError;

/// Backend that provisions instances through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayBackend {
    api: ScalewayApi,
    config: ScalewayConfig,
    ssh_port: u16,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl ScalewayBackend {
    fn is_instance_type_error(
        api_err: &scaleway_rs::ScalewayApiError,
        request: &InstanceRequest,
    ) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == request.instance_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }

    /// Tags applied to an instance created for `session_name`.
    #[must_use]
    pub fn instance_tags(session_name: &str) -> Vec<String> {
        vec![
            String::from(INSTANCE_TAG),
            format!("{SESSION_TAG_PREFIX}{session_name}"),
        ]
    }

    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayBackendError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
            ssh_port: DEFAULT_SSH_PORT,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        })
    }

    /// Builds an instance request for `session_name` using the backend's
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when configuration validation
    /// fails.
    pub fn request_for(&self, session_name: &str) -> Result<InstanceRequest, ScalewayBackendError> {
        self.config
            .as_request(session_name)
            .map_err(ScalewayBackendError::from)
    }
}

impl Backend for ScalewayBackend {
    type Error = ScalewayBackendError;

    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let image_id = self.resolve_image_id(request).await?;
            let snapshot = self.create_instance(request, &image_id).await?;
            info!(
                instance_id = snapshot.id.as_str(),
                session = %request.session_name,
                instance_type = %request.instance_type,
                "instance created"
            );

            let zone = Zone::from(request.zone.as_str());
            self.power_on_if_needed(&zone, &snapshot).await?;

            Ok(InstanceHandle {
                id: snapshot.id.as_str().to_owned(),
                zone: request.zone.clone(),
            })
        })
    }

    fn wait_for_ready<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceNetworking, Self::Error> {
        Box::pin(async move {
            let networking = self.wait_for_public_ip(handle).await?;
            self.wait_for_ssh_ready(handle, &networking).await?;
            Ok(networking)
        })
    }

    fn destroy(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.api
                .perform_instance_action_async(&handle.zone, &handle.id, "terminate")
                .await?;
            self.wait_until_gone(&handle).await
        })
    }

    fn list_sessions(&self) -> BackendFuture<'_, Vec<InstanceSummary>, Self::Error> {
        Box::pin(async move { self.list_tagged_instances().await })
    }
}
