//! Backend abstraction for provisioning disposable cracking nodes.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

/// Parameters required to create a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Human readable label used for the boot image. The backend resolves this
    /// to a provider specific image identifier.
    pub image_label: String,
    /// Commercial type or flavour to request (for example `GPU-3070-S`).
    pub instance_type: String,
    /// Target availability zone (for example `fr-par-2`).
    pub zone: String,
    /// Project identifier used for billing and ownership.
    pub project_id: String,
    /// Optional organisation identifier when the provider requires one.
    pub organisation_id: Option<String>,
    /// CPU architecture requested for the instance.
    pub architecture: String,
    /// Session name the instance is tagged with, so later commands can find
    /// it again.
    pub session_name: String,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any string field is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        let required = [
            (&self.image_label, "image_label"),
            (&self.instance_type, "instance_type"),
            (&self.zone, "zone"),
            (&self.project_id, "project_id"),
            (&self.architecture, "architecture"),
            (&self.session_name, "session_name"),
        ];
        for (value, field) in required {
            if value.is_empty() {
                return Err(BackendError::Validation(field.to_owned()));
            }
        }
        Ok(())
    }

    /// Returns a copy of the request tagged with another session name.
    #[must_use]
    pub fn with_session_name(&self, session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into().trim().to_owned(),
            ..self.clone()
        }
    }
}

/// Builder for [`InstanceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    image_label: String,
    instance_type: String,
    zone: String,
    project_id: String,
    organisation_id: Option<String>,
    architecture: String,
    session_name: String,
}

impl InstanceRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image label.
    #[must_use]
    pub fn image_label(mut self, value: impl Into<String>) -> Self {
        self.image_label = value.into();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Sets the project identifier.
    #[must_use]
    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.project_id = value.into();
        self
    }

    /// Sets the optional organisation identifier.
    #[must_use]
    pub fn organisation_id(mut self, value: Option<String>) -> Self {
        self.organisation_id = value;
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub fn architecture(mut self, value: impl Into<String>) -> Self {
        self.architecture = value.into();
        self
    }

    /// Sets the session name.
    #[must_use]
    pub fn session_name(mut self, value: impl Into<String>) -> Self {
        self.session_name = value.into();
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceRequest, BackendError> {
        let request = InstanceRequest {
            image_label: self.image_label.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            zone: self.zone.trim().to_owned(),
            project_id: self.project_id.trim().to_owned(),
            organisation_id: self.organisation_id.map(|value| value.trim().to_owned()),
            architecture: self.architecture.trim().to_owned(),
            session_name: self.session_name.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Handle returned by a backend once an instance has been created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider specific identifier for the instance.
    pub id: String,
    /// Zone in which the instance was created.
    pub zone: String,
}

/// Connection details for reaching an instance once it is ready.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceNetworking {
    /// Public IP address assigned by the provider.
    pub public_ip: IpAddr,
    /// TCP port for SSH (22 on Scaleway).
    pub ssh_port: u16,
}

/// One instance managed by this tool, as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSummary {
    /// Identifiers needed for teardown.
    pub handle: InstanceHandle,
    /// Session name from the instance tags.
    pub session: Option<String>,
    /// Commercial type of the instance.
    pub instance_type: String,
    /// Provider state (for example `running`).
    pub state: String,
    /// Networking details, when the instance has a public address.
    pub networking: Option<InstanceNetworking>,
}

impl InstanceSummary {
    /// Returns `true` when the instance is running and reachable.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == "running" && self.networking.is_some()
    }

    /// Returns `true` when `identifier` names this instance by id or session.
    #[must_use]
    pub fn matches(&self, identifier: &str) -> bool {
        self.handle.id == identifier || self.session.as_deref() == Some(identifier)
    }
}

/// Picks the first running instance whose id or session equals `identifier`.
#[must_use]
pub fn select_running<'a>(
    instances: &'a [InstanceSummary],
    identifier: &str,
) -> Option<&'a InstanceSummary> {
    instances
        .iter()
        .find(|instance| instance.is_running() && instance.matches(identifier))
}

/// Errors raised by backends.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud backends.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new instance and returns a handle used for subsequent calls.
    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error>;

    /// Blocks until the instance is ready for SSH and returns networking info.
    fn wait_for_ready<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceNetworking, Self::Error>;

    /// Destroys the instance and ensures no provider resources remain.
    fn destroy(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error>;

    /// Lists every instance created by this tool.
    fn list_sessions(&self) -> BackendFuture<'_, Vec<InstanceSummary>, Self::Error>;

    /// Finds a running instance by id or session name.
    fn find_running<'a>(
        &'a self,
        identifier: &'a str,
    ) -> BackendFuture<'a, Option<InstanceSummary>, Self::Error>
    where
        Self: Sync,
    {
        Box::pin(async move {
            let instances = self.list_sessions().await?;
            Ok(select_running(&instances, identifier).cloned())
        })
    }
}
