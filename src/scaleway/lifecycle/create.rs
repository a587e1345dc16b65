//! Instance creation for the Scaleway backend.
//!
//! The request goes through the raw HTTP API so the server can be tagged with
//! its session name at creation time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::InstanceRequest;
use crate::scaleway::types::Zone;

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::InstanceSnapshot;

#[derive(Serialize)]
struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

impl ScalewayBackend {
    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if snapshot.state.as_str() == "running" {
            return Ok(());
        }

        if snapshot
            .allowed_actions
            .iter()
            .any(|action| action.as_str() == "poweron")
        {
            self.api
                .perform_instance_action_async(zone.as_str(), snapshot.id.as_str(), "poweron")
                .await?;
            return Ok(());
        }

        Err(ScalewayBackendError::PowerOnNotAllowed {
            instance_id: snapshot.id.as_str().to_owned(),
            state: snapshot.state.as_str().to_owned(),
        })
    }

    /// Creates a server tagged with the request's session name.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError`] when the API request fails or the
    /// provider rejects the requested instance type.
    pub(in crate::scaleway) async fn create_instance(
        &self,
        request: &InstanceRequest,
        image_id: &str,
    ) -> Result<InstanceSnapshot, ScalewayBackendError> {
        let url = format!(
            "{}/zones/{}/servers",
            super::SCALEWAY_INSTANCE_API_BASE,
            request.zone
        );
        let payload = CreateServerRequest {
            name: format!("hashfleet-{}", Uuid::new_v4().simple()),
            commercial_type: request.instance_type.clone(),
            image: image_id.to_owned(),
            project: request.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: Self::instance_tags(&request.session_name),
            organization: request.organisation_id.clone(),
        };

        let response = super::HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ScalewayBackendError::Provider {
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ScalewayBackendError::Provider {
                message: err.to_string(),
            })?;

        if status.is_success() {
            let parsed: CreateServerResponse =
                serde_json::from_slice(&body).map_err(|err| ScalewayBackendError::Decode {
                    message: err.to_string(),
                })?;
            return Ok(InstanceSnapshot::from_server(parsed.server));
        }

        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && Self::is_instance_type_error(&api_err, request)
        {
            return Err(ScalewayBackendError::InstanceTypeUnavailable {
                instance_type: request.instance_type.clone(),
                zone: request.zone.clone(),
            });
        }

        Err(ScalewayBackendError::Provider {
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
