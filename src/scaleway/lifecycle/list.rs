//! Listing of the instances created by this tool.

use std::net::IpAddr;
use std::str::FromStr;

use serde::Deserialize;

use crate::backend::{InstanceHandle, InstanceNetworking, InstanceSummary};
use crate::scaleway::{INSTANCE_TAG, SESSION_TAG_PREFIX};

use super::super::{ScalewayBackend, ScalewayBackendError};

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub(in crate::scaleway) struct ServerList {
    #[serde(default)]
    servers: Vec<ListedServer>,
}

#[derive(Debug, Deserialize)]
struct ListedServer {
    id: String,
    #[serde(default)]
    commercial_type: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    tags: Vec<String>,
    public_ip: Option<ListedAddress>,
}

#[derive(Debug, Deserialize)]
struct ListedAddress {
    address: String,
}

impl ScalewayBackend {
    pub(in crate::scaleway) async fn list_tagged_instances(
        &self,
    ) -> Result<Vec<InstanceSummary>, ScalewayBackendError> {
        let zone = &self.config.default_zone;
        let url = format!(
            "{}/zones/{zone}/servers?tags={INSTANCE_TAG}&per_page={PAGE_SIZE}",
            super::SCALEWAY_INSTANCE_API_BASE,
        );
        let response = super::HTTP_CLIENT
            .get(&url)
            .header("X-Auth-Token", &self.config.secret_key)
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
        if !status.is_success() {
            return Err(ScalewayBackendError::Provider {
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: ServerList =
            serde_json::from_slice(&body).map_err(|err| ScalewayBackendError::Decode {
                message: err.to_string(),
            })?;
        Ok(summarise(parsed, zone, self.ssh_port))
    }
}

/// Converts a server listing into summaries, keeping tagged servers only.
pub(in crate::scaleway) fn summarise(
    list: ServerList,
    zone: &str,
    ssh_port: u16,
) -> Vec<InstanceSummary> {
    list.servers
        .into_iter()
        .filter(|server| server.tags.iter().any(|tag| tag == INSTANCE_TAG))
        .map(|server| {
            let session = server
                .tags
                .iter()
                .find_map(|tag| tag.strip_prefix(SESSION_TAG_PREFIX))
                .map(str::to_owned);
            let networking = server
                .public_ip
                .and_then(|ip| IpAddr::from_str(&ip.address).ok())
                .map(|public_ip| InstanceNetworking { public_ip, ssh_port });
            InstanceSummary {
                handle: InstanceHandle {
                    id: server.id,
                    zone: zone.to_owned(),
                },
                session,
                instance_type: server.commercial_type,
                state: server.state,
                networking,
            }
        })
        .collect()
}
