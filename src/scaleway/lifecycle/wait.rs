//! Readiness and teardown polling for the Scaleway backend.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::backend::{InstanceHandle, InstanceNetworking};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::InstanceSnapshot;

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

impl ScalewayBackend {
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        handle: &InstanceHandle,
    ) -> Result<Option<InstanceSnapshot>, ScalewayBackendError> {
        let mut servers = self
            .api
            .list_instances(&handle.zone)
            .servers(&handle.id)
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(InstanceSnapshot::from_server))
    }

    /// Polls until the server is running with a public address.
    pub(in crate::scaleway) async fn wait_for_public_ip(
        &self,
        handle: &InstanceHandle,
    ) -> Result<InstanceNetworking, ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        let mut saw_running = false;

        while Instant::now() <= deadline {
            let snapshot = self.fetch_instance(handle).await?;
            if let Some(server) = snapshot.filter(|server| server.state.as_str() == "running") {
                saw_running = true;
                if let Some(networking) = self.networking_for(&server) {
                    return Ok(networking);
                }
            }
            debug!(instance_id = %handle.id, "instance not ready yet");
            sleep(self.poll_interval).await;
        }

        if saw_running {
            return Err(ScalewayBackendError::MissingPublicIp {
                instance_id: handle.id.clone(),
            });
        }

        Err(ScalewayBackendError::Timeout {
            action: String::from("wait_for_ready"),
            instance_id: handle.id.clone(),
        })
    }

    pub(in crate::scaleway) fn networking_for(
        &self,
        server: &InstanceSnapshot,
    ) -> Option<InstanceNetworking> {
        server
            .public_ip
            .as_deref()
            .and_then(|ip| IpAddr::from_str(ip).ok())
            .map(|public_ip| InstanceNetworking {
                public_ip,
                ssh_port: self.ssh_port,
            })
    }

    /// Polls until the SSH port accepts TCP connections.
    pub(in crate::scaleway) async fn wait_for_ssh_ready(
        &self,
        handle: &InstanceHandle,
        networking: &InstanceNetworking,
    ) -> Result<(), ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        let addr = (networking.public_ip, networking.ssh_port);
        while Instant::now() <= deadline {
            let connect = timeout(SSH_CONNECT_TIMEOUT, TcpStream::connect(addr)).await;
            if matches!(connect, Ok(Ok(_))) {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayBackendError::Timeout {
            action: String::from("wait_for_ssh_ready"),
            instance_id: handle.id.clone(),
        })
    }

    /// Polls until the server disappears from the API.
    pub(in crate::scaleway) async fn wait_until_gone(
        &self,
        handle: &InstanceHandle,
    ) -> Result<(), ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            if self.fetch_instance(handle).await?.is_none() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayBackendError::ResidualResource {
            instance_id: handle.id.clone(),
        })
    }
}
