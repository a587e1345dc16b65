//! Unit tests for Scaleway lifecycle helpers.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rstest::{fixture, rstest};
use scaleway_rs::{ScalewayApi, ScalewayImage};

use super::InstanceSnapshot;
use super::list::{ServerList, summarise};
use crate::backend::{InstanceNetworking, InstanceRequest};
use crate::config::ScalewayConfig;
use crate::scaleway::DEFAULT_SSH_PORT;
use crate::scaleway::types::{Action, Zone};
use crate::scaleway::{ScalewayBackend, ScalewayBackendError};

fn snapshot(state: &str, allowed: &[&str], public_ip: Option<&str>) -> InstanceSnapshot {
    InstanceSnapshot {
        id: "srv-1".into(),
        state: state.into(),
        allowed_actions: allowed.iter().copied().map(Action::from).collect(),
        public_ip: public_ip.map(str::to_owned),
    }
}

fn image(id: &str, arch: &str, state: &str, creation_date: &str) -> ScalewayImage {
    ScalewayImage {
        id: id.to_owned(),
        name: String::new(),
        arch: arch.to_owned(),
        creation_date: creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

#[fixture]
fn request() -> InstanceRequest {
    InstanceRequest {
        image_label: String::from("Ubuntu 22.04 Jammy Jellyfish"),
        instance_type: String::from("GPU-3070-S"),
        zone: String::from("fr-par-2"),
        project_id: String::from("proj"),
        organisation_id: None,
        architecture: String::from("x86_64"),
        session_name: String::from("hashes"),
    }
}

#[fixture]
fn backend() -> ScalewayBackend {
    ScalewayBackend {
        api: ScalewayApi::new("dummy"),
        config: ScalewayConfig {
            access_key: None,
            secret_key: String::from("dummy"),
            default_organization_id: None,
            default_project_id: String::from("proj"),
            default_zone: String::from("fr-par-2"),
            default_instance_type: String::from("GPU-3070-S"),
            default_image: String::from("Ubuntu 22.04 Jammy Jellyfish"),
            default_architecture: String::from("x86_64"),
        },
        ssh_port: DEFAULT_SSH_PORT,
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(5),
    }
}

#[rstest]
#[tokio::test]
async fn power_on_is_skipped_for_running_instances(backend: ScalewayBackend) {
    let snap = snapshot("running", &["poweroff"], Some("192.0.2.4"));

    let result = backend.power_on_if_needed(&Zone::from("fr-par-2"), &snap).await;

    assert!(result.is_ok());
}

#[rstest]
#[tokio::test]
async fn power_on_fails_when_action_not_allowed(backend: ScalewayBackend) {
    let snap = snapshot("stopping", &[], None);

    let result = backend.power_on_if_needed(&Zone::from("fr-par-2"), &snap).await;

    assert!(matches!(
        result,
        Err(ScalewayBackendError::PowerOnNotAllowed { ref state, .. }) if state == "stopping"
    ));
}

#[rstest]
fn newest_usable_image_wins(request: InstanceRequest) {
    let images = vec![
        image("old", "x86_64", "available", "2024-01-01T00:00:00Z"),
        image("new", "x86_64", "available", "2025-01-01T00:00:00Z"),
        image("arm", "arm64", "available", "2026-01-01T00:00:00Z"),
        image("broken", "x86_64", "error", "2026-01-01T00:00:00Z"),
    ];

    let usable = ScalewayBackend::usable_images(images, &request);
    let chosen = ScalewayBackend::newest_image(usable, &request);

    assert_eq!(chosen, Ok(String::from("new")));
}

#[rstest]
fn missing_image_names_label_and_zone(request: InstanceRequest) {
    let err = ScalewayBackend::newest_image(Vec::new(), &request)
        .expect_err("empty candidates should fail");

    assert_eq!(
        err,
        ScalewayBackendError::ImageNotFound {
            label: String::from("Ubuntu 22.04 Jammy Jellyfish"),
            arch: String::from("x86_64"),
            zone: String::from("fr-par-2"),
        }
    );
}

#[rstest]
#[case(Some("192.0.2.9"), true)]
#[case(Some("not-an-ip"), false)]
#[case(None, false)]
fn networking_requires_parseable_address(
    backend: ScalewayBackend,
    #[case] address: Option<&str>,
    #[case] expected: bool,
) {
    let snap = snapshot("running", &[], address);

    assert_eq!(backend.networking_for(&snap).is_some(), expected);
}

#[rstest]
fn instance_tags_record_session_name() {
    assert_eq!(
        ScalewayBackend::instance_tags("hashes+more"),
        vec![
            String::from("hashfleet"),
            String::from("hashfleet-session=hashes+more")
        ]
    );
}

#[rstest]
fn summarise_keeps_tagged_servers_with_sessions() {
    let body = r#"{
        "servers": [
            {
                "id": "srv-1",
                "commercial_type": "GPU-3070-S",
                "state": "running",
                "tags": ["hashfleet", "hashfleet-session=hashes"],
                "public_ip": {"address": "192.0.2.7"}
            },
            {
                "id": "srv-2",
                "commercial_type": "DEV1-S",
                "state": "running",
                "tags": ["other"],
                "public_ip": null
            },
            {
                "id": "srv-3",
                "commercial_type": "GPU-3070-S",
                "state": "stopped",
                "tags": ["hashfleet"],
                "public_ip": null
            }
        ]
    }"#;
    let list: ServerList = serde_json::from_str(body).expect("listing should decode");

    let summaries = summarise(list, "fr-par-2", 22);

    assert_eq!(summaries.len(), 2);
    let first = summaries.first().expect("first summary");
    assert_eq!(first.handle.id, "srv-1");
    assert_eq!(first.session.as_deref(), Some("hashes"));
    assert_eq!(
        first.networking,
        Some(InstanceNetworking {
            public_ip: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)),
            ssh_port: 22,
        })
    );
    let second = summaries.get(1).expect("second summary");
    assert_eq!(second.session, None);
    assert!(!second.is_running());
}
