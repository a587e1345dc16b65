//! Orchestrator behaviour against scripted providers, stores, and runners.

use std::net::{IpAddr, Ipv4Addr};

use rstest::{fixture, rstest};

use super::*;
use crate::batch::{BatchError, parse_task_line};
use crate::store::Namespace;
use crate::test_support::{
    MemoryStore, ScriptedBackend, ScriptedBackendFailure, ScriptedPrompter, ScriptedRunner,
};

fn networking() -> InstanceNetworking {
    InstanceNetworking {
        public_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)),
        ssh_port: 22,
    }
}

fn summary(id: &str, session: &str, state: &str) -> InstanceSummary {
    InstanceSummary {
        handle: InstanceHandle {
            id: id.to_owned(),
            zone: String::from("fr-par-2"),
        },
        session: Some(session.to_owned()),
        instance_type: String::from("GPU-3070-S"),
        state: state.to_owned(),
        networking: (state == "running").then(networking),
    }
}

#[fixture]
fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        request: InstanceRequest::builder()
            .image_label("Ubuntu 22.04 Jammy Jellyfish")
            .instance_type("GPU-3070-S")
            .zone("fr-par-2")
            .project_id("project")
            .architecture("x86_64")
            .session_name("hashfleet")
            .build()
            .expect("request should validate"),
        session: SessionConfig {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            ssh_user: String::from("root"),
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            ssh_identity_file: None,
        },
        store: StoreConfig {
            aws_bin: String::from("aws"),
            bucket: String::from("cracking"),
            endpoint_url: None,
            region: None,
            access_key: None,
            secret_key: None,
        },
        crack: CrackConfig::with_defaults(),
    }
}

#[fixture]
fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    store.insert(Namespace::Wordlists, "rockyou.txt", "123456\n");
    store
}

fn detached() -> CrackOptions {
    CrackOptions {
        session: SessionOptions {
            attach: false,
            shutdown: true,
            ..SessionOptions::default()
        },
        yes: false,
        quiet: false,
    }
}

fn orchestrator(
    backend: &ScriptedBackend,
    runner: &ScriptedRunner,
    config: OrchestratorConfig,
) -> Orchestrator<ScriptedBackend, ScriptedRunner> {
    Orchestrator::new(backend.clone(), runner.clone(), config)
        .with_graceful_stop_delay(Duration::ZERO)
}

fn single_batch() -> Batch {
    Batch::single(parse_task_line("-a0 -m1000 corp.txt rockyou.txt").expect("task"))
}

#[rstest]
#[tokio::test]
async fn crack_provisions_bootstraps_and_launches(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    for _ in 0..5 {
        runner.push_success();
    }

    let launch = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect("crack should launch");

    assert_eq!(launch.session_name, "corp.txt");
    assert!(!launch.reused);
    assert!(launch.shutdown);
    assert!(launch.script_path.starts_with("/tmp/"));
    assert!(launch.script_path.ends_with(".sh"));
    let created = backend.created();
    assert_eq!(
        created.first().map(|r| r.session_name.as_str()),
        Some("corp.txt")
    );
    assert!(backend.destroyed().is_empty());

    let commands = runner.command_strings();
    assert_eq!(commands.len(), 5);
    assert!(commands.first().is_some_and(|c| c.ends_with(
        "cd /tmp && aws s3 cp --only-show-errors 's3://cracking/hashlists/corp.txt' /tmp/corp.txt"
    )));
    assert!(commands.get(1).is_some_and(|c| c.ends_with(
        "cd /tmp && aws s3 cp --only-show-errors 's3://cracking/wordlists/rockyou.txt' /tmp/rockyou.txt"
    )));
    assert!(commands.get(2).is_some_and(|c| c.starts_with("scp ")
        && c.ends_with(&format!("root@203.0.113.7:{}", launch.script_path))));
    assert!(commands.last().is_some_and(|c| c.ends_with(&format!(
        "cd /tmp && screen -dmS hashfleet {}",
        launch.script_path
    ))));
}

#[rstest]
#[tokio::test]
async fn crack_session_name_override_tags_the_instance(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    for _ in 0..5 {
        runner.push_success();
    }
    let mut options = detached();
    options.session.session_name = Some(String::from("nightly"));

    let launch = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &options)
        .await
        .expect("crack should launch");

    assert_eq!(launch.session_name, "nightly");
    assert_eq!(
        backend.created().first().map(|r| r.session_name.clone()),
        Some(String::from("nightly"))
    );
}

#[rstest]
#[tokio::test]
async fn crack_reuses_instance_and_keeps_it_running(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.set_sessions(vec![
        summary("srv-1", "old", "stopped"),
        summary("srv-9", "old", "running"),
    ]);
    let runner = ScriptedRunner::new();
    for _ in 0..5 {
        runner.push_success();
    }
    let mut options = detached();
    options.session.use_instance = Some(String::from("old"));

    let launch = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &options)
        .await
        .expect("crack should launch");

    assert!(launch.reused);
    assert!(!launch.shutdown, "reused instances are never powered off");
    assert_eq!(launch.handle.id, "srv-9");
    assert!(backend.created().is_empty());
}

#[rstest]
#[tokio::test]
async fn crack_with_unknown_instance_fails(config: OrchestratorConfig, store: MemoryStore) {
    let backend = ScriptedBackend::new();
    let runner = ScriptedRunner::new();
    let mut options = detached();
    options.session.use_instance = Some(String::from("ghost"));

    let err = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &options)
        .await
        .expect_err("unknown instance should fail");

    assert!(matches!(
        err,
        OrchestratorError::InstanceNotFound { ref identifier } if identifier == "ghost"
    ));
    assert!(runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn staging_failure_aborts_before_provisioning(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    let runner = ScriptedRunner::new();

    let err = orchestrator(&backend, &runner, config)
        .crack(
            &single_batch(),
            &MemoryStore::new(),
            &ScriptedPrompter::new(),
            &detached(),
        )
        .await
        .expect_err("missing hashlist should fail");

    assert!(matches!(
        err,
        OrchestratorError::Batch(BatchError::ArtifactNotFound { .. })
    ));
    assert!(!err.is_invalid_arguments());
    assert!(backend.created().is_empty());
}

#[rstest]
#[tokio::test]
async fn readiness_failure_destroys_the_instance(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Err(ScriptedBackendFailure(String::from("ssh timed out"))));
    let runner = ScriptedRunner::new();

    let err = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect_err("readiness should fail");

    let OrchestratorError::RemoteProvisioning { message, .. } = err else {
        panic!("expected RemoteProvisioning");
    };
    assert!(message.contains("ssh timed out"));
    let destroyed: Vec<String> = backend.destroyed().into_iter().map(|h| h.id).collect();
    assert_eq!(destroyed, vec![String::from("srv-1")]);
    assert!(runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn interrupt_during_readiness_destroys_the_instance(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.hang_on_ready();
    let runner = ScriptedRunner::new();

    let err = orchestrator(&backend, &runner, config)
        .acquire_instance("corp.txt", None, std::future::ready(()))
        .await
        .expect_err("interrupt should cancel");

    assert!(matches!(err, OrchestratorError::Cancelled { .. }));
    assert_eq!(backend.destroyed().len(), 1);
}

#[rstest]
#[tokio::test]
async fn bootstrap_failure_destroys_a_fresh_instance(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    runner.push_failure(1);

    let err = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect_err("hashlist pull should fail");

    assert!(matches!(err, OrchestratorError::Bootstrap { .. }));
    assert_eq!(backend.destroyed().len(), 1);
}

#[rstest]
#[tokio::test]
async fn script_upload_failure_destroys_a_fresh_instance(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    runner.push_failure(1);

    let err = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect_err("script upload should fail");

    assert!(matches!(err, OrchestratorError::Bootstrap { .. }));
    assert_eq!(backend.destroyed().len(), 1);
    assert_eq!(runner.command_strings().len(), 3);
}

#[rstest]
#[tokio::test]
async fn session_start_failure_keeps_the_instance(config: OrchestratorConfig, store: MemoryStore) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    for _ in 0..4 {
        runner.push_success();
    }
    runner.push_failure(1);

    let err = orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect_err("screen should fail to start");

    assert!(matches!(err, OrchestratorError::Session(_)));
    assert!(backend.destroyed().is_empty());
}

#[rstest]
#[tokio::test]
async fn wrapper_upload_failure_destroys_a_fresh_instance(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    runner.push_failure(1);
    let input = ScriptInput::Lines(vec![String::from("nvidia-smi")]);

    let err = orchestrator(&backend, &runner, config)
        .run_script(&input, &SessionOptions::default())
        .await
        .expect_err("wrapper upload should fail");

    assert!(matches!(err, OrchestratorError::Bootstrap { .. }));
    assert_eq!(backend.destroyed().len(), 1);
}

#[rstest]
#[tokio::test]
async fn wordlist_pull_failure_is_tolerated(config: OrchestratorConfig, store: MemoryStore) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_failure(1);
    for _ in 0..3 {
        runner.push_success();
    }

    orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect("crack should launch");

    assert!(backend.destroyed().is_empty());
    assert_eq!(runner.invocations().len(), 5);
}

#[rstest]
#[tokio::test]
async fn store_credentials_are_written_before_pulls(
    config: OrchestratorConfig,
    store: MemoryStore,
) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    for _ in 0..9 {
        runner.push_success();
    }
    let config = OrchestratorConfig {
        store: StoreConfig {
            access_key: Some(String::from("SCWACCESS")),
            secret_key: Some(String::from("secret")),
            endpoint_url: Some(String::from("https://s3.fr-par.scw.cloud")),
            region: Some(String::from("fr-par")),
            ..config.store.clone()
        },
        ..config
    };

    orchestrator(&backend, &runner, config)
        .crack(&single_batch(), &store, &ScriptedPrompter::new(), &detached())
        .await
        .expect("crack should launch");

    let commands = runner.command_strings();
    assert!(commands.first().is_some_and(|c| c.ends_with("cd /tmp && mkdir -p ~/.aws")));
    assert!(commands.get(1).is_some_and(|c| c.ends_with("root@203.0.113.7:.aws/credentials")));
    assert!(commands.get(2).is_some_and(|c| c.ends_with("root@203.0.113.7:.aws/config")));
    assert!(commands.get(3).is_some_and(|c| c.ends_with("chmod 600 ~/.aws/credentials")));
    assert!(commands.get(4).is_some_and(|c| c.contains(
        "aws --endpoint-url 'https://s3.fr-par.scw.cloud' s3 cp --only-show-errors"
    )));
}

#[rstest]
#[tokio::test]
async fn run_script_uploads_inline_lines_and_wraps_them(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    for _ in 0..5 {
        runner.push_success();
    }
    let input = ScriptInput::Lines(vec![String::from("nvidia-smi")]);
    let options = SessionOptions {
        attach: false,
        shell: true,
        shutdown: true,
        ..SessionOptions::default()
    };

    let launch = orchestrator(&backend, &runner, config)
        .run_script(&input, &options)
        .await
        .expect("script should launch");

    assert_eq!(launch.session_name, "runscript");
    let commands = runner.command_strings();
    let upload = commands.first().expect("upload should run");
    let remote = upload
        .rsplit(':')
        .next()
        .expect("scp destination")
        .to_owned();
    assert!(remote.starts_with("/tmp/") && remote.ends_with(".sh"));
    assert_eq!(remote.len(), "/tmp/".len() + 32 + ".sh".len());
    assert!(commands.get(1).is_some_and(|c| c.ends_with(&format!("chmod 755 {remote}"))));
    assert!(commands.last().is_some_and(|c| c.contains("screen -dmS hashfleet")));
}

#[rstest]
#[tokio::test]
async fn run_script_rejects_empty_input(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    let runner = ScriptedRunner::new();

    let err = orchestrator(&backend, &runner, config)
        .run_script(&ScriptInput::Lines(Vec::new()), &SessionOptions::default())
        .await
        .expect_err("empty script should fail");

    assert!(err.is_invalid_arguments());
    assert!(backend.created().is_empty());
}

#[rstest]
#[tokio::test]
async fn run_script_names_the_session_after_the_file(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.push_ready(Ok(networking()));
    let runner = ScriptedRunner::new();
    for _ in 0..5 {
        runner.push_success();
    }
    let input = ScriptInput::File(Utf8PathBuf::from("jobs/benchmark.py"));

    let launch = orchestrator(&backend, &runner, config)
        .run_script(&input, &SessionOptions::default())
        .await
        .expect("script should launch");

    assert_eq!(launch.session_name, "benchmark.py");
    assert!(!launch.shutdown);
    let upload = runner.command_strings().remove(0);
    assert!(upload.contains("jobs/benchmark.py root@203.0.113.7:/tmp/"));
    assert!(upload.ends_with(".py"));
}

#[rstest]
#[tokio::test]
async fn stop_kills_hashcat_before_terminating(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.set_sessions(vec![summary("srv-2", "corp.txt", "running")]);
    let runner = ScriptedRunner::new();
    runner.push_failure(1);

    let stopped = orchestrator(&backend, &runner, config)
        .stop(&[String::from("corp.txt")], false)
        .await
        .expect("stop should succeed");

    assert_eq!(stopped, backend.destroyed());
    assert_eq!(stopped.first().map(|h| h.id.as_str()), Some("srv-2"));
    assert!(
        runner
            .command_strings()
            .first()
            .is_some_and(|c| c.ends_with("cd /tmp && killall hashcat"))
    );
}

#[rstest]
#[case::forced("srv-2", true)]
#[case::already_stopped("srv-3", false)]
#[tokio::test]
async fn stop_skips_graceful_shutdown_when_not_needed(
    config: OrchestratorConfig,
    #[case] identifier: &str,
    #[case] force: bool,
) {
    let backend = ScriptedBackend::new();
    backend.set_sessions(vec![
        summary("srv-2", "corp.txt", "running"),
        summary("srv-3", "hr.txt", "stopped"),
    ]);
    let runner = ScriptedRunner::new();

    let stopped = orchestrator(&backend, &runner, config)
        .stop(&[identifier.to_owned()], force)
        .await
        .expect("stop should succeed");

    assert_eq!(stopped.first().map(|h| h.id.as_str()), Some(identifier));
    assert!(runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn stop_reports_unknown_identifiers(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    let runner = ScriptedRunner::new();

    let err = orchestrator(&backend, &runner, config)
        .stop(&[String::from("ghost")], true)
        .await
        .expect_err("unknown instance should fail");

    assert!(matches!(err, OrchestratorError::InstanceNotFound { .. }));
    assert!(backend.destroyed().is_empty());
}

#[rstest]
#[tokio::test]
async fn attach_reconnects_to_the_named_screen(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.set_sessions(vec![summary("srv-2", "corp.txt", "running")]);
    let runner = ScriptedRunner::new();
    runner.push_success();

    orchestrator(&backend, &runner, config)
        .attach("srv-2", "hashfleet")
        .await
        .expect("attach should succeed");

    let command = runner.command_strings().remove(0);
    assert!(command.contains(" -t root@203.0.113.7 screen -r hashfleet"));
}

#[rstest]
#[tokio::test]
async fn shell_requires_a_running_instance(config: OrchestratorConfig) {
    let backend = ScriptedBackend::new();
    backend.set_sessions(vec![summary("srv-3", "hr.txt", "stopped")]);
    let runner = ScriptedRunner::new();

    let err = orchestrator(&backend, &runner, config)
        .shell("hr.txt")
        .await
        .expect_err("stopped instance should be rejected");

    assert!(matches!(err, OrchestratorError::InstanceNotFound { .. }));
}
