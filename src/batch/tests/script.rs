//! Generated script layout.

use rstest::{fixture, rstest};

use crate::batch::*;

fn staged(target: &str, sources: &[&str]) -> StagedTask {
    StagedTask {
        target: target.to_owned(),
        sources: sources.iter().map(|source| (*source).to_owned()).collect(),
        rules: None,
        attack_mode: String::from("0"),
        hash_type: String::from("1000"),
        extra_args: String::new(),
        update_hashlist: false,
        dump_cracked: false,
        make_dict: false,
    }
}

fn with_all_steps(mut task: StagedTask) -> StagedTask {
    task.update_hashlist = true;
    task.dump_cracked = true;
    task.make_dict = true;
    task
}

#[fixture]
fn options() -> ScriptOptions {
    ScriptOptions {
        bucket: String::from("cracking"),
        hashcat_bin: String::from("/opt/hashcat/hashcat"),
        endpoint_url: None,
        shell: false,
        shutdown: false,
    }
}

fn position(lines: &[String], needle: &str) -> usize {
    lines
        .iter()
        .position(|line| line == needle)
        .unwrap_or_else(|| panic!("missing line `{needle}` in {lines:#?}"))
}

#[rstest]
fn minimal_task_runs_attack_then_cleanup(options: ScriptOptions) {
    let script = generate_script(&[staged("/tmp/corp.txt", &["/tmp/rockyou.txt"])], &options);

    assert_eq!(
        script.lines(),
        [
            "# batch 1",
            "test -f /tmp/corp.txt.orig || cp /tmp/corp.txt /tmp/corp.txt.orig",
            "/opt/hashcat/hashcat -a0 -m1000 --remove /tmp/corp.txt /tmp/rockyou.txt",
            "echo Removing corp.txt from the store if fully cracked...",
            "test -f /tmp/corp.txt && test -s /tmp/corp.txt || aws s3 rm 's3://cracking/hashlists/corp.txt' >/dev/null",
        ]
    );
}

#[rstest]
fn post_attack_steps_merge_and_upload_results(options: ScriptOptions) {
    let script = generate_script(
        &[with_all_steps(staged("/tmp/corp.txt", &["?d?d?d?d"]))],
        &options,
    );
    let lines = script.lines();

    let attack = position(
        lines,
        "/opt/hashcat/hashcat -a0 -m1000 --remove /tmp/corp.txt '?d?d?d?d'",
    );
    let hashlist = position(
        lines,
        "aws s3 cp /tmp/corp.txt 's3://cracking/hashlists/corp.txt' >/dev/null",
    );
    let dump_pull = position(
        lines,
        "aws s3 cp 's3://cracking/dumps/corp.dmp' /tmp/corp.dmp1 >/dev/null 2>&1 || true",
    );
    let dump_show = position(
        lines,
        "/opt/hashcat/hashcat --quiet --show --outfile-format=7 --outfile=/tmp/corp.dmp2 /tmp/corp.txt.orig",
    );
    let dump_merge = position(lines, "sort -u /tmp/corp.dmp? > /tmp/corp.dmp");
    let dump_push = position(
        lines,
        "aws s3 cp /tmp/corp.dmp 's3://cracking/dumps/corp.dmp' >/dev/null",
    );
    let dict_show = position(
        lines,
        "/opt/hashcat/hashcat --quiet --show --outfile-format=2 --outfile=/tmp/corp.dic2 /tmp/corp.txt.orig",
    );
    let dict_merge = position(
        lines,
        "sort /tmp/corp.dic? | uniq -c | sort -rn | awk '{print $2}' > /tmp/corp.dic",
    );
    let dict_push = position(
        lines,
        "aws s3 cp /tmp/corp.dic 's3://cracking/wordlists/corp.dic' >/dev/null",
    );

    assert!(attack < hashlist);
    assert!(hashlist < dump_pull && dump_pull < dump_show);
    assert!(dump_show < dump_merge && dump_merge < dump_push);
    assert!(dump_push < dict_show && dict_show < dict_merge && dict_merge < dict_push);
}

#[rstest]
fn rules_and_extra_args_appear_in_the_attack(options: ScriptOptions) {
    let mut task = staged("/tmp/corp.txt", &["/tmp/rockyou.txt"]);
    task.rules = Some(String::from("/opt/hashcat/rules/best64.rule"));
    task.extra_args = String::from("-O --potfile-path=/tmp/session.pot");

    let script = generate_script(&[task], &options);

    position(
        script.lines(),
        "/opt/hashcat/hashcat -a0 -m1000 --remove -r /opt/hashcat/rules/best64.rule \
         -O --potfile-path=/tmp/session.pot /tmp/corp.txt /tmp/rockyou.txt",
    );
}

#[rstest]
fn cleanup_runs_once_per_target_after_every_task(options: ScriptOptions) {
    let tasks = [
        staged("/tmp/corp.txt", &["/tmp/rockyou.txt"]),
        staged("/tmp/hr.txt", &["?d?d"]),
        staged("/tmp/corp.txt", &["?l?l?l"]),
    ];

    let script = generate_script(&tasks, &options);
    let lines = script.lines();

    let last_batch = position(lines, "# batch 3");
    let corp_cleanup = position(
        lines,
        "echo Removing corp.txt from the store if fully cracked...",
    );
    let hr_cleanup = position(lines, "echo Removing hr.txt from the store if fully cracked...");
    assert!(last_batch < corp_cleanup && corp_cleanup < hr_cleanup);
    assert_eq!(
        lines
            .iter()
            .filter(|line| line.starts_with("echo Removing"))
            .count(),
        2
    );
}

#[rstest]
#[case::neither(false, false, &[])]
#[case::shell_only(true, false, &["bash"])]
#[case::shutdown_only(false, true, &["sudo poweroff"])]
#[case::both(true, true, &["bash", "sudo poweroff"])]
fn script_ends_with_shell_then_poweroff(
    options: ScriptOptions,
    #[case] shell: bool,
    #[case] shutdown: bool,
    #[case] tail: &[&str],
) {
    let script = generate_script(
        &[staged("/tmp/corp.txt", &["?d"])],
        &ScriptOptions {
            shell,
            shutdown,
            ..options
        },
    );
    let lines = script.into_lines();

    let suffix = lines.get(lines.len() - tail.len()..).expect("tail in range");
    assert_eq!(suffix, tail);
    assert!(
        lines
            .get(lines.len() - tail.len() - 1)
            .is_some_and(|line| line.starts_with("test -f /tmp/corp.txt &&"))
    );
}

#[rstest]
fn endpoint_url_is_passed_to_every_aws_call(options: ScriptOptions) {
    let script = generate_script(
        &[with_all_steps(staged("/tmp/corp.txt", &["?d"]))],
        &ScriptOptions {
            endpoint_url: Some(String::from("https://s3.fr-par.scw.cloud")),
            ..options
        },
    );

    let aws_lines: Vec<&String> = script
        .lines()
        .iter()
        .filter(|line| line.contains(" s3 "))
        .collect();
    assert_eq!(aws_lines.len(), 6);
    for line in aws_lines {
        assert!(
            line.contains("aws --endpoint-url 'https://s3.fr-par.scw.cloud' s3 "),
            "line: {line}"
        );
    }
}

#[rstest]
fn values_with_shell_metacharacters_are_quoted(options: ScriptOptions) {
    let mut task = staged("/tmp/corp list.txt", &["/tmp/rock;you.txt"]);
    task.attack_mode = String::from("0 && reboot");

    let script = generate_script(&[task], &options);

    position(
        script.lines(),
        "/opt/hashcat/hashcat -a'0 && reboot' -m1000 --remove '/tmp/corp list.txt' '/tmp/rock;you.txt'",
    );
}

#[rstest]
fn targets_without_extension_keep_their_name(options: ScriptOptions) {
    let mut task = staged("/tmp/hashes", &["?d"]);
    task.dump_cracked = true;

    let script = generate_script(&[task], &options);

    position(script.lines(), "sort -u /tmp/hashes.dmp? > /tmp/hashes.dmp");
}

#[rstest]
fn generation_is_deterministic(options: ScriptOptions) {
    let tasks = [
        with_all_steps(staged("/tmp/corp.txt", &["/tmp/rockyou.txt"])),
        staged("/tmp/hr.txt", &["?d?d"]),
    ];

    let first = generate_script(&tasks, &options);
    let second = generate_script(&tasks, &options);

    assert_eq!(first, second);
    assert_eq!(first.render(), second.render());
    assert!(first.render().ends_with('\n'));
    assert_eq!(first.render().lines().count(), first.lines().len());
}
