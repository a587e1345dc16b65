//! Task line parsing and batch expansion.

use rstest::rstest;

use super::task;
use crate::batch::*;

#[rstest]
fn parses_a_full_task_line() {
    let spec = parse_task_line(
        "-a 0 -m 1000 -r builtin:best64.rule -A '--force -O' --no-write-dumps corp.txt rockyou.txt ?d?d?d?d",
    )
    .expect("line should parse");

    assert_eq!(spec.target, "corp.txt");
    assert_eq!(spec.attack_mode, "0");
    assert_eq!(spec.hash_type, "1000");
    assert_eq!(spec.rules, Some(Rules::Builtin(String::from("best64.rule"))));
    assert_eq!(spec.extra_args, "--force -O");
    assert_eq!(
        spec.sources,
        vec![
            Source::Wordlist(String::from("rockyou.txt")),
            Source::Mask(String::from("?d?d?d?d")),
        ]
    );
    assert!(spec.update_hashlist);
    assert!(!spec.dump_cracked);
    assert!(spec.make_dict);
}

#[rstest]
fn accepts_a_leading_crack_word() {
    let spec = parse_task_line("crack -a0 -m0 lists/hr.txt").expect("line should parse");

    assert_eq!(spec.target, "lists/hr.txt");
    assert!(spec.sources.is_empty());
    assert!(spec.rules.is_none());
}

#[rstest]
#[case::no_target("-a0 -m0", "missing HASHLIST")]
#[case::no_attack_mode("-m0 corp.txt", "missing --attack-mode")]
#[case::no_hash_type("-a0 corp.txt", "missing --hash-type")]
#[case::unbalanced_quotes("-a0 -m0 \"corp.txt", "unbalanced quotes")]
fn rejects_incomplete_lines(#[case] line: &str, #[case] expected: &str) {
    let err = parse_task_line(line).expect_err("line should be rejected");

    assert_eq!(
        err,
        BatchError::InvalidArguments {
            message: expected.to_owned()
        }
    );
    assert!(err.is_invalid_arguments());
}

#[rstest]
fn reports_unknown_flags_from_the_parser() {
    let err = parse_task_line("-a0 -m0 --bogus corp.txt").expect_err("flag should be rejected");

    let BatchError::InvalidArguments { message } = err else {
        panic!("unexpected error variant");
    };
    assert!(message.contains("--bogus"), "message: {message}");
    assert!(!message.starts_with("error:"));
}

#[rstest]
fn rules_prefix_selects_builtin() {
    assert_eq!(
        Rules::parse("builtin:d3ad0ne.rule"),
        Rules::Builtin(String::from("d3ad0ne.rule"))
    );
    assert_eq!(
        Rules::parse("rules/custom.rule"),
        Rules::Artifact(String::from("rules/custom.rule"))
    );
}

#[rstest]
fn from_lines_skips_blanks_and_comments() {
    let batch = Batch::from_lines([
        "# nightly run",
        "",
        "-a0 -m1000 corp.txt rockyou.txt",
        "   ",
        "-a3 -m1000 corp.txt ?a?a?a?a?a",
    ])
    .expect("batch should parse");

    assert_eq!(batch.len(), 2);
    let modes: Vec<&str> = batch
        .tasks()
        .iter()
        .map(|spec| spec.attack_mode.as_str())
        .collect();
    assert_eq!(modes, vec!["0", "3"]);
}

#[rstest]
fn from_lines_reports_the_failing_line_number() {
    let err = Batch::from_lines(["# header", "-a0 -m0 a.txt", "-a0 b.txt"])
        .expect_err("third line should fail");

    assert_eq!(
        err,
        BatchError::InvalidLine {
            line: 3,
            text: String::from("-a0 b.txt"),
            message: String::from("missing --hash-type"),
        }
    );
    assert!(err.to_string().contains("batch line 3"));
}

#[rstest]
#[case::nothing(Vec::new())]
#[case::only_comments(vec!["# a", "", "#b"])]
fn from_lines_rejects_empty_input(#[case] lines: Vec<&str>) {
    let err = Batch::from_lines(lines).expect_err("empty batch should fail");
    assert_eq!(err, BatchError::EmptyBatch);
}

#[rstest]
fn session_name_joins_distinct_basenames_in_order() {
    let batch = Batch::from_tasks(vec![
        task("lists/corp.txt", &[]),
        task("other/hr.txt", &[]),
        task("corp.txt", &["rockyou.txt"]),
    ])
    .expect("batch should build");

    assert_eq!(batch.session_name(), "corp.txt+hr.txt");
    assert!(!batch.is_empty());
}
