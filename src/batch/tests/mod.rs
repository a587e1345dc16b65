//! Tests for batch parsing, staging, and script generation.

mod script;
mod spec;
mod staging;

use super::*;

/// Builds a task with every post-attack step disabled.
pub(super) fn task(target: &str, sources: &[&str]) -> TaskSpec {
    TaskSpec {
        target: target.to_owned(),
        sources: sources.iter().map(|raw| Source::parse(raw)).collect(),
        rules: None,
        attack_mode: String::from("0"),
        hash_type: String::from("1000"),
        extra_args: String::new(),
        update_hashlist: false,
        dump_cracked: false,
        make_dict: false,
    }
}
