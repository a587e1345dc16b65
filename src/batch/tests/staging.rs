//! Staging resolution against an in-memory store.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::task;
use crate::batch::*;
use crate::store::Namespace;
use crate::test_support::{MemoryStore, ScriptedPrompter, UploadRecord};

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn file(&self, name: &str, content: &str) -> String {
        let path = self.root.join(name);
        std::fs::write(&path, content).expect("write local file");
        path.into_string()
    }

    fn missing(&self, name: &str) -> String {
        self.root.join(name).into_string()
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    Workspace { _dir: dir, root }
}

#[fixture]
fn options() -> StagingOptions {
    StagingOptions {
        yes: false,
        quiet: false,
        hashcat_home: String::from("/opt/hashcat"),
    }
}

#[rstest]
fn single_task_uploads_local_target_and_reuses_stored_wordlist(
    workspace: Workspace,
    options: StagingOptions,
) {
    let corp = workspace.file("corp.txt", "hash1\nhash2\n");
    let store = MemoryStore::new();
    store.insert(Namespace::Wordlists, "rockyou.txt", "123456\n");
    let prompter = ScriptedPrompter::new();
    let batch = Batch::single(task(&corp, &["rockyou.txt"]));

    let staged = resolve_staging(&batch, &store, &prompter, &options).expect("staging");

    assert_eq!(staged.plan.targets, vec![String::from("corp.txt")]);
    assert_eq!(staged.plan.sources, vec![String::from("rockyou.txt")]);
    assert!(staged.plan.rules.is_empty());
    assert_eq!(
        store.uploads(),
        vec![UploadRecord {
            namespace: Namespace::Hashlists,
            local: Utf8PathBuf::from(corp.as_str()),
            name: String::from("corp.txt"),
        }]
    );
    let staged_task = staged.tasks.first().expect("one task");
    assert_eq!(staged_task.target, "/tmp/corp.txt");
    assert_eq!(staged_task.sources, vec![String::from("/tmp/rockyou.txt")]);
    assert!(prompter.questions().is_empty());
}

#[rstest]
fn stored_target_is_used_without_upload(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let batch = Batch::single(task("corp.txt", &["?d?d?d?d"]));

    let staged =
        resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options).expect("staging");

    assert!(store.uploads().is_empty());
    assert_eq!(
        staged.tasks.first().map(|t| t.sources.clone()),
        Some(vec![String::from("?d?d?d?d")])
    );
    assert!(staged.plan.sources.is_empty(), "masks are never staged");
}

#[rstest]
fn missing_target_is_fatal_even_in_a_batch(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let batch = Batch::from_tasks(vec![task("corp.txt", &[]), task("ghost.txt", &[])])
        .expect("batch");

    let err = resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options)
        .expect_err("missing target should fail");

    assert_eq!(
        err,
        BatchError::ArtifactNotFound {
            path: String::from("ghost.txt")
        }
    );
}

#[rstest]
fn missing_source_is_fatal_for_a_single_task(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let batch = Batch::single(task("corp.txt", &["nowhere.txt"]));

    let err = resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options)
        .expect_err("missing source should fail");

    assert_eq!(
        err,
        BatchError::ArtifactNotFound {
            path: String::from("nowhere.txt")
        }
    );
}

#[rstest]
fn missing_source_is_tolerated_in_a_batch(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let batch = Batch::from_tasks(vec![
        task("corp.txt", &["nowhere.txt"]),
        task("corp.txt", &["?l?l?l?l"]),
    ])
    .expect("batch");

    let staged =
        resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options).expect("staging");

    assert_eq!(staged.plan.sources, vec![String::from("nowhere.txt")]);
    assert_eq!(
        staged.tasks.first().map(|t| t.sources.clone()),
        Some(vec![String::from("/tmp/nowhere.txt")])
    );
}

#[rstest]
fn missing_rules_file_is_fatal(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let mut spec = task("corp.txt", &["?d?d"]);
    spec.rules = Some(Rules::Artifact(String::from("custom.rule")));

    let err = resolve_staging(
        &Batch::single(spec),
        &store,
        &ScriptedPrompter::new(),
        &options,
    )
    .expect_err("missing rules should fail");

    assert_eq!(
        err,
        BatchError::ArtifactNotFound {
            path: String::from("custom.rule")
        }
    );
}

#[rstest]
fn builtin_rules_point_into_the_hashcat_install(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let mut spec = task("corp.txt", &["?d?d"]);
    spec.rules = Some(Rules::Builtin(String::from("best64.rule")));

    let staged = resolve_staging(
        &Batch::single(spec),
        &store,
        &ScriptedPrompter::new(),
        &StagingOptions {
            hashcat_home: String::from("/opt/hashcat/"),
            ..options
        },
    )
    .expect("staging");

    assert_eq!(
        staged.tasks.first().and_then(|t| t.rules.clone()),
        Some(String::from("/opt/hashcat/rules/best64.rule"))
    );
    assert!(staged.plan.rules.is_empty());
}

#[rstest]
fn stored_rules_are_planned_once(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    store.insert(Namespace::Rules, "custom.rule", ":\n");
    let mut first = task("corp.txt", &["?d"]);
    first.rules = Some(Rules::Artifact(String::from("custom.rule")));
    let second = first.clone();

    let staged = resolve_staging(
        &Batch::from_tasks(vec![first, second]).expect("batch"),
        &store,
        &ScriptedPrompter::new(),
        &options,
    )
    .expect("staging");

    assert_eq!(staged.plan.rules, vec![String::from("custom.rule")]);
    for staged_task in &staged.tasks {
        assert_eq!(staged_task.rules.as_deref(), Some("/tmp/custom.rule"));
    }
}

#[rstest]
fn empty_sources_use_every_stored_wordlist(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    store.insert(Namespace::Wordlists, "rockyou.txt", "a\n");
    store.insert(Namespace::Wordlists, "corp.dic", "b\n");

    let staged = resolve_staging(
        &Batch::single(task("corp.txt", &[])),
        &store,
        &ScriptedPrompter::new(),
        &options,
    )
    .expect("staging");

    assert_eq!(
        staged.tasks.first().map(|t| t.sources.clone()),
        Some(vec![
            String::from("/tmp/corp.dic"),
            String::from("/tmp/rockyou.txt"),
        ])
    );
    assert_eq!(
        staged.plan.sources,
        vec![String::from("corp.dic"), String::from("rockyou.txt")]
    );
}

#[rstest]
fn shared_inputs_are_uploaded_once(workspace: Workspace, options: StagingOptions) {
    let corp = workspace.file("corp.txt", "hash\n");
    let words = workspace.file("words.txt", "secret\n");
    let store = MemoryStore::new();
    let batch = Batch::from_tasks(vec![
        task(&corp, &[words.as_str()]),
        task(&corp, &[words.as_str(), "?d?d"]),
    ])
    .expect("batch");

    let staged =
        resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options).expect("staging");

    let uploaded: Vec<(Namespace, String)> = store
        .uploads()
        .into_iter()
        .map(|record| (record.namespace, record.name))
        .collect();
    assert_eq!(
        uploaded,
        vec![
            (Namespace::Hashlists, String::from("corp.txt")),
            (Namespace::Wordlists, String::from("words.txt")),
        ]
    );
    assert_eq!(staged.plan.targets, vec![String::from("corp.txt")]);
    assert_eq!(staged.plan.sources, vec![String::from("words.txt")]);
    assert_eq!(
        staged.tasks.get(1).map(|t| t.sources.clone()),
        Some(vec![String::from("/tmp/words.txt"), String::from("?d?d")])
    );
}

#[rstest]
#[case::declined(ScriptedPrompter::with_answers([false]), false, false, 1, false)]
#[case::accepted(ScriptedPrompter::with_answers([true]), false, false, 1, true)]
#[case::quiet_default_no(ScriptedPrompter::new(), false, true, 0, false)]
#[case::quiet_yes(ScriptedPrompter::new(), true, true, 0, true)]
fn overwrite_prompt_respects_answers(
    workspace: Workspace,
    options: StagingOptions,
    #[case] prompter: ScriptedPrompter,
    #[case] yes: bool,
    #[case] quiet: bool,
    #[case] questions: usize,
    #[case] uploaded: bool,
) {
    let corp = workspace.file("corp.txt", "new\n");
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "old\n");

    resolve_staging(
        &Batch::single(task(&corp, &["?d"])),
        &store,
        &prompter,
        &StagingOptions {
            yes,
            quiet,
            ..options
        },
    )
    .expect("staging");

    let asked = prompter.questions();
    assert_eq!(asked.len(), questions);
    if let Some(question) = asked.first() {
        assert_eq!(
            question,
            &format!("File 'hashlists/corp.txt' already exists in the store, replace with '{corp}'?")
        );
    }
    let expected = if uploaded { "new\n" } else { "old\n" };
    assert_eq!(
        store.content(Namespace::Hashlists, "corp.txt").as_deref(),
        Some(expected)
    );
}

#[rstest]
fn extra_args_referencing_local_files_are_rewritten(
    workspace: Workspace,
    options: StagingOptions,
) {
    let pot = workspace.file("session.pot", "");
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let mut spec = task("corp.txt", &["?d"]);
    spec.extra_args = format!("-O --potfile-path={pot} -w 3");

    let staged = resolve_staging(
        &Batch::single(spec),
        &store,
        &ScriptedPrompter::new(),
        &options,
    )
    .expect("staging");

    assert_eq!(
        staged.tasks.first().map(|t| t.extra_args.as_str()),
        Some("-O --potfile-path=/tmp/session.pot -w 3")
    );
    assert_eq!(
        staged.plan.extra_files,
        vec![ExtraFile {
            local: Utf8PathBuf::from(pot.as_str()),
            remote: String::from("/tmp/session.pot"),
        }]
    );
}

#[rstest]
fn missing_local_file_in_extra_args_is_left_alone(workspace: Workspace, options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let mut spec = task("corp.txt", &["?d"]);
    spec.extra_args = format!("--potfile-path={}", workspace.missing("gone.pot"));
    let original = spec.extra_args.clone();

    let staged = resolve_staging(
        &Batch::single(spec),
        &store,
        &ScriptedPrompter::new(),
        &options,
    )
    .expect("staging");

    assert_eq!(
        staged.tasks.first().map(|t| t.extra_args.clone()),
        Some(original)
    );
    assert!(staged.plan.extra_files.is_empty());
}

#[rstest]
fn extra_arg_below_a_regular_file_is_left_alone(workspace: Workspace, options: StagingOptions) {
    let corp = workspace.file("corp.txt", "hash\n");
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "corp.txt", "hash\n");
    let mut spec = task("corp.txt", &["?d"]);
    spec.extra_args = format!("--outfile={corp}/out.pot");
    let original = spec.extra_args.clone();

    let staged = resolve_staging(
        &Batch::single(spec),
        &store,
        &ScriptedPrompter::new(),
        &options,
    )
    .expect("staging");

    assert_eq!(
        staged.tasks.first().map(|t| t.extra_args.clone()),
        Some(original)
    );
    assert!(staged.plan.extra_files.is_empty());
}

#[rstest]
fn staging_keeps_task_order_and_leaves_the_batch_untouched(options: StagingOptions) {
    let store = MemoryStore::new();
    store.insert(Namespace::Hashlists, "a.txt", "x\n");
    store.insert(Namespace::Hashlists, "b.txt", "y\n");
    let batch = Batch::from_tasks(vec![task("b.txt", &["?d"]), task("a.txt", &["?d"])])
        .expect("batch");
    let before = batch.clone();

    let first = resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options)
        .expect("staging");
    let second = resolve_staging(&batch, &store, &ScriptedPrompter::new(), &options)
        .expect("staging");

    assert_eq!(batch, before);
    assert_eq!(first, second);
    let targets: Vec<&str> = first.tasks.iter().map(|t| t.target.as_str()).collect();
    assert_eq!(targets, vec!["/tmp/b.txt", "/tmp/a.txt"]);
    assert_eq!(
        first.plan.targets,
        vec![String::from("b.txt"), String::from("a.txt")]
    );
}
