//! Command-line interface definitions for the `hashfleet` binary.
//!
//! This module centralises the clap parser structures so the main binary,
//! the batch-file parser, and the build script (man page generation) all
//! share one grammar. It must only depend on `clap`.

use clap::{ArgAction, Args, Parser, Subcommand};

/// Artifact namespaces accepted on the command line.
pub const NAMESPACE_NAMES: [&str; 4] = ["hashlists", "dumps", "wordlists", "rules"];

/// Listing targets accepted by `hashfleet list`.
pub const LIST_KINDS: [&str; 6] = [
    "sessions",
    "files",
    "hashlists",
    "dumps",
    "wordlists",
    "rules",
];

/// Merge strategies accepted by `hashfleet get --merge-strategy`.
pub const MERGE_STRATEGY_NAMES: [&str; 3] = ["cat", "uniq", "sort"];

/// Top-level CLI for the `hashfleet` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hashfleet",
    version,
    about = "Password cracking on ephemeral cloud GPU instances",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Clone, Debug, Args)]
pub struct GlobalArgs {
    /// Increase log verbosity (repeat for more detail).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Accept default answers to all questions.
    #[arg(short, long, global = true)]
    pub quiet: bool,
    /// Assume "yes" to all questions asked.
    #[arg(short, long, global = true)]
    pub yes: bool,
}

/// Known subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch an instance and crack the specified hashlist(s).
    Crack(CrackCommand),
    /// Launch an instance and run the specified script.
    #[command(name = "runscript")]
    RunScript(RunScriptCommand),
    /// Attach to a running session.
    Attach(AttachCommand),
    /// Open an interactive shell on a running instance.
    Shell(InstanceArg),
    /// Terminate instance(s).
    Stop(StopCommand),
    /// List sessions or stored artifacts.
    List(ListCommand),
    /// Download artifacts from the store.
    Get(GetCommand),
    /// Upload artifacts to the store.
    Put(PutCommand),
    /// Print a stored artifact to stdout.
    Cat(CatCommand),
    /// Delete artifacts from the store.
    Delete(DeleteCommand),
}

/// Options controlling how a remote session is started.
#[derive(Clone, Debug, Args)]
pub struct SessionArgs {
    /// Override the session name used to tag the instance.
    #[arg(short = 's', long, conflicts_with = "use_instance")]
    pub session_name: Option<String>,
    /// Use an existing running instance for the task.
    #[arg(short = 'i', long, value_name = "INSTANCE_ID|SESSION_NAME")]
    pub use_instance: Option<String>,
    /// Do not attach to the started session.
    #[arg(long = "no-attach", action = ArgAction::SetFalse)]
    pub attach: bool,
    /// Drop into a shell once the task has completed (this blocks shutdown).
    #[arg(long)]
    pub shell: bool,
    /// Do not shut the instance down once the task has completed.
    #[arg(long = "no-shutdown", action = ArgAction::SetFalse)]
    pub shutdown: bool,
}

/// Arguments describing a single cracking task.
///
/// Batch files contain one of these per line, so the struct is a standalone
/// parser as well as a flattened group of `hashfleet crack`.
#[derive(Clone, Debug, Parser)]
pub struct TaskArgs {
    /// Hashcat attack mode.
    #[arg(short = 'a', long)]
    pub attack_mode: Option<String>,
    /// Hashcat hash type.
    #[arg(short = 'm', long)]
    pub hash_type: Option<String>,
    /// Rules file (local path or stored name), or `builtin:<name>`.
    #[arg(short = 'r', long)]
    pub rules: Option<String>,
    /// Additional hashcat arguments.
    #[arg(short = 'A', long, default_value = "", allow_hyphen_values = true)]
    pub hashcat_args: String,
    /// Do not remove cracked hashes from the stored hashlist.
    #[arg(long = "no-write-hashlists", action = ArgAction::SetFalse)]
    pub update_hashlist: bool,
    /// Do not dump cracked hashes (hash:salt:pass:hex).
    #[arg(long = "no-write-dumps", action = ArgAction::SetFalse)]
    pub dump_cracked: bool,
    /// Do not build a wordlist from the cracked passwords.
    #[arg(long = "no-write-wordlists", action = ArgAction::SetFalse)]
    pub make_dict: bool,
    /// Hashlist to crack (local file or stored name).
    #[arg(value_name = "HASHLIST")]
    pub target: Option<String>,
    /// Wordlists or masks to use (default: every stored wordlist).
    #[arg(value_name = "MASK|WORDLIST")]
    pub sources: Vec<String>,
}

/// Arguments for `hashfleet crack`.
#[derive(Clone, Debug, Args)]
pub struct CrackCommand {
    /// Task given directly on the command line.
    #[command(flatten)]
    pub task: TaskArgs,
    /// Execute a batch of crack tasks, one per line (`-` reads stdin, `+` prompts).
    #[arg(short = 'b', long, value_name = "BATCHFILE", conflicts_with = "target")]
    pub batchfile: Option<String>,
    /// Session options.
    #[command(flatten)]
    pub session: SessionArgs,
}

/// Arguments for `hashfleet runscript`.
#[derive(Clone, Debug, Args)]
pub struct RunScriptCommand {
    /// Session options.
    #[command(flatten)]
    pub session: SessionArgs,
    /// Script to run (`-` reads stdin, `+` prompts for lines).
    #[arg(value_name = "SCRIPT")]
    pub script: String,
}

/// Arguments for `hashfleet attach`.
#[derive(Clone, Debug, Args)]
pub struct AttachCommand {
    /// Instance identifier or session name.
    #[arg(value_name = "INSTANCE_ID|SESSION_NAME")]
    pub instance: String,
    /// Name of the screen session to attach to.
    #[arg(short = 'n', long, default_value = "hashfleet")]
    pub screen_name: String,
}

/// A single instance selector.
#[derive(Clone, Debug, Args)]
pub struct InstanceArg {
    /// Instance identifier or session name.
    #[arg(value_name = "INSTANCE_ID|SESSION_NAME")]
    pub instance: String,
}

/// Arguments for `hashfleet stop`.
#[derive(Clone, Debug, Args)]
pub struct StopCommand {
    /// Terminate immediately without a graceful shutdown.
    #[arg(short, long)]
    pub force: bool,
    /// Instance identifiers or session names.
    #[arg(required = true, value_name = "INSTANCE_ID|SESSION_NAME")]
    pub instances: Vec<String>,
}

/// Arguments for `hashfleet list`.
#[derive(Clone, Debug, Args)]
pub struct ListCommand {
    /// What to list.
    #[arg(value_parser = LIST_KINDS)]
    pub kind: String,
}

/// Arguments for `hashfleet get`.
#[derive(Clone, Debug, Args)]
pub struct GetCommand {
    /// Overwrite local files without asking.
    #[arg(short, long)]
    pub force: bool,
    /// Merge the downloaded artifacts into one file.
    #[arg(short, long)]
    pub merge: bool,
    /// Strategy used when merging.
    #[arg(short = 's', long, value_parser = MERGE_STRATEGY_NAMES)]
    pub merge_strategy: Option<String>,
    /// Output file name.
    #[arg(short, long)]
    pub outfile: Option<String>,
    /// Artifact namespace.
    #[arg(value_parser = NAMESPACE_NAMES)]
    pub kind: String,
    /// Artifact names (default: all).
    #[arg(value_name = "NAME")]
    pub files: Vec<String>,
}

/// Arguments for `hashfleet put`.
#[derive(Clone, Debug, Args)]
pub struct PutCommand {
    /// Overwrite stored artifacts without asking.
    #[arg(short, long)]
    pub force: bool,
    /// Artifact namespace.
    #[arg(value_parser = NAMESPACE_NAMES)]
    pub kind: String,
    /// Local files to upload.
    #[arg(required = true, value_name = "FILENAME")]
    pub files: Vec<String>,
}

/// Arguments for `hashfleet cat`.
#[derive(Clone, Debug, Args)]
pub struct CatCommand {
    /// Artifact namespace.
    #[arg(value_parser = NAMESPACE_NAMES)]
    pub kind: String,
    /// Artifact name.
    pub name: String,
}

/// Arguments for `hashfleet delete`.
#[derive(Clone, Debug, Args)]
pub struct DeleteCommand {
    /// Delete without asking, even when no names are given.
    #[arg(short, long, conflicts_with = "interactive")]
    pub force: bool,
    /// Ask before deleting each artifact.
    #[arg(short, long)]
    pub interactive: bool,
    /// Artifact namespace.
    #[arg(value_parser = NAMESPACE_NAMES)]
    pub kind: String,
    /// Artifact names (default: all).
    #[arg(value_name = "NAME")]
    pub files: Vec<String>,
}
