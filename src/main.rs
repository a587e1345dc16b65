//! Binary entry point for the hashfleet CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hashfleet::cli::{
    CatCommand, Cli, Command, CrackCommand, DeleteCommand, GetCommand, GlobalArgs, ListCommand,
    PutCommand, RunScriptCommand, StopCommand,
};
use hashfleet::files::{self, DeleteOptions, FilesError, GetOptions, MergeStrategy, Overwrite};
use hashfleet::input::{self, InputError, InputSource};
use hashfleet::{
    Batch, BatchError, CrackConfig, CrackOptions, Launch, Namespace, Orchestrator,
    OrchestratorConfig, OrchestratorError, ProcessCommandRunner, Prompter, S3CliStore,
    ScalewayBackend, ScalewayBackendError, ScalewayConfig, SessionConfig, SessionOptions,
    StoreConfig, StoreError, Table, TaskSpec, TerminalPrompter,
};

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

/// Session name used for the request template; every job replaces it.
const TEMPLATE_SESSION: &str = "hashfleet";

type ScalewayOrchestrator = Orchestrator<ScalewayBackend, ProcessCommandRunner>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Files(#[from] FilesError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Run(#[from] OrchestratorError<ScalewayBackendError>),
    #[error("failed to write output: {0}")]
    Output(String),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        let invalid = match self {
            Self::Batch(err) => err.is_invalid_arguments(),
            Self::Files(err) => err.is_invalid_arguments(),
            Self::Run(err) => err.is_invalid_arguments(),
            Self::Store(StoreError::UnknownNamespace(_)) => true,
            _ => false,
        };
        if invalid { 2 } else { 1 }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

const fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "hashfleet=info",
        1 => "hashfleet=debug",
        _ => "hashfleet=trace",
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let global = cli.global;
    match cli.command {
        Command::Crack(command) => exec_crack(&command, &global).await,
        Command::RunScript(command) => exec_run_script(&command).await,
        Command::Attach(command) => {
            let orchestrator = load_orchestrator()?;
            orchestrator
                .attach(&command.instance, &command.screen_name)
                .await?;
            Ok(())
        }
        Command::Shell(command) => {
            load_orchestrator()?.shell(&command.instance).await?;
            Ok(())
        }
        Command::Stop(command) => exec_stop(&command).await,
        Command::List(command) => exec_list(&command).await,
        Command::Get(command) => exec_get(command, &global),
        Command::Put(command) => exec_put(command, &global),
        Command::Cat(command) => exec_cat(&command),
        Command::Delete(command) => exec_delete(&command),
    }
}

fn config_error(err: impl ToString) -> CliError {
    CliError::Config(err.to_string())
}

fn load_store() -> Result<S3CliStore<ProcessCommandRunner>, CliError> {
    let config = StoreConfig::load_without_cli_args()?;
    Ok(S3CliStore::with_process_runner(config)?)
}

fn load_orchestrator() -> Result<ScalewayOrchestrator, CliError> {
    let scaleway = ScalewayConfig::load_without_cli_args().map_err(config_error)?;
    let backend =
        ScalewayBackend::new(scaleway).map_err(|err| CliError::Backend(err.to_string()))?;
    let request = backend
        .request_for(TEMPLATE_SESSION)
        .map_err(|err| CliError::Backend(err.to_string()))?;

    let crack = CrackConfig::load_without_cli_args().map_err(config_error)?;
    crack.validate().map_err(config_error)?;
    let store = StoreConfig::load_without_cli_args()?;
    store.validate()?;
    let session = SessionConfig::load_without_cli_args().map_err(config_error)?;

    let config = OrchestratorConfig {
        request,
        session,
        store,
        crack,
    };
    Ok(Orchestrator::new(backend, ProcessCommandRunner, config))
}

/// Builds the batch for `crack`, from the command line or a batch file.
fn build_batch<P: Prompter + ?Sized>(
    command: &CrackCommand,
    prompter: &P,
    stdin: impl io::BufRead,
) -> Result<Batch, CliError> {
    let Some(raw) = command.batchfile.as_deref() else {
        return Ok(Batch::single(TaskSpec::try_from(command.task.clone())?));
    };
    let lines = input::read_lines(&InputSource::parse(raw), prompter, "batch> ", stdin)?;
    Ok(Batch::from_lines(lines)?)
}

/// Crack options derived from the command; a batch read from stdin cannot
/// attach or ask questions.
fn crack_options(command: &CrackCommand, global: &GlobalArgs) -> CrackOptions {
    let mut options = CrackOptions {
        session: SessionOptions::from(&command.session),
        yes: global.yes,
        quiet: global.quiet,
    };
    if command
        .batchfile
        .as_deref()
        .is_some_and(|raw| InputSource::parse(raw).is_stdin())
    {
        options.session.attach = false;
        options.quiet = true;
    }
    options
}

async fn exec_crack(command: &CrackCommand, global: &GlobalArgs) -> Result<(), CliError> {
    let prompter = TerminalPrompter;
    let batch = build_batch(command, &prompter, io::stdin().lock())?;
    let options = crack_options(command, global);
    let store = load_store()?;
    let orchestrator = load_orchestrator()?;

    let launch = orchestrator
        .crack(&batch, &store, &prompter, &options)
        .await?;
    report_launch(io::stdout(), &launch, options.session.attach)
}

async fn exec_run_script(command: &RunScriptCommand) -> Result<(), CliError> {
    let source = InputSource::parse(&command.script);
    let script = input::script_input(&source, &TerminalPrompter, io::stdin().lock())?;
    let mut options = SessionOptions::from(&command.session);
    if source.is_stdin() {
        options.attach = false;
    }
    let orchestrator = load_orchestrator()?;

    let launch = orchestrator.run_script(&script, &options).await?;
    report_launch(io::stdout(), &launch, options.attach)
}

fn report_launch(mut out: impl Write, launch: &Launch, attached: bool) -> Result<(), CliError> {
    if attached {
        return Ok(());
    }
    writeln!(
        out,
        "Started detached session '{}' on instance {}",
        launch.session_name, launch.handle.id
    )
    .map_err(|err| CliError::Output(err.to_string()))
}

async fn exec_stop(command: &StopCommand) -> Result<(), CliError> {
    let orchestrator = load_orchestrator()?;
    let stopped = orchestrator.stop(&command.instances, command.force).await?;
    for handle in stopped {
        info!(instance = %handle.id, "Terminated");
    }
    Ok(())
}

async fn exec_list(command: &ListCommand) -> Result<(), CliError> {
    let table = match command.kind.as_str() {
        "sessions" => {
            let instances = load_orchestrator()?.list_sessions().await?;
            files::session_table(&instances)
        }
        "files" => files::artifact_table(&load_store()?, None)?,
        kind => {
            let namespace: Namespace = kind.parse()?;
            files::artifact_table(&load_store()?, Some(namespace))?
        }
    };
    print_table(io::stdout(), &table)
}

fn print_table(mut out: impl Write, table: &Table) -> Result<(), CliError> {
    if table.is_empty() {
        return Ok(());
    }
    write!(out, "{}", table.render()).map_err(|err| CliError::Output(err.to_string()))
}

fn overwrite(force: bool, global: &GlobalArgs) -> Overwrite {
    Overwrite {
        force,
        yes: global.yes,
        quiet: global.quiet,
    }
}

fn exec_get(command: GetCommand, global: &GlobalArgs) -> Result<(), CliError> {
    let namespace: Namespace = command.kind.parse()?;
    let strategy = command
        .merge_strategy
        .as_deref()
        .map(str::parse::<MergeStrategy>)
        .transpose()?;
    let options = GetOptions {
        overwrite: overwrite(command.force, global),
        merge: command.merge,
        strategy,
        outfile: command.outfile.map(Utf8PathBuf::from),
    };
    let written = files::get(
        &load_store()?,
        &TerminalPrompter,
        namespace,
        &command.files,
        &options,
    )?;
    for path in written {
        info!(%path, "Downloaded");
    }
    Ok(())
}

fn exec_put(command: PutCommand, global: &GlobalArgs) -> Result<(), CliError> {
    let namespace: Namespace = command.kind.parse()?;
    let paths: Vec<Utf8PathBuf> = command.files.into_iter().map(Utf8PathBuf::from).collect();
    let uploaded = files::put(
        &load_store()?,
        &TerminalPrompter,
        namespace,
        &paths,
        overwrite(command.force, global),
    )?;
    for name in uploaded {
        info!(%namespace, name = %name, "Uploaded");
    }
    Ok(())
}

fn exec_cat(command: &CatCommand) -> Result<(), CliError> {
    let namespace: Namespace = command.kind.parse()?;
    files::cat(&load_store()?, namespace, &command.name, io::stdout().lock())?;
    Ok(())
}

fn exec_delete(command: &DeleteCommand) -> Result<(), CliError> {
    let namespace: Namespace = command.kind.parse()?;
    files::delete(
        &load_store()?,
        &TerminalPrompter,
        namespace,
        &command.files,
        DeleteOptions {
            force: command.force,
            interactive: command.interactive,
        },
    )?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        writeln!(target, "  caused by: {cause}").ok();
        source = cause.source();
    }
}
