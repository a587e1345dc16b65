//! Drives instances through a job: acquire, bootstrap, launch, and stop.
//!
//! The orchestrator provisions (or reuses) a node via a [`Backend`], prepares
//! it over SSH, and starts the job inside a `screen` session. Its work ends at
//! hand-off: once the script runs, errors inside it are handled by the
//! script's own guards.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{
    Backend, InstanceHandle, InstanceNetworking, InstanceRequest, InstanceSummary,
};
use crate::batch::{Batch, ScriptOptions, StagingOptions, generate_script, resolve_staging};
use crate::cli::SessionArgs;
use crate::config::CrackConfig;
use crate::prompt::Prompter;
use crate::session::{
    CommandRunner, REMOTE_WORKDIR, RemoteSession, SCRIPT_MODE, SessionConfig, SessionError,
    basename,
};
use crate::store::{ArtifactStore, StoreConfig};

mod bootstrap;
mod error;

pub use error::OrchestratorError;

/// Time a graceful stop leaves the script to upload results.
const GRACEFUL_STOP_DELAY: Duration = Duration::from_secs(30);

/// Session name used for scripts read from stdin or typed interactively.
const INLINE_SCRIPT_SESSION: &str = "runscript";

/// How a job's session is started.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionOptions {
    /// Session name overriding the derived one.
    pub session_name: Option<String>,
    /// Running instance (id or session name) to reuse.
    pub use_instance: Option<String>,
    /// Attach the caller's terminal to the session.
    pub attach: bool,
    /// Open a shell on the node after the job.
    pub shell: bool,
    /// Power the node off after the job.
    pub shutdown: bool,
}

impl From<&SessionArgs> for SessionOptions {
    fn from(args: &SessionArgs) -> Self {
        Self {
            session_name: args.session_name.clone(),
            use_instance: args.use_instance.clone(),
            attach: args.attach,
            shell: args.shell,
            shutdown: args.shutdown,
        }
    }
}

/// Options for [`Orchestrator::crack`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CrackOptions {
    /// Session options.
    pub session: SessionOptions,
    /// Default answer to overwrite questions.
    pub yes: bool,
    /// Take default answers without asking.
    pub quiet: bool,
}

/// Script handed to [`Orchestrator::run_script`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptInput {
    /// Local script file, copied as-is.
    File(Utf8PathBuf),
    /// Script lines read from stdin or typed at a prompt.
    Lines(Vec<String>),
}

impl ScriptInput {
    fn extension(&self) -> String {
        match self {
            Self::File(path) => path
                .extension()
                .map(|ext| format!(".{ext}"))
                .unwrap_or_default(),
            Self::Lines(_) => String::from(".sh"),
        }
    }

    fn default_session_name(&self) -> String {
        match self {
            Self::File(path) => basename(path.as_str()).to_owned(),
            Self::Lines(_) => String::from(INLINE_SCRIPT_SESSION),
        }
    }
}

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Instance request template; the session name is replaced per job.
    pub request: InstanceRequest,
    /// SSH settings.
    pub session: SessionConfig,
    /// Store settings forwarded to the node.
    pub store: StoreConfig,
    /// Hashcat and `screen` settings.
    pub crack: CrackConfig,
}

/// Instance selected for a job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AcquiredInstance {
    /// Provider handle.
    pub handle: InstanceHandle,
    /// SSH endpoint.
    pub networking: InstanceNetworking,
    /// `true` when an existing instance was reused.
    pub reused: bool,
}

/// Result of a job hand-off.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Launch {
    /// Instance running the job.
    pub handle: InstanceHandle,
    /// Session name the instance is tagged with.
    pub session_name: String,
    /// Remote path of the launched script.
    pub script_path: String,
    /// `true` when an existing instance was reused.
    pub reused: bool,
    /// Whether the script powers the node off at the end.
    pub shutdown: bool,
}

/// Resolves when the operator presses Ctrl-C.
///
/// Never resolves when the signal handler cannot be installed.
pub async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C; interrupts will not tear down instances");
        std::future::pending::<()>().await;
    }
}

/// Executes jobs on provider instances.
#[derive(Debug)]
pub struct Orchestrator<B, R: CommandRunner> {
    backend: B,
    runner: R,
    config: OrchestratorConfig,
    graceful_stop_delay: Duration,
}

impl<B, R> Orchestrator<B, R>
where
    B: Backend + Sync,
    B::Error: Display + Send + Sync + std::error::Error + 'static,
    R: CommandRunner + Clone,
{
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(backend: B, runner: R, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            runner,
            config,
            graceful_stop_delay: GRACEFUL_STOP_DELAY,
        }
    }

    /// Overrides the delay between killing hashcat and terminating.
    ///
    /// This is primarily used by tests to keep stop scenarios fast.
    #[must_use]
    pub const fn with_graceful_stop_delay(mut self, delay: Duration) -> Self {
        self.graceful_stop_delay = delay;
        self
    }

    /// Stages `batch`, prepares a node, and starts the generated script.
    ///
    /// Staging runs before anything remote happens, so a missing artifact
    /// never leaves an instance behind.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when staging, provisioning, bootstrap, or
    /// the launch fails.
    pub async fn crack<S, P>(
        &self,
        batch: &Batch,
        store: &S,
        prompter: &P,
        options: &CrackOptions,
    ) -> Result<Launch, OrchestratorError<B::Error>>
    where
        S: ArtifactStore + ?Sized,
        P: Prompter + ?Sized,
    {
        let staged = resolve_staging(
            batch,
            store,
            prompter,
            &StagingOptions {
                yes: options.yes,
                quiet: options.quiet,
                hashcat_home: self.config.crack.hashcat_home.clone(),
            },
        )?;
        let session_name = options
            .session
            .session_name
            .clone()
            .unwrap_or_else(|| batch.session_name());

        let acquired = self
            .acquire_instance(
                &session_name,
                options.session.use_instance.as_deref(),
                interrupted(),
            )
            .await?;
        let shutdown = options.session.shutdown && !acquired.reused;
        let remote = self.remote_session(&acquired.networking)?;

        if let Err(err) = bootstrap::bootstrap(&remote, &staged.plan, &self.config.store) {
            return Err(self.abandon(&acquired, err).await);
        }

        let script = generate_script(
            &staged.tasks,
            &ScriptOptions {
                bucket: self.config.store.bucket.clone(),
                hashcat_bin: self.config.crack.hashcat_path(),
                endpoint_url: self.config.store.endpoint_url.clone(),
                shell: options.session.shell,
                shutdown,
            },
        );
        let script_path = self
            .launch(
                &remote,
                &acquired,
                script.lines(),
                &session_name,
                options.session.attach,
            )
            .await?;

        Ok(Launch {
            handle: acquired.handle,
            session_name,
            script_path,
            reused: acquired.reused,
            shutdown,
        })
    }

    /// Copies a script to a node and runs it in the job session.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidArguments`] for an empty inline
    /// script, or any provisioning or session failure.
    pub async fn run_script(
        &self,
        input: &ScriptInput,
        options: &SessionOptions,
    ) -> Result<Launch, OrchestratorError<B::Error>> {
        if matches!(input, ScriptInput::Lines(lines) if lines.is_empty()) {
            return Err(OrchestratorError::InvalidArguments {
                message: String::from("script is empty"),
            });
        }
        let session_name = options
            .session_name
            .clone()
            .unwrap_or_else(|| input.default_session_name());

        let acquired = self
            .acquire_instance(&session_name, options.use_instance.as_deref(), interrupted())
            .await?;
        let shutdown = options.shutdown && !acquired.reused;
        let remote = self.remote_session(&acquired.networking)?;

        let uploaded = format!(
            "{REMOTE_WORKDIR}/{}{}",
            Uuid::new_v4().simple(),
            input.extension()
        );
        let copied = match input {
            ScriptInput::File(path) => remote.copy_file(path, &uploaded, Some(SCRIPT_MODE)),
            ScriptInput::Lines(lines) => remote.create_file(&uploaded, lines, Some(SCRIPT_MODE)),
        };
        if let Err(err) = copied {
            return Err(self.abandon(&acquired, err).await);
        }

        let mut wrapper = vec![escape(uploaded.as_str().into()).into_owned()];
        if options.shell {
            wrapper.push(String::from("bash"));
        }
        if shutdown {
            wrapper.push(String::from("sudo poweroff"));
        }
        let script_path = self
            .launch(&remote, &acquired, &wrapper, &session_name, options.attach)
            .await?;

        Ok(Launch {
            handle: acquired.handle,
            session_name,
            script_path,
            reused: acquired.reused,
            shutdown,
        })
    }

    /// Reuses a running instance, or provisions one tagged `session_name`.
    ///
    /// A new instance that fails to become ready, or whose wait is cut short
    /// by `interrupt`, is destroyed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InstanceNotFound`] when `use_instance`
    /// matches nothing, [`OrchestratorError::RemoteProvisioning`] when the
    /// readiness wait fails, or [`OrchestratorError::Cancelled`] on interrupt.
    pub async fn acquire_instance<F>(
        &self,
        session_name: &str,
        use_instance: Option<&str>,
        interrupt: F,
    ) -> Result<AcquiredInstance, OrchestratorError<B::Error>>
    where
        F: Future<Output = ()>,
    {
        if let Some(identifier) = use_instance {
            let summary = self.find_running(identifier).await?;
            let networking = summary.networking.ok_or_else(|| {
                OrchestratorError::InstanceNotFound {
                    identifier: identifier.to_owned(),
                }
            })?;
            info!(instance = %summary.handle.id, "Reusing running instance");
            return Ok(AcquiredInstance {
                handle: summary.handle,
                networking,
                reused: true,
            });
        }

        let request = self.config.request.with_session_name(session_name);
        info!(
            session = session_name,
            instance_type = %request.instance_type,
            zone = %request.zone,
            "Launching instance..."
        );
        let handle = self
            .backend
            .create(&request)
            .await
            .map_err(OrchestratorError::Provision)?;

        info!(instance = %handle.id, "Waiting for instance to become ready...");
        let outcome = tokio::select! {
            result = self.backend.wait_for_ready(&handle) => Some(result),
            () = interrupt => None,
        };
        match outcome {
            Some(Ok(networking)) => Ok(AcquiredInstance {
                handle,
                networking,
                reused: false,
            }),
            Some(Err(err)) => {
                let message = self.destroy_with_note(&handle, &err).await;
                Err(OrchestratorError::RemoteProvisioning {
                    message,
                    source: err,
                })
            }
            None => {
                let message = self
                    .destroy_with_note(&handle, &"interrupted while waiting for the instance")
                    .await;
                Err(OrchestratorError::Cancelled { message })
            }
        }
    }

    /// Attaches the caller's terminal to a job session.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InstanceNotFound`] when nothing matches,
    /// or a session error when `screen -r` fails.
    pub async fn attach(
        &self,
        identifier: &str,
        screen_name: &str,
    ) -> Result<(), OrchestratorError<B::Error>> {
        let remote = self.remote_for(identifier).await?;
        remote.attach_session(screen_name)?;
        Ok(())
    }

    /// Opens an interactive shell on a running instance.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InstanceNotFound`] when nothing matches.
    pub async fn shell(&self, identifier: &str) -> Result<(), OrchestratorError<B::Error>> {
        let remote = self.remote_for(identifier).await?;
        remote.open_shell()?;
        Ok(())
    }

    /// Terminates instances by id or session name.
    ///
    /// Unless `force` is set, hashcat is killed on running instances first so
    /// the script uploads its results, and the orchestrator waits before
    /// terminating.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InstanceNotFound`] for an unknown
    /// identifier, or [`OrchestratorError::Teardown`] when termination fails.
    pub async fn stop(
        &self,
        identifiers: &[String],
        force: bool,
    ) -> Result<Vec<InstanceHandle>, OrchestratorError<B::Error>> {
        let instances = self.list_sessions().await?;
        let mut stopped = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let summary = instances
                .iter()
                .filter(|instance| instance.matches(identifier))
                .max_by_key(|instance| instance.is_running())
                .ok_or_else(|| OrchestratorError::InstanceNotFound {
                    identifier: identifier.clone(),
                })?;

            if !force
                && summary.is_running()
                && let Some(networking) = summary.networking.as_ref()
            {
                self.graceful_shutdown(&summary.handle, networking).await?;
            }
            info!(instance = %summary.handle.id, "Terminating instance...");
            self.backend
                .destroy(summary.handle.clone())
                .await
                .map_err(OrchestratorError::Teardown)?;
            stopped.push(summary.handle.clone());
        }
        Ok(stopped)
    }

    /// Lists every instance created by this tool.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Backend`] when the provider query fails.
    pub async fn list_sessions(&self) -> Result<Vec<InstanceSummary>, OrchestratorError<B::Error>> {
        self.backend
            .list_sessions()
            .await
            .map_err(OrchestratorError::Backend)
    }

    async fn graceful_shutdown(
        &self,
        handle: &InstanceHandle,
        networking: &InstanceNetworking,
    ) -> Result<(), OrchestratorError<B::Error>> {
        info!(instance = %handle.id, "Gracefully shutting down instance...");
        let remote = self.remote_session(networking)?;
        let binary = escape(self.config.crack.hashcat_binary.as_str().into());
        match remote.run_command(&format!("killall {binary}")) {
            Ok(output) if !output.is_success() => {
                debug!(instance = %handle.id, "no hashcat process to stop");
            }
            Ok(_) => {}
            Err(err) => warn!(instance = %handle.id, error = %err, "graceful shutdown failed"),
        }
        sleep(self.graceful_stop_delay).await;
        Ok(())
    }

    async fn find_running(
        &self,
        identifier: &str,
    ) -> Result<InstanceSummary, OrchestratorError<B::Error>> {
        self.backend
            .find_running(identifier)
            .await
            .map_err(OrchestratorError::Backend)?
            .ok_or_else(|| OrchestratorError::InstanceNotFound {
                identifier: identifier.to_owned(),
            })
    }

    async fn remote_for(
        &self,
        identifier: &str,
    ) -> Result<RemoteSession<R>, OrchestratorError<B::Error>> {
        let summary = self.find_running(identifier).await?;
        let networking = summary
            .networking
            .ok_or_else(|| OrchestratorError::InstanceNotFound {
                identifier: identifier.to_owned(),
            })?;
        Ok(self.remote_session(&networking)?)
    }

    fn remote_session(
        &self,
        networking: &InstanceNetworking,
    ) -> Result<RemoteSession<R>, SessionError> {
        RemoteSession::new(
            self.config.session.clone(),
            self.runner.clone(),
            networking.clone(),
        )
    }

    /// Writes the job script to the node and starts it in the job session.
    ///
    /// A fresh instance is abandoned when the script cannot be written.
    /// Failures to start the session leave the instance running.
    async fn launch(
        &self,
        remote: &RemoteSession<R>,
        acquired: &AcquiredInstance,
        lines: &[String],
        session_name: &str,
        attach: bool,
    ) -> Result<String, OrchestratorError<B::Error>> {
        let script_path = match remote.create_script(lines) {
            Ok(path) => path,
            Err(err) => return Err(self.abandon(acquired, err).await),
        };
        let screen_name = &self.config.crack.screen_name;
        if attach {
            info!(session = session_name, screen = %screen_name, "Starting session");
        } else {
            info!(session = session_name, screen = %screen_name, "Starting detached session");
        }
        remote.run_in_session(screen_name, &script_path, attach)?;
        Ok(script_path)
    }

    /// Destroys a freshly created instance after a bootstrap or upload
    /// failure.
    async fn abandon(
        &self,
        acquired: &AcquiredInstance,
        err: SessionError,
    ) -> OrchestratorError<B::Error> {
        let message = if acquired.reused {
            err.to_string()
        } else {
            self.destroy_with_note(&acquired.handle, &err).await
        };
        OrchestratorError::Bootstrap {
            message,
            source: err,
        }
    }

    async fn destroy_with_note<E: Display>(&self, handle: &InstanceHandle, err: &E) -> String {
        let teardown_error = self.backend.destroy(handle.clone()).await.err();
        append_teardown_note(err.to_string(), teardown_error.as_ref())
    }
}

fn append_teardown_note<E: Display>(message: String, teardown_error: Option<&E>) -> String {
    if let Some(teardown) = teardown_error {
        format!("{message} (teardown also failed: {teardown})")
    } else {
        message
    }
}

#[cfg(test)]
mod tests;
