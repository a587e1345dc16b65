//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Arc, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::{
    Backend, BackendFuture, InstanceHandle, InstanceNetworking, InstanceRequest, InstanceSummary,
};
use crate::local_fs;
use crate::prompt::{PromptError, Prompter};
use crate::session::{CommandOutput, CommandRunner, SessionError, basename};
use crate::store::{ArtifactEntry, ArtifactStore, Namespace, StoreError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns every invocation rendered with [`CommandInvocation::command_string`].
    #[must_use]
    pub fn command_strings(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(CommandInvocation::command_string)
            .collect()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| SessionError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Upload recorded by [`MemoryStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadRecord {
    /// Destination namespace.
    pub namespace: Namespace,
    /// Local path that was uploaded.
    pub local: Utf8PathBuf,
    /// Name in the store.
    pub name: String,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    objects: BTreeMap<(Namespace, String), String>,
    uploads: Vec<UploadRecord>,
    deletes: Vec<(Namespace, String)>,
}

/// In-memory [`ArtifactStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<MemoryStoreState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object with the given content.
    pub fn insert(&self, namespace: Namespace, name: &str, content: &str) {
        self.state
            .borrow_mut()
            .objects
            .insert((namespace, name.to_owned()), content.to_owned());
    }

    /// Returns the content of an object, if present.
    #[must_use]
    pub fn content(&self, namespace: Namespace, name: &str) -> Option<String> {
        self.state
            .borrow()
            .objects
            .get(&(namespace, name.to_owned()))
            .cloned()
    }

    /// Uploads performed so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.borrow().uploads.clone()
    }

    /// Deletions performed so far.
    #[must_use]
    pub fn deletes(&self) -> Vec<(Namespace, String)> {
        self.state.borrow().deletes.clone()
    }

    fn not_found(namespace: Namespace, name: &str) -> StoreError {
        StoreError::NotFound {
            namespace,
            name: name.to_owned(),
            bucket: String::from("memory"),
        }
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, namespace: Namespace, name: &str) -> Result<bool, StoreError> {
        Ok(self.content(namespace, name).is_some())
    }

    fn list(&self, namespace: Namespace) -> Result<Vec<ArtifactEntry>, StoreError> {
        Ok(self
            .state
            .borrow()
            .objects
            .iter()
            .filter(|((ns, _), _)| *ns == namespace)
            .map(|((_, name), content)| ArtifactEntry {
                name: name.clone(),
                size: content.len() as u64,
                last_modified: String::from("2026-01-01T00:00:00.000Z"),
            })
            .collect())
    }

    fn upload(
        &self,
        namespace: Namespace,
        local: &Utf8Path,
        remote_name: Option<&str>,
    ) -> Result<(), StoreError> {
        if !local_fs::is_file(local)? {
            return Err(StoreError::LocalNotFound {
                path: local.to_string(),
            });
        }
        let content = local_fs::read_to_string(local)?;
        let name = remote_name.unwrap_or_else(|| basename(local.as_str()));
        let mut state = self.state.borrow_mut();
        state.objects.insert((namespace, name.to_owned()), content);
        state.uploads.push(UploadRecord {
            namespace,
            local: local.to_path_buf(),
            name: name.to_owned(),
        });
        Ok(())
    }

    fn download(
        &self,
        namespace: Namespace,
        remote_name: &str,
        local: Option<&Utf8Path>,
    ) -> Result<(), StoreError> {
        let content = self
            .content(namespace, remote_name)
            .ok_or_else(|| Self::not_found(namespace, remote_name))?;
        let destination = local.unwrap_or_else(|| Utf8Path::new(remote_name));
        local_fs::write(destination, content)?;
        Ok(())
    }

    fn read(&self, namespace: Namespace, name: &str) -> Result<String, StoreError> {
        self.content(namespace, name)
            .ok_or_else(|| Self::not_found(namespace, name))
    }

    fn delete(&self, namespace: Namespace, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.objects.remove(&(namespace, name.to_owned())).is_none() {
            return Err(Self::not_found(namespace, name));
        }
        state.deletes.push((namespace, name.to_owned()));
        Ok(())
    }
}

/// Prompter that replays scripted answers and lines.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPrompter {
    answers: Rc<RefCell<VecDeque<bool>>>,
    lines: Rc<RefCell<VecDeque<String>>>,
    questions: Rc<RefCell<Vec<String>>>,
}

impl ScriptedPrompter {
    /// Creates a prompter with no scripted input; questions get their
    /// default answer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a prompter that answers questions in order.
    #[must_use]
    pub fn with_answers(answers: impl IntoIterator<Item = bool>) -> Self {
        let prompter = Self::default();
        prompter.answers.borrow_mut().extend(answers);
        prompter
    }

    /// Creates a prompter that returns `lines` from [`Prompter::read_line`].
    #[must_use]
    pub fn with_lines<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        let prompter = Self::default();
        prompter
            .lines
            .borrow_mut()
            .extend(lines.into_iter().map(Into::into));
        prompter
    }

    /// Questions that were actually asked.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str, default: bool, skip: bool) -> Result<bool, PromptError> {
        if skip {
            return Ok(default);
        }
        self.questions.borrow_mut().push(question.to_owned());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(default))
    }

    fn read_line(&self, _prompt: &str) -> Result<Option<String>, PromptError> {
        Ok(self.lines.borrow_mut().pop_front())
    }
}

/// Error returned by [`ScriptedBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted backend failure: {0}")]
pub struct ScriptedBackendFailure(pub String);

#[derive(Debug, Default)]
struct ScriptedBackendState {
    created: Vec<InstanceRequest>,
    destroyed: Vec<InstanceHandle>,
    ready: VecDeque<Result<InstanceNetworking, ScriptedBackendFailure>>,
    sessions: Vec<InstanceSummary>,
    hang_on_ready: bool,
}

/// Backend double that records lifecycle calls.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    state: Arc<std::sync::Mutex<ScriptedBackendState>>,
}

impl ScriptedBackend {
    /// Creates a backend with no scripted behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ScriptedBackendState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Queues the outcome of the next `wait_for_ready` call.
    pub fn push_ready(&self, outcome: Result<InstanceNetworking, ScriptedBackendFailure>) {
        self.with_state(|state| state.ready.push_back(outcome));
    }

    /// Makes `wait_for_ready` never complete.
    pub fn hang_on_ready(&self) {
        self.with_state(|state| state.hang_on_ready = true);
    }

    /// Sets the instances reported by `list_sessions`.
    pub fn set_sessions(&self, sessions: Vec<InstanceSummary>) {
        self.with_state(|state| state.sessions = sessions);
    }

    /// Requests passed to `create`.
    #[must_use]
    pub fn created(&self) -> Vec<InstanceRequest> {
        self.with_state(|state| state.created.clone())
    }

    /// Handles passed to `destroy`.
    #[must_use]
    pub fn destroyed(&self) -> Vec<InstanceHandle> {
        self.with_state(|state| state.destroyed.clone())
    }
}

impl Backend for ScriptedBackend {
    type Error = ScriptedBackendFailure;

    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            let index = self.with_state(|state| {
                state.created.push(request.clone());
                state.created.len()
            });
            Ok(InstanceHandle {
                id: format!("srv-{index}"),
                zone: request.zone.clone(),
            })
        })
    }

    fn wait_for_ready<'a>(
        &'a self,
        _handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceNetworking, Self::Error> {
        Box::pin(async move {
            if self.with_state(|state| state.hang_on_ready) {
                std::future::pending::<()>().await;
            }
            self.with_state(|state| state.ready.pop_front()).unwrap_or_else(|| {
                Err(ScriptedBackendFailure(String::from(
                    "no scripted readiness outcome",
                )))
            })
        })
    }

    fn destroy(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| state.destroyed.push(handle));
            Ok(())
        })
    }

    fn list_sessions(&self) -> BackendFuture<'_, Vec<InstanceSummary>, Self::Error> {
        Box::pin(async move { Ok(self.with_state(|state| state.sessions.clone())) })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
