//! Provisioned interpreter environments for script-backed plugins.
//!
//! A [`ManagedRuntime`] prepares everything an interpreter-backed plugin
//! needs before it can serve requests. Provisioning runs these steps in
//! order, stopping at the first failure:
//!
//! 1. Read the bundled runtime descriptor (`<name>.runtime.toml`) for the
//!    pinned source tag and the optional minimum interpreter version.
//! 2. When a minimum is declared, query the interpreter's version and compare
//!    it with semantic-version ordering.
//! 3. Reuse the per-plugin working directory if it already holds a checkout,
//!    otherwise clone the pinned tag beside it and move the clone into place
//!    once it has completed.
//! 4. Create a virtual environment under `venv/PluginVenv` that inherits the
//!    host's site packages and install the pinned requirements with the
//!    environment's own `pip`.
//!
//! Each external step is bounded by the provisioning timeout. Progress is
//! published through a shared [`RuntimeState`] that other threads can
//! observe via [`StateHandle`].

mod version;

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{Level, debug, info, warn};

use crate::outcome::ExecutionOutcome;
use crate::process::{CapturedLines, CommandExecutor, ProcessInvocation, TracingSink};
use crate::template::{MappingPaths, expand_all};

pub use version::{find_version, parse_lenient};

/// Tracing target for runtime provisioning.
const RUNTIME_TARGET: &str = "mapforge_plugins::runtime";

/// Location of the isolated environment relative to the working directory.
pub const VENV_DIR: &str = "venv/PluginVenv";

/// Lifecycle of a managed runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuntimeState {
    /// Provisioning has not started.
    #[default]
    Uninitialized,
    /// Provisioning is in progress.
    Provisioning,
    /// The environment is ready to execute scripts.
    Ready,
    /// Provisioning failed; the reason is kept for diagnostics.
    Failed(String),
}

impl RuntimeState {
    /// Returns `true` for [`RuntimeState::Ready`].
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Shared, read-only view of a runtime's state.
#[derive(Debug, Clone, Default)]
pub struct StateHandle(Arc<RwLock<RuntimeState>>);

impl StateHandle {
    /// Returns a copy of the current state.
    #[must_use]
    pub fn current(&self) -> RuntimeState {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, state: RuntimeState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Errors raised while provisioning a managed runtime.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    /// The bundled runtime descriptor is missing or malformed.
    #[error("invalid runtime descriptor '{}': {message}", path.display())]
    Descriptor {
        /// Descriptor path.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The interpreter's version could not be determined.
    #[error("cannot determine version of '{interpreter}': {detail}")]
    VersionQuery {
        /// Interpreter that was queried.
        interpreter: String,
        /// Outcome or parse failure.
        detail: String,
    },

    /// The interpreter is older than the declared minimum.
    #[error("interpreter '{interpreter}' has version {found}, at least {required} is required")]
    InterpreterTooOld {
        /// Interpreter that was queried.
        interpreter: String,
        /// Reported version.
        found: semver::Version,
        /// Declared minimum.
        required: semver::Version,
    },

    /// An external provisioning command did not succeed.
    #[error("{step} failed: {outcome}")]
    Step {
        /// Name of the failed step.
        step: &'static str,
        /// Outcome of the command.
        outcome: ExecutionOutcome,
    },

    /// The requirements file is absent from the checkout.
    #[error("requirements file '{}' not found", path.display())]
    MissingRequirements {
        /// Expected location.
        path: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Contents of the bundled `<name>.runtime.toml` resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuntimeDescriptor {
    tag: String,
    #[serde(default)]
    min_interpreter: Option<String>,
}

impl RuntimeDescriptor {
    /// Reads the descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Descriptor`] when the file is missing,
    /// unparsable, declares an empty tag or an unparsable minimum version.
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let fail = |message: String| ProvisionError::Descriptor {
            path: path.to_path_buf(),
            message,
        };
        let source = fs::read_to_string(path).map_err(|error| fail(error.to_string()))?;
        let descriptor: Self =
            toml::from_str(&source).map_err(|error| fail(error.message().to_owned()))?;
        if descriptor.tag.trim().is_empty() {
            return Err(fail(String::from("tag must not be empty")));
        }
        if let Some(minimum) = descriptor
            .min_interpreter
            .as_deref()
            .filter(|minimum| parse_lenient(minimum).is_none())
        {
            return Err(fail(format!("cannot parse min_interpreter '{minimum}'")));
        }
        Ok(descriptor)
    }

    /// Returns the pinned source tag or branch.
    #[must_use]
    pub const fn tag(&self) -> &str {
        self.tag.as_str()
    }

    /// Returns the minimum interpreter version, if declared.
    #[must_use]
    pub fn min_interpreter(&self) -> Option<semver::Version> {
        self.min_interpreter.as_deref().and_then(parse_lenient)
    }
}

/// Builds the script part of a managed plugin's command line.
///
/// Returned paths must be rooted at `working_dir`; the runtime prepends the
/// environment's interpreter.
pub trait ScriptLayout: Send + Sync {
    /// Returns the script path followed by its arguments.
    fn command_array(&self, working_dir: &Path, paths: &MappingPaths<'_>) -> Vec<OsString>;
}

/// Script layout declared by a manifest: a relative script and argument
/// templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLayout {
    script: PathBuf,
    args: Vec<String>,
}

impl TemplateLayout {
    /// Creates a layout from a script path relative to the working directory.
    #[must_use]
    pub const fn new(script: PathBuf, args: Vec<String>) -> Self {
        Self { script, args }
    }
}

impl ScriptLayout for TemplateLayout {
    fn command_array(&self, working_dir: &Path, paths: &MappingPaths<'_>) -> Vec<OsString> {
        let mut command = vec![working_dir.join(&self.script).into_os_string()];
        command.extend(expand_all(&self.args, paths));
        command
    }
}

/// Static configuration of a managed runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    name: String,
    repository: String,
    descriptor_path: PathBuf,
    requirements: PathBuf,
    interpreter: PathBuf,
    git: PathBuf,
    work_root: PathBuf,
    provisioning_timeout: Duration,
    execution_timeout: Duration,
}

impl RuntimeConfig {
    /// Creates a configuration with `python3`, `git`, the default
    /// requirements file and 600 s / 30 s timeouts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        repository: impl Into<String>,
        descriptor_path: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            descriptor_path: descriptor_path.into(),
            requirements: PathBuf::from(crate::manifest::DEFAULT_REQUIREMENTS),
            interpreter: PathBuf::from("python3"),
            git: PathBuf::from("git"),
            work_root: work_root.into(),
            provisioning_timeout: Duration::from_secs(600),
            execution_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the requirements file, relative to the working directory.
    #[must_use]
    pub fn with_requirements(mut self, requirements: impl Into<PathBuf>) -> Self {
        self.requirements = requirements.into();
        self
    }

    /// Overrides the host interpreter.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Overrides the `git` executable.
    #[must_use]
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    /// Overrides the per-step provisioning timeout.
    #[must_use]
    pub const fn with_provisioning_timeout(mut self, timeout: Duration) -> Self {
        self.provisioning_timeout = timeout;
        self
    }

    /// Overrides the per-call execution timeout.
    #[must_use]
    pub const fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the working directory for a given source tag.
    #[must_use]
    pub fn working_dir_for(&self, tag: &str) -> PathBuf {
        self.work_root.join(self.name.to_lowercase()).join(tag)
    }
}

/// Returns the interpreter inside the isolated environment.
#[must_use]
pub fn venv_interpreter(working_dir: &Path) -> PathBuf {
    let venv = working_dir.join(VENV_DIR);
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python3")
    }
}

/// Provisioned interpreter environment backing one plugin.
///
/// From [`RuntimeState::Ready`], [`ManagedRuntime::execute`] is stateless
/// on this side, but concurrent calls are only as safe as the script being
/// run.
pub struct ManagedRuntime {
    config: RuntimeConfig,
    executor: Arc<dyn CommandExecutor>,
    state: StateHandle,
    working_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ManagedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedRuntime")
            .field("config", &self.config)
            .field("state", &self.state.current())
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl ManagedRuntime {
    /// Creates an unprovisioned runtime.
    #[must_use]
    pub fn new(config: RuntimeConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            config,
            executor,
            state: StateHandle::default(),
            working_dir: None,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.state.current()
    }

    /// Returns a handle for observing the state from other threads.
    #[must_use]
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Returns the working directory once provisioning has resolved it.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Runs every provisioning step.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's [`ProvisionError`]; the state then
    /// becomes [`RuntimeState::Failed`].
    pub fn provision(&mut self) -> Result<(), ProvisionError> {
        self.state.set(RuntimeState::Provisioning);
        info!(
            target: RUNTIME_TARGET,
            plugin = self.config.name(),
            "provisioning managed runtime"
        );
        match self.run_steps() {
            Ok(working_dir) => {
                info!(
                    target: RUNTIME_TARGET,
                    plugin = self.config.name(),
                    working_dir = %working_dir.display(),
                    "managed runtime ready"
                );
                self.working_dir = Some(working_dir);
                self.state.set(RuntimeState::Ready);
                Ok(())
            }
            Err(error) => {
                warn!(
                    target: RUNTIME_TARGET,
                    plugin = self.config.name(),
                    %error,
                    "provisioning failed"
                );
                self.state.set(RuntimeState::Failed(error.to_string()));
                Err(error)
            }
        }
    }

    fn run_steps(&self) -> Result<PathBuf, ProvisionError> {
        let descriptor = RuntimeDescriptor::load(&self.config.descriptor_path)?;
        if let Some(minimum) = descriptor.min_interpreter() {
            self.check_interpreter(&minimum)?;
        }
        // Children run inside the working directory, so every path handed to
        // them must already be absolute.
        let relative = self.config.working_dir_for(descriptor.tag());
        let working_dir = std::path::absolute(&relative).map_err(io_error(&relative))?;
        self.checkout(descriptor.tag(), &working_dir)?;
        self.create_environment(&working_dir)?;
        self.install_requirements(&working_dir)?;
        Ok(working_dir)
    }

    fn check_interpreter(&self, minimum: &semver::Version) -> Result<(), ProvisionError> {
        let interpreter = self.config.interpreter.display().to_string();
        let invocation = ProcessInvocation::new(
            [self.config.interpreter.as_os_str(), OsStr::new("--version")],
            self.config.provisioning_timeout,
        );
        let mut stdout = CapturedLines::default();
        let mut stderr = CapturedLines::default();
        let outcome = self.executor.run(&invocation, &mut stdout, &mut stderr);
        if !outcome.is_success() {
            return Err(ProvisionError::VersionQuery {
                interpreter,
                detail: outcome.to_string(),
            });
        }

        let output = format!("{}\n{}", stdout.joined(), stderr.joined());
        let found = find_version(&output).ok_or_else(|| ProvisionError::VersionQuery {
            interpreter: interpreter.clone(),
            detail: format!("no version in output '{}'", output.trim()),
        })?;
        debug!(
            target: RUNTIME_TARGET,
            interpreter = %interpreter,
            %found,
            required = %minimum,
            "interpreter version"
        );
        if found < *minimum {
            return Err(ProvisionError::InterpreterTooOld {
                interpreter,
                found,
                required: minimum.clone(),
            });
        }
        Ok(())
    }

    /// Clones into a hidden sibling and renames it into place, so a failed
    /// or interrupted clone never leaves a checkout that later runs reuse.
    fn checkout(&self, tag: &str, working_dir: &Path) -> Result<(), ProvisionError> {
        if has_entries(working_dir) {
            info!(
                target: RUNTIME_TARGET,
                working_dir = %working_dir.display(),
                "reusing existing checkout"
            );
            return Ok(());
        }
        let parent = working_dir.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(io_error(parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".checkout-")
            .tempdir_in(parent)
            .map_err(io_error(parent))?;
        let staged = staging.path().join("source");
        let command: Vec<OsString> = vec![
            self.config.git.clone().into_os_string(),
            "clone".into(),
            "--depth".into(),
            "1".into(),
            "--branch".into(),
            tag.into(),
            self.config.repository.as_str().into(),
            staged.as_os_str().to_owned(),
        ];
        self.run_step("source checkout", command, None)?;

        if working_dir.is_dir() {
            fs::remove_dir(working_dir).map_err(io_error(working_dir))?;
        }
        fs::rename(&staged, working_dir).map_err(io_error(working_dir))
    }

    fn create_environment(&self, working_dir: &Path) -> Result<(), ProvisionError> {
        let command: Vec<OsString> = vec![
            self.config.interpreter.clone().into_os_string(),
            "-m".into(),
            "venv".into(),
            "--system-site-packages".into(),
            working_dir.join(VENV_DIR).into_os_string(),
        ];
        self.run_step("environment creation", command, Some(working_dir))
    }

    fn install_requirements(&self, working_dir: &Path) -> Result<(), ProvisionError> {
        let requirements = working_dir.join(&self.config.requirements);
        if !requirements.is_file() {
            return Err(ProvisionError::MissingRequirements { path: requirements });
        }
        let command: Vec<OsString> = vec![
            venv_interpreter(working_dir).into_os_string(),
            "-m".into(),
            "pip".into(),
            "install".into(),
            "-r".into(),
            requirements.into_os_string(),
        ];
        self.run_step("dependency installation", command, Some(working_dir))
    }

    fn run_step(
        &self,
        step: &'static str,
        command: Vec<OsString>,
        working_dir: Option<&Path>,
    ) -> Result<(), ProvisionError> {
        let mut invocation = ProcessInvocation::new(command, self.config.provisioning_timeout);
        if let Some(dir) = working_dir {
            invocation = invocation.working_dir(dir);
        }
        debug!(target: RUNTIME_TARGET, plugin = self.config.name(), step, "running step");
        let mut stdout = TracingSink::new(format!("{}:{step}", self.config.name()), Level::DEBUG);
        let mut stderr = TracingSink::new(format!("{}:{step}", self.config.name()), Level::INFO);
        let outcome = self.executor.run(&invocation, &mut stdout, &mut stderr);
        if outcome.is_success() {
            Ok(())
        } else {
            Err(ProvisionError::Step { step, outcome })
        }
    }

    /// Runs the plugin script inside the provisioned environment.
    ///
    /// Returns [`ExecutionOutcome::execution_error`] when the runtime is not
    /// [`RuntimeState::Ready`].
    #[must_use]
    pub fn execute(&self, layout: &dyn ScriptLayout, paths: &MappingPaths<'_>) -> ExecutionOutcome {
        let Some(working_dir) = self.working_dir.as_deref().filter(|_| self.state().is_ready())
        else {
            return ExecutionOutcome::execution_error().with_detail("plugin not initialised");
        };

        let mut command = vec![venv_interpreter(working_dir).into_os_string()];
        command.extend(layout.command_array(working_dir, &paths.with_workdir(working_dir)));
        let invocation =
            ProcessInvocation::new(command, self.config.execution_timeout).working_dir(working_dir);

        let mut stdout = TracingSink::new(format!("{}:stdout", self.config.name()), Level::DEBUG);
        let mut stderr = TracingSink::new(format!("{}:stderr", self.config.name()), Level::DEBUG);
        self.executor.run(&invocation, &mut stdout, &mut stderr)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ProvisionError + '_ {
    move |error| ProvisionError::Io {
        path: path.to_path_buf(),
        source: Arc::new(error),
    }
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}
