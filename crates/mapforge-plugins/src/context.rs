//! Host settings shared by every plugin built during one load.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::process::{CommandExecutor, ProcessRunner};

/// Default per-call execution budget.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-step provisioning budget.
pub const DEFAULT_PROVISIONING_TIMEOUT: Duration = Duration::from_secs(600);

/// Everything a registry load needs besides the plugin directory.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mapforge_plugins::LoadContext;
///
/// let context = LoadContext::new("/var/lib/mapforge")
///     .with_python_interpreter("/usr/bin/python3.11")
///     .with_execution_timeout(Duration::from_secs(5));
/// assert_eq!(context.execution_timeout(), Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct LoadContext {
    work_dir: PathBuf,
    python_interpreter: PathBuf,
    git_executable: PathBuf,
    execution_timeout: Duration,
    provisioning_timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("work_dir", &self.work_dir)
            .field("python_interpreter", &self.python_interpreter)
            .field("git_executable", &self.git_executable)
            .field("execution_timeout", &self.execution_timeout)
            .field("provisioning_timeout", &self.provisioning_timeout)
            .finish_non_exhaustive()
    }
}

impl LoadContext {
    /// Creates a context that provisions managed runtimes under `work_dir`.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            python_interpreter: PathBuf::from("python3"),
            git_executable: PathBuf::from("git"),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            provisioning_timeout: DEFAULT_PROVISIONING_TIMEOUT,
            executor: Arc::new(ProcessRunner::new()),
        }
    }

    /// Overrides the host interpreter used by managed runtimes.
    #[must_use]
    pub fn with_python_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.python_interpreter = interpreter.into();
        self
    }

    /// Overrides the `git` executable used for source checkouts.
    #[must_use]
    pub fn with_git_executable(mut self, git: impl Into<PathBuf>) -> Self {
        self.git_executable = git.into();
        self
    }

    /// Overrides the default per-call execution budget.
    #[must_use]
    pub const fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Overrides the per-step provisioning budget.
    #[must_use]
    pub const fn with_provisioning_timeout(mut self, timeout: Duration) -> Self {
        self.provisioning_timeout = timeout;
        self
    }

    /// Replaces the command executor handed to subprocess-backed plugins.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Returns the root of per-plugin working directories.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Returns the host interpreter.
    #[must_use]
    pub fn python_interpreter(&self) -> &Path {
        &self.python_interpreter
    }

    /// Returns the `git` executable.
    #[must_use]
    pub fn git_executable(&self) -> &Path {
        &self.git_executable
    }

    /// Returns the default per-call execution budget.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    /// Returns the per-step provisioning budget.
    #[must_use]
    pub const fn provisioning_timeout(&self) -> Duration {
        self.provisioning_timeout
    }

    /// Returns the shared command executor.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        Arc::clone(&self.executor)
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        Self::new("work")
    }
}
