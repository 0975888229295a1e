use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Directory scanned for plugin manifests when nothing else is configured.
pub const DEFAULT_PLUGIN_DIR: &str = "./plugins";

/// Root under which managed runtimes check out code and build environments.
pub const DEFAULT_WORK_DIR: &str = "./work";

/// Interpreter used to query versions and create isolated environments.
pub const DEFAULT_PYTHON_INTERPRETER: &str = "python3";

/// Executable used to materialise plugin source code.
pub const DEFAULT_GIT_EXECUTABLE: &str = "git";

/// Budget for a single mapping execution, in seconds.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 30;

/// Budget for each provisioning step (checkout, venv, install), in seconds.
pub const DEFAULT_PROVISIONING_TIMEOUT_SECS: u64 = 600;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default plugin directory.
pub fn default_plugin_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_PLUGIN_DIR)
}

/// Default managed runtime root.
pub fn default_work_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_WORK_DIR)
}

/// Owned interpreter value used where allocation is required (e.g. serde).
pub fn default_python_interpreter() -> String {
    DEFAULT_PYTHON_INTERPRETER.to_owned()
}

/// Owned git executable value used where allocation is required.
pub fn default_git_executable() -> String {
    DEFAULT_GIT_EXECUTABLE.to_owned()
}

/// Default execution budget in seconds.
pub const fn default_execution_timeout_secs() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT_SECS
}

/// Default provisioning budget in seconds.
pub const fn default_provisioning_timeout_secs() -> u64 {
    DEFAULT_PROVISIONING_TIMEOUT_SECS
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
