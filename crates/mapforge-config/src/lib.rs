//! Shared configuration for the mapforge plugin host.
//!
//! [`Config`] is loaded through `ortho_config`, which layers built-in
//! defaults, an optional `mapforge.toml` file, `MAPFORGE_*` environment
//! variables and command-line flags (in increasing order of precedence).
//! The plugin core never reads this type directly; the binary converts it
//! into plain values at the core boundary.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_EXECUTION_TIMEOUT_SECS, DEFAULT_GIT_EXECUTABLE, DEFAULT_LOG_FILTER,
    DEFAULT_PLUGIN_DIR, DEFAULT_PROVISIONING_TIMEOUT_SECS, DEFAULT_PYTHON_INTERPRETER,
    DEFAULT_WORK_DIR, default_execution_timeout_secs, default_git_executable, default_log_filter,
    default_log_filter_string, default_log_format, default_plugin_dir,
    default_provisioning_timeout_secs, default_python_interpreter, default_work_dir,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MAPFORGE")]
pub struct Config {
    /// Directory scanned for plugin manifests.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: Utf8PathBuf,
    /// Root directory for managed runtime checkouts and environments.
    #[serde(default = "default_work_dir")]
    pub work_dir: Utf8PathBuf,
    /// Interpreter used by managed runtime plugins.
    #[serde(default = "default_python_interpreter")]
    pub python_interpreter: String,
    /// Executable used to check out plugin source code.
    #[serde(default = "default_git_executable")]
    pub git_executable: String,
    /// Budget for a single mapping execution, in seconds.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Budget for each provisioning step, in seconds.
    #[serde(default = "default_provisioning_timeout_secs")]
    pub provisioning_timeout_secs: u64,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            work_dir: default_work_dir(),
            python_interpreter: default_python_interpreter(),
            git_executable: default_git_executable(),
            execution_timeout_secs: default_execution_timeout_secs(),
            provisioning_timeout_secs: default_provisioning_timeout_secs(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Directory scanned for plugin manifests.
    #[must_use]
    pub fn plugin_dir(&self) -> &Utf8Path {
        self.plugin_dir.as_path()
    }

    /// Root directory for managed runtimes.
    #[must_use]
    pub fn work_dir(&self) -> &Utf8Path {
        self.work_dir.as_path()
    }

    /// Interpreter used by managed runtime plugins.
    #[must_use]
    pub const fn python_interpreter(&self) -> &str {
        self.python_interpreter.as_str()
    }

    /// Executable used to check out plugin source code.
    #[must_use]
    pub const fn git_executable(&self) -> &str {
        self.git_executable.as_str()
    }

    /// Budget for a single mapping execution.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Budget for each provisioning step.
    #[must_use]
    pub const fn provisioning_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioning_timeout_secs)
    }

    /// Filter expression applied to the tracing subscriber.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Format used by the tracing subscriber.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Rejects values that would make every subprocess fail immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTimeout`] when a timeout is zero and
    /// [`ConfigError::EmptyValue`] when an executable name is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "execution_timeout_secs",
            });
        }
        if self.provisioning_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "provisioning_timeout_secs",
            });
        }
        if self.python_interpreter.trim().is_empty() {
            return Err(ConfigError::EmptyValue {
                field: "python_interpreter",
            });
        }
        if self.git_executable.trim().is_empty() {
            return Err(ConfigError::EmptyValue {
                field: "git_executable",
            });
        }
        Ok(())
    }
}

/// Semantic validation failures for an otherwise well-formed [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A timeout was configured as zero seconds.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field name.
        field: &'static str,
    },
    /// A required text value was blank.
    #[error("{field} must not be empty")]
    EmptyValue {
        /// Offending field name.
        field: &'static str,
    },
}
