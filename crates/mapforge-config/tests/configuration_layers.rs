//! Layer precedence for the shared configuration.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tempfile::TempDir;

use mapforge_config::{Config, LogFormat, default_log_filter, default_plugin_dir};
use ortho_config::OrthoConfig as _;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; callers hold
        // ENV_MUTEX and Drop restores the previous value.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_config(dir: &TempDir, body: &str) -> OsString {
    let path = dir.path().join("mapforge.toml");
    fs::write(&path, body).expect("write configuration file");
    path.into_os_string()
}

#[test]
fn bare_invocation_applies_defaults() {
    let _guard = lock_env();
    let config = Config::load_from_iter([OsString::from("mapforge")]).expect("load defaults");

    assert_eq!(config.plugin_dir(), default_plugin_dir());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), LogFormat::Json);
    assert_eq!(config.execution_timeout_secs, 30);
}

#[test]
fn file_values_are_loaded() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        "plugin_dir = \"/srv/plugins\"\nexecution_timeout_secs = 12\nlog_format = \"compact\"\n",
    );

    let config = Config::load_from_iter([
        OsString::from("mapforge"),
        OsString::from("--config-path"),
        path,
    ])
    .expect("load from file");

    assert_eq!(config.plugin_dir().as_str(), "/srv/plugins");
    assert_eq!(config.execution_timeout_secs, 12);
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[test]
fn environment_overrides_file() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "execution_timeout_secs = 12\n");
    let _env = EnvOverride::set_var("MAPFORGE_EXECUTION_TIMEOUT_SECS", OsStr::new("45"));

    let config = Config::load_from_iter([
        OsString::from("mapforge"),
        OsString::from("--config-path"),
        path,
    ])
    .expect("load with env override");

    assert_eq!(config.execution_timeout_secs, 45);
}

#[test]
fn cli_overrides_environment() {
    let _guard = lock_env();
    let _env = EnvOverride::set_var("MAPFORGE_PLUGIN_DIR", OsStr::new("/from/env"));

    let config = Config::load_from_iter([
        OsString::from("mapforge"),
        OsString::from("--plugin-dir"),
        OsString::from("/from/cli"),
    ])
    .expect("load with cli override");

    assert_eq!(config.plugin_dir().as_str(), "/from/cli");
}
