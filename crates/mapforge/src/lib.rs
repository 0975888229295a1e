//! Command-line runtime for the mapforge plugin host.
//!
//! The runtime loads layered configuration, installs telemetry, loads the
//! plugin directory into a [`PluginManager`] and runs one operation against
//! it. It is exercised both from the binary entrypoint and from tests that
//! substitute the configuration loader and output streams.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use mapforge_config::Config;
use mapforge_plugins::{LoadContext, PluginManager};
use tracing::{error, info};

mod cli;
mod config;
mod errors;
pub mod telemetry;

use cli::{Cli, CliCommand};
use config::split_config_arguments;
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `mapforge_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--plugin-dir",
    "--work-dir",
    "--python-interpreter",
    "--git-executable",
    "--execution-timeout-secs",
    "--provisioning-timeout-secs",
    "--log-filter",
    "--log-format",
];

/// Tracing target for the CLI runtime.
const CLI_TARGET: &str = "mapforge::cli";

/// Runs the CLI using the provided arguments and IO handles.
///
/// Returns success when the operation completed and, for `map`, when the
/// mapping outcome is a success.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let arguments: Vec<OsString> = args.into_iter().collect();
    match execute(&arguments, stdout, loader) {
        Ok(exit_code) => exit_code,
        Err(app_error) => {
            if let Err(write_error) = writeln!(stderr, "{app_error}") {
                error!(
                    target: CLI_TARGET,
                    %app_error,
                    %write_error,
                    "failed to report error"
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn execute<W, L>(args: &[OsString], stdout: &mut W, loader: &L) -> Result<ExitCode, AppError>
where
    W: Write,
    L: ConfigLoader,
{
    let split = split_config_arguments(args);
    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        Err(usage) if !usage.use_stderr() => {
            write!(stdout, "{usage}")?;
            return Ok(ExitCode::SUCCESS);
        }
        Err(usage) => return Err(AppError::CliUsage(usage)),
    };
    let config = loader.load(&split.config_arguments)?;
    config.validate()?;
    telemetry::initialise(&config)?;

    let manager = PluginManager::load(config.plugin_dir().as_std_path(), load_context(&config))
        .map_err(AppError::LoadPlugins)?;
    dispatch(cli.command, &manager, stdout)
}

fn dispatch<W: Write>(
    command: CliCommand,
    manager: &PluginManager,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::List => {
            for descriptor in manager.descriptors() {
                writeln!(stdout, "{}", serde_json::to_string(&descriptor)?)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Describe { id } => {
            let plugin = manager
                .snapshot()
                .get(&id)
                .ok_or(AppError::UnknownPlugin(id))?;
            writeln!(
                stdout,
                "{}",
                serde_json::to_string_pretty(plugin.descriptor())?
            )?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Map {
            id,
            mapping,
            input,
            output,
        } => {
            let outcome = manager.map_file(&id, &mapping, &input, &output);
            writeln!(stdout, "{}", serde_json::to_string(&outcome)?)?;
            info!(target: CLI_TARGET, plugin = %id, outcome = %outcome.kind(), "map finished");
            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        CliCommand::Check => {
            let ids = manager.ids();
            writeln!(
                stdout,
                "{} plugin(s) ready in {}",
                ids.len(),
                manager.plugin_dir().display()
            )?;
            for id in ids {
                writeln!(stdout, "  {id}")?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Converts layered configuration into the plugin core's load settings.
fn load_context(config: &Config) -> LoadContext {
    LoadContext::new(config.work_dir().as_std_path())
        .with_python_interpreter(config.python_interpreter())
        .with_git_executable(config.git_executable())
        .with_execution_timeout(config.execution_timeout())
        .with_provisioning_timeout(config.provisioning_timeout())
}
