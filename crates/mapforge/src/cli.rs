//! CLI argument definitions for the mapforge binary.
//!
//! Configuration flags such as `--plugin-dir` are consumed by the
//! configuration loader before clap sees the remaining tokens, so they must
//! precede the subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for the mapforge plugin host.
#[derive(Parser, Debug)]
#[command(name = "mapforge", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// The operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations against the configured plugin directory.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Prints one JSON descriptor line per loaded plugin.
    List,
    /// Prints the descriptor of a single plugin.
    Describe {
        /// Plugin identifier in `name_version` form.
        id: String,
    },
    /// Runs a mapping and prints its outcome as JSON.
    Map {
        /// Plugin identifier in `name_version` form.
        id: String,
        /// Mapping schema file.
        mapping: PathBuf,
        /// Input document.
        input: PathBuf,
        /// Output document to create.
        output: PathBuf,
    },
    /// Loads the plugin directory and reports how many plugins are ready.
    Check,
}
