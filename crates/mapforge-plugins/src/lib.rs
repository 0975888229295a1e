//! Plugin framework for the mapforge mapping service.
//!
//! A mapping plugin turns an input file into an output file under the
//! direction of a mapping schema. This crate discovers plugins from a
//! directory of TOML archives, prepares each one, and dispatches mapping
//! requests by plugin identifier. Every request produces an
//! [`ExecutionOutcome`] drawn from a closed set of seven kinds.
//!
//! # Architecture
//!
//! - [`process`] runs external tools with a wall-clock budget, draining
//!   standard output and standard error concurrently and killing the whole
//!   process group when the budget is exceeded.
//! - [`manifest`] parses archives into typed [`PluginManifest`] entries.
//! - [`variants`] turns manifests into [`MappingPlugin`] implementations:
//!   byte copy, JSON restructuring, templated commands, the line protocol,
//!   and managed interpreter runtimes provisioned by [`runtime`].
//! - [`registry`] builds immutable snapshots; [`manager`] publishes them
//!   atomically so reloads never disturb requests in flight.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use mapforge_plugins::{LoadContext, OutcomeKind, PluginManager};
//!
//! let manager = PluginManager::load("/nonexistent/plugins", LoadContext::default())
//!     .expect("missing directories load as empty");
//! let outcome = manager.map_file(
//!     "Copy_1.0",
//!     Path::new("mapping.json"),
//!     Path::new("input.xml"),
//!     Path::new("output.json"),
//! );
//! assert_eq!(outcome.kind(), OutcomeKind::NotFound);
//! ```

pub mod context;
pub mod contract;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod outcome;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod template;
pub mod variants;

#[cfg(test)]
mod tests;

pub use self::context::LoadContext;
pub use self::contract::MappingPlugin;
pub use self::descriptor::PluginDescriptor;
pub use self::error::PluginError;
pub use self::manager::PluginManager;
pub use self::manifest::{CONTRACT, PluginArchive, PluginManifest, PluginSettings};
pub use self::outcome::{ExecutionOutcome, OutcomeKind};
pub use self::process::{CommandExecutor, ProcessInvocation, ProcessRunner};
pub use self::registry::PluginRegistry;
pub use self::runtime::{ManagedRuntime, ProvisionError, RuntimeState};
