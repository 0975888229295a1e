//! Concrete plugin implementations and their construction from manifests.
//!
//! Each variant is a thin adapter: it supplies the specifics the process
//! runner or the contract needs and reports every externally observable
//! failure as an [`ExecutionOutcome`].

mod command;
mod json_query;
mod managed;
mod pass_through;
mod protocol;

use std::io;
use std::path::Path;
use std::time::Duration;

use crate::context::LoadContext;
use crate::contract::MappingPlugin;
use crate::manifest::{PluginArchive, PluginManifest, PluginSettings};
use crate::outcome::ExecutionOutcome;

pub use command::CommandPlugin;
pub use json_query::JsonQueryPlugin;
pub use managed::ManagedPlugin;
pub use pass_through::PassThroughPlugin;
pub use protocol::ProtocolPlugin;

/// Tracing target for plugin variants.
const VARIANT_TARGET: &str = "mapforge_plugins::variants";

/// Builds the plugin a manifest declares.
///
/// Manifests are validated while their archive is parsed, so construction
/// itself cannot fail; `setup()` performs the fallible preparation.
#[must_use]
pub fn instantiate(
    manifest: &PluginManifest,
    archive: &PluginArchive,
    context: &LoadContext,
) -> Box<dyn MappingPlugin> {
    let descriptor = manifest.descriptor();
    match manifest.settings() {
        PluginSettings::PassThrough => Box::new(PassThroughPlugin::new(descriptor)),
        PluginSettings::JsonQuery => Box::new(JsonQueryPlugin::new(descriptor)),
        PluginSettings::Command(settings) => Box::new(CommandPlugin::new(
            descriptor,
            settings.clone(),
            resolve_timeout(settings.timeout_secs(), context),
            context.executor(),
        )),
        PluginSettings::Protocol(settings) => Box::new(ProtocolPlugin::new(
            descriptor,
            settings.clone(),
            resolve_timeout(settings.timeout_secs(), context),
            context.executor(),
        )),
        PluginSettings::Managed(settings) => Box::new(ManagedPlugin::from_manifest(
            descriptor,
            settings,
            archive.resource_dir(),
            context,
        )),
    }
}

fn resolve_timeout(timeout_secs: Option<u64>, context: &LoadContext) -> Duration {
    timeout_secs.map_or_else(|| context.execution_timeout(), Duration::from_secs)
}

/// Classifies a filesystem failure encountered while serving a request.
fn io_failure(action: &str, path: &Path, error: &io::Error) -> ExecutionOutcome {
    let detail = format!("{action} '{}': {error}", path.display());
    if error.kind() == io::ErrorKind::PermissionDenied {
        ExecutionOutcome::insufficient_privileges().with_detail(detail)
    } else {
        ExecutionOutcome::execution_error().with_detail(detail)
    }
}

/// Fails `setup()` when a declared executable is absent.
fn require_executable(name: &str, executable: &Path) -> Result<(), crate::PluginError> {
    if executable.is_file() {
        Ok(())
    } else {
        Err(crate::PluginError::Setup {
            name: name.to_owned(),
            message: format!("executable '{}' not found", executable.display()),
        })
    }
}

#[cfg(test)]
mod tests;
