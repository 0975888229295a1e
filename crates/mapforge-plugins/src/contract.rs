//! The capability set every mapping plugin implements.

use std::path::Path;

use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::outcome::ExecutionOutcome;

/// A transformation engine that turns an input file into an output file
/// according to a mapping document.
///
/// Implementations are shared across request threads through the registry,
/// so they must be `Send + Sync` and must not assume they are the only
/// plugin active. Whether concurrent [`map_file`](Self::map_file) calls on
/// the same instance are safe depends on the external tool a variant drives;
/// callers that need serialisation must provide it.
pub trait MappingPlugin: Send + Sync {
    /// Returns the plugin's metadata.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Returns the human-readable name.
    fn name(&self) -> &str {
        self.descriptor().name()
    }

    /// Returns the free-text description.
    fn description(&self) -> &str {
        self.descriptor().description()
    }

    /// Returns the version string.
    fn version(&self) -> &str {
        self.descriptor().version()
    }

    /// Returns the documentation or source URI.
    fn uri(&self) -> &str {
        self.descriptor().uri()
    }

    /// Returns the accepted input mime types.
    fn input_types(&self) -> &[String] {
        self.descriptor().input_types()
    }

    /// Returns the produced output mime types.
    fn output_types(&self) -> &[String] {
        self.descriptor().output_types()
    }

    /// Returns the registry identifier, `name_version` unless overridden.
    fn id(&self) -> String {
        format!("{}_{}", self.name(), self.version())
    }

    /// Prepares the plugin for use.
    ///
    /// May touch the network and the filesystem. A failure keeps the plugin
    /// out of the registry.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] describing why the plugin cannot be used.
    fn setup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Transforms `input` into `output` using `mapping`.
    ///
    /// Externally observable failures are reported through the returned
    /// outcome, never by panicking.
    fn map_file(&self, mapping: &Path, input: &Path, output: &Path) -> ExecutionOutcome;
}
