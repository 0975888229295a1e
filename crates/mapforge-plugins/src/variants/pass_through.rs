//! Copies the input file to the output file.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::{VARIANT_TARGET, io_failure};
use crate::contract::MappingPlugin;
use crate::descriptor::PluginDescriptor;
use crate::outcome::ExecutionOutcome;

/// Plugin whose output is byte-identical to its input.
///
/// The mapping file is ignored.
#[derive(Debug, Clone)]
pub struct PassThroughPlugin {
    descriptor: PluginDescriptor,
}

impl PassThroughPlugin {
    /// Creates the plugin.
    #[must_use]
    pub const fn new(descriptor: PluginDescriptor) -> Self {
        Self { descriptor }
    }
}

impl MappingPlugin for PassThroughPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn map_file(&self, _mapping: &Path, input: &Path, output: &Path) -> ExecutionOutcome {
        match fs::copy(input, output) {
            Ok(bytes) => {
                debug!(target: VARIANT_TARGET, plugin = self.name(), bytes, "copied input");
                ExecutionOutcome::success()
            }
            Err(error) => io_failure("failed to copy", input, &error),
        }
    }
}
