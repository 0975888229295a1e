//! Drives an independent plugin executable over the JSONL protocol.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, debug};

use super::{VARIANT_TARGET, require_executable};
use crate::contract::MappingPlugin;
use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::manifest::ProtocolSettings;
use crate::outcome::ExecutionOutcome;
use crate::process::{CapturedLines, CommandExecutor, ProcessInvocation, TracingSink};
use crate::protocol::{MappingRequest, parse_response};

/// Plugin that runs its own executable and exchanges one request and one
/// response with it.
pub struct ProtocolPlugin {
    descriptor: PluginDescriptor,
    settings: ProtocolSettings,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl ProtocolPlugin {
    /// Creates the plugin.
    #[must_use]
    pub fn new(
        descriptor: PluginDescriptor,
        settings: ProtocolSettings,
        timeout: Duration,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            descriptor,
            settings,
            timeout,
            executor,
        }
    }
}

impl MappingPlugin for ProtocolPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn setup(&mut self) -> Result<(), PluginError> {
        require_executable(&self.id(), self.settings.executable())
    }

    fn map_file(&self, mapping: &Path, input: &Path, output: &Path) -> ExecutionOutcome {
        let request = match MappingRequest::new(mapping, input, output).to_line() {
            Ok(line) => line,
            Err(error) => return ExecutionOutcome::unknown_error().with_detail(error.to_string()),
        };

        let mut command = vec![self.settings.executable().as_os_str().to_owned()];
        command.extend(self.settings.args().iter().map(Into::into));
        let invocation = ProcessInvocation::new(command, self.timeout).stdin(request);

        let mut stdout = CapturedLines::default();
        let mut stderr = TracingSink::new(format!("{}:stderr", self.name()), Level::DEBUG);
        let outcome = self.executor.run(&invocation, &mut stdout, &mut stderr);
        if !outcome.is_success() {
            return outcome;
        }

        match parse_response(stdout.last_non_empty()) {
            Ok(response) => {
                debug!(
                    target: VARIANT_TARGET,
                    plugin = self.name(),
                    outcome = %response.kind(),
                    "plugin responded"
                );
                response
            }
            Err(error) => ExecutionOutcome::execution_error()
                .with_detail(format!("invalid plugin response: {error}")),
        }
    }
}
