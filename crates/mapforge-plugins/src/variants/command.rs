//! Wraps a fixed local executable.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, debug};

use super::{VARIANT_TARGET, io_failure, require_executable};
use crate::contract::MappingPlugin;
use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::manifest::CommandSettings;
use crate::outcome::ExecutionOutcome;
use crate::process::{CommandExecutor, FileSink, ProcessInvocation, TracingSink};
use crate::template::{MappingPaths, expand_all};

/// Runs a manifest-declared executable with templated arguments.
///
/// With `stdout_to_output` the child's stdout becomes the output file, as
/// for tools such as ImageMagick's `identify` that only print their result;
/// otherwise the tool is expected to write `{output}` itself. Captured stdout
/// is staged and only replaces the output file when the tool succeeds.
pub struct CommandPlugin {
    descriptor: PluginDescriptor,
    settings: CommandSettings,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandPlugin {
    /// Creates the plugin.
    #[must_use]
    pub fn new(
        descriptor: PluginDescriptor,
        settings: CommandSettings,
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

    fn invocation(&self, paths: &MappingPaths<'_>) -> ProcessInvocation {
        let mut command = vec![self.settings.executable().as_os_str().to_owned()];
        command.extend(expand_all(self.settings.args(), paths));
        ProcessInvocation::new(command, self.timeout)
    }
}

impl MappingPlugin for CommandPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn setup(&mut self) -> Result<(), PluginError> {
        require_executable(&self.id(), self.settings.executable())
    }

    fn map_file(&self, mapping: &Path, input: &Path, output: &Path) -> ExecutionOutcome {
        let invocation = self.invocation(&MappingPaths::new(mapping, input, output));
        debug!(
            target: VARIANT_TARGET,
            plugin = self.name(),
            program = %invocation.program_name(),
            "running command plugin"
        );
        let mut stderr = TracingSink::new(format!("{}:stderr", self.name()), Level::DEBUG);

        if !self.settings.stdout_to_output() {
            let mut stdout = TracingSink::new(format!("{}:stdout", self.name()), Level::DEBUG);
            return self.executor.run(&invocation, &mut stdout, &mut stderr);
        }

        let mut sink = match FileSink::create(output) {
            Ok(sink) => sink,
            Err(error) => return io_failure("failed to create", output, &error),
        };
        let outcome = self.executor.run(&invocation, &mut sink, &mut stderr);
        if !outcome.is_success() {
            sink.discard();
            return outcome;
        }
        match sink.commit() {
            Ok(()) => outcome,
            Err(error) => io_failure("failed to write", output, &error),
        }
    }
}
