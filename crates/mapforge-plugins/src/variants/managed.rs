//! Interpreter-backed plugin on top of a managed runtime.

use std::path::Path;

use crate::context::LoadContext;
use crate::contract::MappingPlugin;
use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::manifest::{ManagedSettings, RUNTIME_DESCRIPTOR_SUFFIX};
use crate::outcome::ExecutionOutcome;
use crate::runtime::{ManagedRuntime, RuntimeConfig, RuntimeState, StateHandle, TemplateLayout};
use crate::template::MappingPaths;

/// Plugin that runs a script inside its own provisioned environment.
#[derive(Debug)]
pub struct ManagedPlugin {
    descriptor: PluginDescriptor,
    runtime: ManagedRuntime,
    layout: TemplateLayout,
}

impl ManagedPlugin {
    /// Creates the plugin from an explicit runtime and layout.
    #[must_use]
    pub const fn new(
        descriptor: PluginDescriptor,
        runtime: ManagedRuntime,
        layout: TemplateLayout,
    ) -> Self {
        Self {
            descriptor,
            runtime,
            layout,
        }
    }

    /// Creates the plugin a `managed` manifest declares.
    ///
    /// The runtime descriptor is looked up as
    /// `<resource_dir>/<lowercased name>.runtime.toml`.
    #[must_use]
    pub fn from_manifest(
        descriptor: PluginDescriptor,
        settings: &ManagedSettings,
        resource_dir: &Path,
        context: &LoadContext,
    ) -> Self {
        let descriptor_file = format!(
            "{}{RUNTIME_DESCRIPTOR_SUFFIX}",
            descriptor.name().to_lowercase()
        );
        let execution_timeout = super::resolve_timeout(settings.timeout_secs(), context);
        let config = RuntimeConfig::new(
            descriptor.name(),
            settings.repository(),
            resource_dir.join(descriptor_file),
            context.work_dir(),
        )
        .with_requirements(settings.requirements())
        .with_interpreter(context.python_interpreter())
        .with_git(context.git_executable())
        .with_provisioning_timeout(context.provisioning_timeout())
        .with_execution_timeout(execution_timeout);
        let layout = TemplateLayout::new(settings.script().to_path_buf(), settings.args().to_vec());
        Self::new(
            descriptor,
            ManagedRuntime::new(config, context.executor()),
            layout,
        )
    }

    /// Returns the runtime's current state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.runtime.state()
    }

    /// Returns a handle for observing the runtime's state.
    #[must_use]
    pub fn state_handle(&self) -> StateHandle {
        self.runtime.state_handle()
    }
}

impl MappingPlugin for ManagedPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn setup(&mut self) -> Result<(), PluginError> {
        self.runtime
            .provision()
            .map_err(|source| PluginError::Provision {
                name: self.descriptor.id(),
                source: Box::new(source),
            })
    }

    fn map_file(&self, mapping: &Path, input: &Path, output: &Path) -> ExecutionOutcome {
        self.runtime
            .execute(&self.layout, &MappingPaths::new(mapping, input, output))
    }
}
