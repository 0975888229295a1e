//! Holder of the active registry snapshot.
//!
//! [`PluginManager`] owns the plugin directory and load context and
//! publishes the current [`PluginRegistry`] through an [`ArcSwap`]. Readers
//! take a snapshot without locking; [`PluginManager::reload`] builds a
//! complete new registry and swaps it in with a single pointer store, so a
//! request never observes a half-loaded registry. Snapshots handed out
//! before a reload stay valid until their last holder drops them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::context::LoadContext;
use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::outcome::ExecutionOutcome;
use crate::registry::PluginRegistry;

/// Tracing target for snapshot management.
const MANAGER_TARGET: &str = "mapforge_plugins::manager";

/// Publishes registry snapshots and serves requests against the active one.
///
/// # Example
///
/// ```
/// use mapforge_plugins::{LoadContext, PluginManager};
///
/// let manager = PluginManager::new("/nonexistent/plugins", LoadContext::default());
/// assert!(manager.snapshot().is_empty());
/// manager.reload().expect("missing directories reload as empty");
/// assert!(manager.ids().is_empty());
/// ```
#[derive(Debug)]
pub struct PluginManager {
    plugin_dir: PathBuf,
    context: LoadContext,
    active: ArcSwap<PluginRegistry>,
}

impl PluginManager {
    /// Creates a manager with an empty snapshot.
    #[must_use]
    pub fn new(plugin_dir: impl Into<PathBuf>, context: LoadContext) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            context,
            active: ArcSwap::from_pointee(PluginRegistry::new()),
        }
    }

    /// Creates a manager and performs the initial load.
    ///
    /// # Errors
    ///
    /// Returns the [`PluginRegistry::load`] error.
    pub fn load(plugin_dir: impl Into<PathBuf>, context: LoadContext) -> Result<Self, PluginError> {
        let manager = Self::new(plugin_dir, context);
        manager.reload()?;
        Ok(manager)
    }

    /// Returns the plugin directory.
    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Returns the active snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PluginRegistry> {
        self.active.load_full()
    }

    /// Loads a fresh registry and publishes it.
    ///
    /// # Errors
    ///
    /// Returns the load error; the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<PluginRegistry>, PluginError> {
        match PluginRegistry::load(&self.plugin_dir, &self.context) {
            Ok(registry) => {
                let fresh = Arc::new(registry);
                let previous = self.active.swap(Arc::clone(&fresh));
                info!(
                    target: MANAGER_TARGET,
                    previous = previous.len(),
                    current = fresh.len(),
                    "published plugin snapshot"
                );
                Ok(fresh)
            }
            Err(error) => {
                warn!(
                    target: MANAGER_TARGET,
                    %error,
                    "reload failed; keeping previous snapshot"
                );
                Err(error)
            }
        }
    }

    /// Runs a mapping against the active snapshot.
    #[must_use]
    pub fn map_file(
        &self,
        id: &str,
        mapping: &Path,
        input: &Path,
        output: &Path,
    ) -> ExecutionOutcome {
        // Holds an owned snapshot; a guard must not live as long as a run.
        self.active.load_full().map_file(id, mapping, input, output)
    }

    /// Returns the active snapshot's descriptors ordered by identifier.
    #[must_use]
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.active.load().descriptors()
    }

    /// Returns the active snapshot's identifiers in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.active.load().ids()
    }
}

#[cfg(test)]
mod tests;
