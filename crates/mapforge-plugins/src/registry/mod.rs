//! Immutable plugin snapshots built from a directory of archives.
//!
//! [`PluginRegistry::load`] enumerates the `*.toml` archives of a plugin
//! directory in lexical order, parses every archive, builds each declared
//! plugin and calls its `setup()`. Plugins whose setup succeeds are keyed by
//! identifier; when two plugins share an identifier the one loaded last
//! replaces the earlier one.
//!
//! Loading is all-or-nothing for discovery: an unreadable directory, an
//! unparsable archive or an uninstantiable manifest aborts the whole load.
//! A failing `setup()` only drops that plugin. A missing directory or one
//! without archives yields an empty registry.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::context::LoadContext;
use crate::contract::MappingPlugin;
use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::manifest::{PluginArchive, RUNTIME_DESCRIPTOR_SUFFIX};
use crate::outcome::ExecutionOutcome;
use crate::variants::instantiate;

/// Tracing target for registry operations.
const REGISTRY_TARGET: &str = "mapforge_plugins::registry";

/// File extension of plugin archives.
const ARCHIVE_EXTENSION: &str = "toml";

/// Snapshot of ready plugins keyed by identifier.
///
/// Every plugin in a snapshot has completed `setup()`. Snapshots are shared
/// behind [`Arc`] and never mutated once published; see
/// [`PluginManager`](crate::PluginManager) for atomic replacement.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use mapforge_plugins::{LoadContext, OutcomeKind, PluginRegistry};
///
/// let registry = PluginRegistry::load(Path::new("/nonexistent"), &LoadContext::default())
///     .expect("missing directories load as empty");
/// assert!(registry.is_empty());
///
/// let outcome = registry.map_file("Copy_1.0", Path::new("m"), Path::new("i"), Path::new("o"));
/// assert_eq!(outcome.kind(), OutcomeKind::NotFound);
/// ```
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn MappingPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every plugin declared by the archives in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DirectoryRead`] when `dir` exists but cannot be
    /// enumerated, and any [`PluginArchive::load`] error for a broken archive.
    pub fn load(dir: &Path, context: &LoadContext) -> Result<Self, PluginError> {
        let started = Instant::now();
        if !dir.is_dir() {
            warn!(
                target: REGISTRY_TARGET,
                dir = %dir.display(),
                "plugin directory does not exist; no plugins loaded"
            );
            return Ok(Self::new());
        }

        let archive_paths = list_archives(dir)?;
        if archive_paths.is_empty() {
            warn!(
                target: REGISTRY_TARGET,
                dir = %dir.display(),
                "no plugin archives found"
            );
            return Ok(Self::new());
        }

        let archives = archive_paths
            .iter()
            .map(|path| PluginArchive::load(path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut registry = Self::new();
        for archive in &archives {
            debug!(
                target: REGISTRY_TARGET,
                archive = %archive.path().display(),
                plugins = archive.manifests().len(),
                skipped = archive.skipped(),
                "loading archive"
            );
            for manifest in archive.manifests() {
                let plugin = instantiate(manifest, archive, context);
                if let Err(error) = registry.register(plugin) {
                    warn!(
                        target: REGISTRY_TARGET,
                        plugin = %manifest.id(),
                        %error,
                        "plugin setup failed; skipping"
                    );
                }
            }
        }

        info!(
            target: REGISTRY_TARGET,
            dir = %dir.display(),
            archives = archives.len(),
            plugins = registry.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "plugin registry loaded"
        );
        Ok(registry)
    }

    /// Runs `setup()` on `plugin` and adds it under its identifier.
    ///
    /// A plugin with the same identifier is replaced.
    ///
    /// # Errors
    ///
    /// Returns the plugin's setup error; the registry is left unchanged.
    pub fn register(&mut self, mut plugin: Box<dyn MappingPlugin>) -> Result<(), PluginError> {
        plugin.setup()?;
        let id = plugin.id();
        if self.plugins.insert(id.clone(), Arc::from(plugin)).is_some() {
            debug!(target: REGISTRY_TARGET, plugin = %id, "replaced plugin with duplicate id");
        }
        Ok(())
    }

    /// Looks up a plugin by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn MappingPlugin>> {
        self.plugins.get(id).map(Arc::clone)
    }

    /// Returns `true` when a plugin with `id` is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// Returns all identifiers in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns all descriptors ordered by identifier.
    #[must_use]
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        let mut entries: Vec<(&String, &Arc<dyn MappingPlugin>)> = self.plugins.iter().collect();
        entries.sort_unstable_by(|left, right| left.0.cmp(right.0));
        entries
            .into_iter()
            .map(|(_, plugin)| plugin.descriptor().clone())
            .collect()
    }

    /// Returns the number of plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugins are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Validates a request and runs the plugin it names.
    ///
    /// Blank identifiers or paths yield [`ExecutionOutcome::invalid_input`];
    /// an unknown identifier yields [`ExecutionOutcome::not_found`] without
    /// touching the output path.
    #[must_use]
    pub fn map_file(
        &self,
        id: &str,
        mapping: &Path,
        input: &Path,
        output: &Path,
    ) -> ExecutionOutcome {
        if let Some(rejection) = validate_request(id, mapping, input, output) {
            return rejection;
        }
        let Some(plugin) = self.plugins.get(id) else {
            debug!(target: REGISTRY_TARGET, plugin = id, "plugin not found");
            return ExecutionOutcome::not_found().with_detail(format!("Plugin '{id}' not found!"));
        };

        let started = Instant::now();
        let outcome = plugin.map_file(mapping, input, output);
        info!(
            target: REGISTRY_TARGET,
            plugin = id,
            outcome = %outcome.kind(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "mapping finished"
        );
        outcome
    }
}

fn validate_request(
    id: &str,
    mapping: &Path,
    input: &Path,
    output: &Path,
) -> Option<ExecutionOutcome> {
    let message = if id.trim().is_empty() {
        "Plugin ID is null."
    } else if mapping.as_os_str().is_empty() {
        "Path to mapping schema is null."
    } else if input.as_os_str().is_empty() {
        "Path to input file is null."
    } else if output.as_os_str().is_empty() {
        "Path to output file is null."
    } else {
        return None;
    };
    Some(ExecutionOutcome::invalid_input().with_detail(message))
}

/// Returns archive files in `dir`, sorted by file name.
fn list_archives(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let read_error = |error| PluginError::DirectoryRead {
        path: dir.to_path_buf(),
        source: Arc::new(error),
    };
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if is_archive(&path) {
            archives.push(path);
        }
    }
    archives.sort_unstable_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(archives)
}

fn is_archive(path: &Path) -> bool {
    let is_toml = path
        .extension()
        .is_some_and(|extension| extension == ARCHIVE_EXTENSION);
    let is_descriptor = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(RUNTIME_DESCRIPTOR_SUFFIX));
    is_toml && !is_descriptor && path.is_file()
}
