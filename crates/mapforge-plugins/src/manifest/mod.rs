//! Plugin archives and the manifests they declare.
//!
//! A plugin archive is a TOML file in the plugin directory holding one or
//! more `[[plugin]]` tables. A table describes a mapping plugin only when its
//! `contract` field equals [`CONTRACT`] exactly; other tables (shared helper
//! definitions, plugins for other hosts) are skipped. Manifests are validated
//! as they are read so that malformed declarations abort a load early.
//!
//! ```toml
//! [[plugin]]
//! contract = "mapforge.mapping-plugin/1"
//! name = "Identify"
//! version = "1.0.0"
//! kind = "command"
//! executable = "/usr/bin/identify"
//! args = ["-verbose", "{input}"]
//! stdout_to_output = true
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;

/// Contract identifier a `[[plugin]]` table must declare to be loaded.
pub const CONTRACT: &str = "mapforge.mapping-plugin/1";

/// Suffix of the runtime descriptor bundled beside an archive. Files with
/// this suffix are resources, never archives.
pub const RUNTIME_DESCRIPTOR_SUFFIX: &str = ".runtime.toml";

/// Requirements file installed into managed runtimes unless overridden.
pub const DEFAULT_REQUIREMENTS: &str = "requirements.dist.txt";

/// Tracing target for manifest parsing.
const MANIFEST_TARGET: &str = "mapforge_plugins::manifest";

/// Declaration of one mapping plugin.
///
/// # Example
///
/// ```
/// use mapforge_plugins::manifest::{PluginManifest, PluginSettings};
///
/// let manifest: PluginManifest = toml::from_str(
///     r#"
///     contract = "mapforge.mapping-plugin/1"
///     name = "Copy"
///     version = "1.0.0"
///     kind = "pass_through"
///     "#,
/// )
/// .expect("valid manifest");
/// assert_eq!(manifest.id(), "Copy_1.0.0");
/// assert_eq!(manifest.settings(), &PluginSettings::PassThrough);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    contract: String,
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    input_types: Vec<String>,
    #[serde(default)]
    output_types: Vec<String>,
    #[serde(flatten)]
    settings: PluginSettings,
}

/// Variant-specific configuration, selected by the `kind` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginSettings {
    /// Copies the input file to the output file unchanged.
    PassThrough,
    /// Wraps a fixed local executable.
    Command(CommandSettings),
    /// Evaluates a JSON transformation document in-process.
    JsonQuery,
    /// Drives an independent executable over the JSONL protocol.
    Protocol(ProtocolSettings),
    /// Runs a script inside a provisioned interpreter environment.
    Managed(ManagedSettings),
}

impl PluginSettings {
    /// Returns the `kind` value this variant is declared with.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::Command(_) => "command",
            Self::JsonQuery => "json_query",
            Self::Protocol(_) => "protocol",
            Self::Managed(_) => "managed",
        }
    }

    const fn timeout_secs(&self) -> Option<u64> {
        match self {
            Self::Command(settings) => settings.timeout_secs,
            Self::Protocol(settings) => settings.timeout_secs,
            Self::Managed(settings) => settings.timeout_secs,
            Self::PassThrough | Self::JsonQuery => None,
        }
    }
}

/// Settings for `kind = "command"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSettings {
    executable: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    stdout_to_output: bool,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl CommandSettings {
    /// Returns the absolute path of the wrapped executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the argument templates.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns `true` when the child's stdout becomes the output file.
    #[must_use]
    pub const fn stdout_to_output(&self) -> bool {
        self.stdout_to_output
    }

    /// Returns the per-call timeout override in seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }
}

/// Settings for `kind = "protocol"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    executable: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl ProtocolSettings {
    /// Returns the absolute path of the plugin executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the fixed arguments passed to the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the per-call timeout override in seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }
}

/// Settings for `kind = "managed"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedSettings {
    repository: String,
    script: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_requirements")]
    requirements: PathBuf,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

fn default_requirements() -> PathBuf {
    PathBuf::from(DEFAULT_REQUIREMENTS)
}

impl ManagedSettings {
    /// Returns the location the plugin source is checked out from.
    #[must_use]
    pub const fn repository(&self) -> &str {
        self.repository.as_str()
    }

    /// Returns the script path relative to the working directory.
    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Returns the argument templates passed after the script.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the requirements file relative to the working directory.
    #[must_use]
    pub fn requirements(&self) -> &Path {
        &self.requirements
    }

    /// Returns the per-call timeout override in seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }
}

impl PluginManifest {
    /// Returns the declared contract identifier.
    #[must_use]
    pub const fn contract(&self) -> &str {
        self.contract.as_str()
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the registry identifier, `name_version`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }

    /// Returns the variant-specific settings.
    #[must_use]
    pub const fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Builds the descriptor exposed to listing endpoints.
    #[must_use]
    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(self.name.as_str(), self.version.as_str())
            .with_description(self.description.as_str())
            .with_uri(self.uri.as_str())
            .with_input_types(self.input_types.clone())
            .with_output_types(self.output_types.clone())
    }

    /// Validates the manifest, returning an error if it cannot be
    /// instantiated.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Instantiation`] when the contract does not
    /// match, the name or version is blank, an executable path is relative,
    /// a managed script escapes its working directory, or a timeout is zero.
    pub fn validate(&self) -> Result<(), PluginError> {
        let fail = |message: String| PluginError::Instantiation {
            name: self.name.clone(),
            message,
        };
        if self.contract != CONTRACT {
            return Err(fail(format!(
                "unsupported contract '{}', expected '{CONTRACT}'",
                self.contract
            )));
        }
        if self.name.trim().is_empty() {
            return Err(fail(String::from("plugin name must not be empty")));
        }
        if self.version.trim().is_empty() {
            return Err(fail(String::from("plugin version must not be empty")));
        }
        if self.settings.timeout_secs() == Some(0) {
            return Err(fail(String::from("timeout_secs must be greater than zero")));
        }
        match &self.settings {
            PluginSettings::Command(CommandSettings { executable, .. })
            | PluginSettings::Protocol(ProtocolSettings { executable, .. })
                if !executable.is_absolute() =>
            {
                Err(fail(format!(
                    "plugin executable must be an absolute path, got '{}'",
                    executable.display()
                )))
            }
            PluginSettings::Managed(settings) => validate_managed(settings).map_err(fail),
            _ => Ok(()),
        }
    }
}

fn validate_managed(settings: &ManagedSettings) -> Result<(), String> {
    if settings.repository.trim().is_empty() {
        return Err(String::from("managed plugins must declare a repository"));
    }
    for (field, path) in [
        ("script", &settings.script),
        ("requirements", &settings.requirements),
    ] {
        if !is_contained(path) {
            return Err(format!(
                "{field} must be a relative path inside the working directory, got '{}'",
                path.display()
            ));
        }
    }
    Ok(())
}

/// Returns `true` for non-empty relative paths without `..` components.
fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Deserialize)]
struct RawArchive {
    #[serde(default)]
    plugin: Vec<toml::Table>,
}

/// A parsed plugin archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginArchive {
    path: PathBuf,
    manifests: Vec<PluginManifest>,
    skipped: usize,
}

impl PluginArchive {
    /// Reads and parses the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the file cannot be read, otherwise
    /// the errors of [`PluginArchive::parse`].
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let source = fs::read_to_string(path).map_err(|error| PluginError::Io {
            name: path.display().to_string(),
            source: Arc::new(error),
        })?;
        Self::parse(path, &source)
    }

    /// Parses archive text, keeping only tables that declare [`CONTRACT`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] when the text is not valid TOML and
    /// [`PluginError::Instantiation`] when a matching table cannot be turned
    /// into a valid manifest.
    pub fn parse(path: &Path, source: &str) -> Result<Self, PluginError> {
        let raw: RawArchive = toml::from_str(source).map_err(|error| PluginError::Manifest {
            path: path.to_path_buf(),
            message: error.message().to_owned(),
        })?;

        let mut manifests = Vec::with_capacity(raw.plugin.len());
        let mut skipped = 0;
        for table in raw.plugin {
            let contract = table.get("contract").and_then(toml::Value::as_str);
            if contract != Some(CONTRACT) {
                debug!(
                    target: MANIFEST_TARGET,
                    archive = %path.display(),
                    contract = contract.unwrap_or("<none>"),
                    "skipping table without the mapping-plugin contract"
                );
                skipped += 1;
                continue;
            }
            let name = table
                .get("name")
                .and_then(toml::Value::as_str)
                .unwrap_or("<unnamed>")
                .to_owned();
            let manifest: PluginManifest = toml::Value::Table(table)
                .try_into()
                .map_err(|error: toml::de::Error| PluginError::Instantiation {
                    name,
                    message: error.message().to_owned(),
                })?;
            manifest.validate()?;
            manifests.push(manifest);
        }

        Ok(Self {
            path: path.to_path_buf(),
            manifests,
            skipped,
        })
    }

    /// Returns the archive path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory holding the archive and its bundled resources.
    #[must_use]
    pub fn resource_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Returns the accepted manifests in declaration order.
    #[must_use]
    pub fn manifests(&self) -> &[PluginManifest] {
        &self.manifests
    }

    /// Returns the number of tables skipped for declaring another contract.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }
}
