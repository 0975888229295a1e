//! Immutable plugin metadata exposed to listing endpoints.

use serde::{Deserialize, Serialize};

/// Identity and documentation of a mapping plugin.
///
/// The identifier is derived as `name_version` and must be unique within a
/// registry snapshot.
///
/// # Example
///
/// ```
/// use mapforge_plugins::PluginDescriptor;
///
/// let descriptor = PluginDescriptor::new("Identify", "1.0.0")
///     .with_description("Extracts image metadata")
///     .with_input_types(vec!["image/png".into()]);
/// assert_eq!(descriptor.id(), "Identify_1.0.0");
/// assert_eq!(descriptor.input_types(), ["image/png"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
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
}

impl PluginDescriptor {
    /// Creates a descriptor with empty documentation fields.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            uri: String::new(),
            input_types: Vec::new(),
            output_types: Vec::new(),
        }
    }

    /// Sets the free-text description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the documentation or source URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Declares the accepted input mime types.
    #[must_use]
    pub fn with_input_types(mut self, input_types: Vec<String>) -> Self {
        self.input_types = input_types;
        self
    }

    /// Declares the produced output mime types.
    #[must_use]
    pub fn with_output_types(mut self, output_types: Vec<String>) -> Self {
        self.output_types = output_types;
        self
    }

    /// Returns the registry identifier, `name_version`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }

    /// Returns the human-readable name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the version string.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the description.
    #[must_use]
    pub const fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Returns the reference URI.
    #[must_use]
    pub const fn uri(&self) -> &str {
        self.uri.as_str()
    }

    /// Returns the accepted input mime types.
    #[must_use]
    pub fn input_types(&self) -> &[String] {
        &self.input_types
    }

    /// Returns the produced output mime types.
    #[must_use]
    pub fn output_types(&self) -> &[String] {
        &self.output_types
    }
}
