//! Domain errors raised while discovering and preparing plugins.
//!
//! Request-time failures are reported as
//! [`ExecutionOutcome`](crate::ExecutionOutcome) values instead. The errors
//! here cover registry construction: unreadable plugin directories,
//! malformed manifests, instantiation problems and failed `setup()` calls.
//! I/O errors are held in `Arc` and provisioning failures in `Box`, so the
//! enum stays `Clone` and small.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::outcome::OutcomeKind;
use crate::runtime::ProvisionError;

/// Errors arising from plugin discovery, instantiation and setup.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// The plugin directory could not be enumerated.
    #[error("failed to read plugin directory '{}': {source}", path.display())]
    DirectoryRead {
        /// Directory that was scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A manifest archive could not be read or parsed.
    #[error("invalid plugin archive '{}': {message}", path.display())]
    Manifest {
        /// Archive path.
        path: PathBuf,
        /// Description of the parse or validation failure.
        message: String,
    },

    /// A plugin declared in a manifest could not be constructed.
    #[error("cannot instantiate plugin '{name}': {message}")]
    Instantiation {
        /// Plugin name as declared in the manifest.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// A plugin's `setup()` step failed.
    #[error("setup of plugin '{name}' failed: {message}")]
    Setup {
        /// Plugin identifier.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// Provisioning a managed runtime failed.
    #[error("provisioning of plugin '{name}' failed: {source}")]
    Provision {
        /// Plugin identifier.
        name: String,
        /// Failed provisioning step.
        #[source]
        source: Box<ProvisionError>,
    },

    /// A filesystem operation on behalf of a plugin failed.
    #[error("I/O error for plugin '{name}': {source}")]
    Io {
        /// Plugin identifier.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl PluginError {
    /// Classifies the error in the outcome vocabulary.
    ///
    /// Discovery and instantiation problems abort a registry load and are
    /// reported as [`OutcomeKind::UnknownError`]; permission problems map to
    /// [`OutcomeKind::InsufficientPrivileges`].
    #[must_use]
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Self::DirectoryRead { source, .. } | Self::Io { source, .. }
                if source.kind() == io::ErrorKind::PermissionDenied =>
            {
                OutcomeKind::InsufficientPrivileges
            }
            Self::Setup { .. } | Self::Provision { .. } => OutcomeKind::ExecutionError,
            Self::DirectoryRead { .. }
            | Self::Manifest { .. }
            | Self::Instantiation { .. }
            | Self::Io { .. } => OutcomeKind::UnknownError,
        }
    }
}
