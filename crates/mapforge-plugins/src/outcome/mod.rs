//! Closed-set result values for mapping executions.
//!
//! Every transformation attempt produces an [`ExecutionOutcome`]: one of
//! seven [`OutcomeKind`] values plus an optional free-text detail. Outcomes
//! are plain data returned from calls, never error payloads, so callers
//! branch on the kind rather than on an error type.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Classification of a mapping attempt.
///
/// # Example
///
/// ```
/// use mapforge_plugins::OutcomeKind;
///
/// assert_eq!(OutcomeKind::Timeout.status_code(), 504);
/// assert_eq!(OutcomeKind::Timeout.to_string(), "timeout");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeKind {
    /// The mapping completed and the output file was written.
    Success,
    /// The requested plugin does not exist.
    NotFound,
    /// The external process exceeded its budget.
    Timeout,
    /// The external tool ran but failed, or driving it failed.
    ExecutionError,
    /// The caller supplied malformed arguments.
    InvalidInput,
    /// The operating system denied access.
    InsufficientPrivileges,
    /// Any failure that could not be classified.
    UnknownError,
}

impl OutcomeKind {
    /// Returns the caller-facing HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::NotFound => 404,
            Self::Timeout => 504,
            Self::InvalidInput => 400,
            Self::ExecutionError | Self::InsufficientPrivileges | Self::UnknownError => 500,
        }
    }
}

/// Result value of a single mapping or subprocess invocation.
///
/// # Example
///
/// ```
/// use mapforge_plugins::{ExecutionOutcome, OutcomeKind};
///
/// let outcome = ExecutionOutcome::execution_error().with_detail("exit status 2");
/// assert_eq!(outcome.kind(), OutcomeKind::ExecutionError);
/// assert_eq!(outcome.detail(), Some("exit status 2"));
/// assert!(!outcome.is_success());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(rename = "outcome")]
    kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ExecutionOutcome {
    /// Creates an outcome of the given kind without detail.
    #[must_use]
    pub const fn new(kind: OutcomeKind) -> Self {
        Self { kind, detail: None }
    }

    /// A successful outcome.
    #[must_use]
    pub const fn success() -> Self {
        Self::new(OutcomeKind::Success)
    }

    /// The plugin could not be resolved.
    #[must_use]
    pub const fn not_found() -> Self {
        Self::new(OutcomeKind::NotFound)
    }

    /// The process exceeded its budget.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(OutcomeKind::Timeout)
    }

    /// The external tool failed.
    #[must_use]
    pub const fn execution_error() -> Self {
        Self::new(OutcomeKind::ExecutionError)
    }

    /// The caller supplied malformed arguments.
    #[must_use]
    pub const fn invalid_input() -> Self {
        Self::new(OutcomeKind::InvalidInput)
    }

    /// The operating system refused access.
    #[must_use]
    pub const fn insufficient_privileges() -> Self {
        Self::new(OutcomeKind::InsufficientPrivileges)
    }

    /// Catch-all for unclassified failures.
    #[must_use]
    pub const fn unknown_error() -> Self {
        Self::new(OutcomeKind::UnknownError)
    }

    /// Attaches a detail message, replacing any previous one.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns the outcome kind.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        self.kind
    }

    /// Returns the detail message, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns `true` for [`OutcomeKind::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success)
    }

    /// Returns the caller-facing HTTP status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail.as_deref() {
            Some(detail) => write!(f, "{}: {detail}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl From<OutcomeKind> for ExecutionOutcome {
    fn from(kind: OutcomeKind) -> Self {
        Self::new(kind)
    }
}
