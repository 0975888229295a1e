//! JSONL protocol spoken by out-of-process plugins.
//!
//! The host writes one [`MappingRequest`] line to the plugin's stdin and
//! closes it. The plugin performs the mapping and writes one response line
//! to stdout: an [`ExecutionOutcome`] serialised as
//! `{"outcome": "...", "detail": "..."}`. When a plugin prints progress
//! before its response, the last non-empty stdout line is the response.
//! Stderr is captured for diagnostics and is not part of the protocol.
//!
//! Plugin authors can use [`serve`] to implement the plugin side.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outcome::ExecutionOutcome;

/// Request sent from the host to a plugin on stdin.
///
/// # Example
///
/// ```
/// use mapforge_plugins::protocol::MappingRequest;
///
/// let request = MappingRequest::new("schema.json", "in.xml", "out.json");
/// let line = request.to_line().expect("serialise");
/// assert!(line.ends_with('\n'));
/// assert!(line.contains("\"input_file\":\"in.xml\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRequest {
    mapping_file: PathBuf,
    input_file: PathBuf,
    output_file: PathBuf,
}

impl MappingRequest {
    /// Creates a request for one mapping.
    #[must_use]
    pub fn new(
        mapping_file: impl Into<PathBuf>,
        input_file: impl Into<PathBuf>,
        output_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mapping_file: mapping_file.into(),
            input_file: input_file.into(),
            output_file: output_file.into(),
        }
    }

    /// Returns the mapping file path.
    #[must_use]
    pub fn mapping_file(&self) -> &Path {
        &self.mapping_file
    }

    /// Returns the input file path.
    #[must_use]
    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    /// Returns the output file path.
    #[must_use]
    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Serialises the request as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Serialize`] if serialisation fails.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut line =
            serde_json::to_string(self).map_err(|source| ProtocolError::Serialize { source })?;
        line.push('\n');
        Ok(line)
    }
}

/// Errors raised while exchanging protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading the request failed.
    #[error("failed to read request: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Stdin closed before a request line arrived.
    #[error("no request received")]
    EmptyRequest,
    /// The request or response line was not valid JSON for its type.
    #[error("malformed message: {source}")]
    Parse {
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The plugin printed nothing that could be a response.
    #[error("plugin produced no response on stdout")]
    MissingResponse,
    /// Serialising a message failed.
    #[error("failed to serialise message: {source}")]
    Serialize {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the response failed.
    #[error("failed to write response: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Parses the response from a plugin's captured stdout lines.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingResponse`] when no line is present and
/// [`ProtocolError::Parse`] when the line is not a valid outcome.
pub fn parse_response(line: Option<&str>) -> Result<ExecutionOutcome, ProtocolError> {
    let text = line
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .ok_or(ProtocolError::MissingResponse)?;
    serde_json::from_str(text).map_err(|source| ProtocolError::Parse { source })
}

/// Reads one request line.
///
/// # Errors
///
/// Returns [`ProtocolError::Read`], [`ProtocolError::EmptyRequest`] or
/// [`ProtocolError::Parse`].
pub fn read_request(mut reader: impl BufRead) -> Result<MappingRequest, ProtocolError> {
    let mut line = String::new();
    let bytes = reader
        .read_line(&mut line)
        .map_err(|source| ProtocolError::Read { source })?;
    if bytes == 0 || line.trim().is_empty() {
        return Err(ProtocolError::EmptyRequest);
    }
    serde_json::from_str(line.trim()).map_err(|source| ProtocolError::Parse { source })
}

/// Writes one response line and flushes.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] or [`ProtocolError::Write`].
pub fn write_response(
    mut writer: impl Write,
    outcome: &ExecutionOutcome,
) -> Result<(), ProtocolError> {
    let json = serde_json::to_string(outcome).map_err(|source| ProtocolError::Serialize { source })?;
    writeln!(writer, "{json}").map_err(|source| ProtocolError::Write { source })?;
    writer
        .flush()
        .map_err(|source| ProtocolError::Write { source })
}

/// Serves a single request: reads it, calls `handler` and writes the
/// response.
///
/// A missing or malformed request is answered with an `invalid_input`
/// outcome instead of calling the handler.
///
/// # Errors
///
/// Returns an error only when the response cannot be written.
///
/// # Example
///
/// ```
/// use mapforge_plugins::ExecutionOutcome;
/// use mapforge_plugins::protocol::serve;
///
/// let input = br#"{"mapping_file":"m","input_file":"i","output_file":"o"}"#;
/// let mut output = Vec::new();
/// let outcome = serve(&input[..], &mut output, |_| ExecutionOutcome::success())
///     .expect("response written");
/// assert!(outcome.is_success());
/// assert_eq!(String::from_utf8(output).expect("utf8"), "{\"outcome\":\"success\"}\n");
/// ```
pub fn serve<R, W, F>(reader: R, writer: W, handler: F) -> Result<ExecutionOutcome, ProtocolError>
where
    R: BufRead,
    W: Write,
    F: FnOnce(&MappingRequest) -> ExecutionOutcome,
{
    let outcome = match read_request(reader) {
        Ok(request) => handler(&request),
        Err(error) => ExecutionOutcome::invalid_input().with_detail(error.to_string()),
    };
    write_response(writer, &outcome)?;
    Ok(outcome)
}
