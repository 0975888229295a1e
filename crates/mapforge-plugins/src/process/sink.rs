//! Line-oriented destinations for subprocess output.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{Level, debug, error, info, trace, warn};

use super::PROCESS_TARGET;

/// Receives whole lines drained from a child process stream.
///
/// Lines are delivered without their trailing newline, in the order the
/// child wrote them. Sinks are moved onto a drain worker for the duration
/// of a call, hence the `Send` bound.
pub trait OutputSink: Send {
    /// Accepts one line of output.
    fn write_line(&mut self, line: &str);

    /// Accepts one line exactly as read from the pipe, terminator included.
    ///
    /// The default decodes the bytes lossily, strips the terminator and
    /// forwards to [`OutputSink::write_line`].
    fn write_bytes(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        self.write_line(line.trim_end_matches(['\n', '\r']));
    }
}

/// Collects lines in memory.
///
/// # Example
///
/// ```
/// use mapforge_plugins::process::{CapturedLines, OutputSink};
///
/// let mut sink = CapturedLines::default();
/// sink.write_line("hello");
/// assert_eq!(sink.lines(), ["hello"]);
/// assert_eq!(sink.joined(), "hello");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedLines {
    lines: Vec<String>,
}

impl CapturedLines {
    /// Returns the captured lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the captured lines joined with `\n`.
    #[must_use]
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns the last line that is not blank.
    #[must_use]
    pub fn last_non_empty(&self) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .map(String::as_str)
            .find(|line| !line.trim().is_empty())
    }

    /// Consumes the sink and returns the captured lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl OutputSink for CapturedLines {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

/// Forwards lines to `tracing` at a fixed level.
#[derive(Debug, Clone)]
pub struct TracingSink {
    label: String,
    level: Level,
}

impl TracingSink {
    /// Creates a sink that logs each line with the given label.
    #[must_use]
    pub fn new(label: impl Into<String>, level: Level) -> Self {
        Self {
            label: label.into(),
            level,
        }
    }
}

impl OutputSink for TracingSink {
    fn write_line(&mut self, line: &str) {
        let label = self.label.as_str();
        match self.level {
            Level::ERROR => error!(target: PROCESS_TARGET, stream = label, "{line}"),
            Level::WARN => warn!(target: PROCESS_TARGET, stream = label, "{line}"),
            Level::INFO => info!(target: PROCESS_TARGET, stream = label, "{line}"),
            Level::DEBUG => debug!(target: PROCESS_TARGET, stream = label, "{line}"),
            _ => trace!(target: PROCESS_TARGET, stream = label, "{line}"),
        }
    }
}

/// Stages output in a temporary sibling of the target file.
///
/// Raw bytes from the child are written verbatim. The target only appears,
/// or is replaced, when [`FileSink::commit`] succeeds; dropping the sink or
/// calling [`FileSink::discard`] removes the staged file. Write failures are
/// remembered rather than raised so the drain keeps consuming the pipe.
#[derive(Debug)]
pub struct FileSink {
    target: PathBuf,
    staged: BufWriter<NamedTempFile>,
    failure: Option<io::Error>,
}

impl FileSink {
    /// Creates the staging file next to `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while creating the staging file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let parent = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let staged = tempfile::Builder::new()
            .prefix(".mapforge-")
            .suffix(".partial")
            .tempfile_in(parent)?;
        Ok(Self {
            target: path.to_path_buf(),
            staged: BufWriter::new(staged),
            failure: None,
        })
    }

    /// Flushes the staged output and renames it over the target.
    ///
    /// # Errors
    ///
    /// Returns the first error seen while writing, flushing or renaming. The
    /// staged file is removed and the target is left untouched.
    pub fn commit(mut self) -> io::Result<()> {
        if let Some(error) = self.failure.take() {
            return Err(error);
        }
        let staged = self.staged.into_inner().map_err(io::IntoInnerError::into_error)?;
        staged
            .persist(&self.target)
            .map(drop)
            .map_err(|failure| failure.error)
    }

    /// Removes the staged file without touching the target.
    pub fn discard(self) {
        let Ok(staged) = self.staged.into_inner() else {
            return;
        };
        if let Err(error) = staged.close() {
            debug!(
                target: PROCESS_TARGET,
                target_file = %self.target.display(),
                %error,
                "failed to remove staged output"
            );
        }
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(error) = result {
            self.failure = Some(error);
        }
    }
}

impl OutputSink for FileSink {
    fn write_line(&mut self, line: &str) {
        if self.failure.is_none() {
            let result = writeln!(self.staged, "{line}");
            self.record(result);
        }
    }

    fn write_bytes(&mut self, raw: &[u8]) {
        if self.failure.is_none() {
            let result = self.staged.write_all(raw);
            self.record(result);
        }
    }
}

/// Discards every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_line(&mut self, _line: &str) {}
}
