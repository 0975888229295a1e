//! Bounded subprocess execution with concurrent output draining.
//!
//! [`ProcessRunner`] spawns one external command per call, drains the
//! child's stdout and stderr on two dedicated scoped threads and waits for
//! exit against a deadline. The drains write whole lines into caller-owned
//! [`OutputSink`]s as they arrive, so a child that floods one stream cannot
//! block on a full pipe while the other is being read.
//!
//! On Unix the child becomes the leader of a fresh process group. When the
//! deadline passes the whole group receives `SIGKILL`, the child is reaped and
//! both drains are joined before [`OutcomeKind::Timeout`] is returned; any
//! output produced before expiry remains in the sinks.
//!
//! [`OutcomeKind::Timeout`]: crate::OutcomeKind::Timeout

mod sink;

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::outcome::ExecutionOutcome;

pub use sink::{CapturedLines, FileSink, NullSink, OutputSink, TracingSink};

/// Tracing target for subprocess supervision.
pub(crate) const PROCESS_TARGET: &str = "mapforge_plugins::process";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Number of trailing stderr lines kept for failure details.
const STDERR_TAIL_LINES: usize = 50;

/// A single command to execute.
///
/// Invocations are built fresh for every call and are never pooled.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mapforge_plugins::process::ProcessInvocation;
///
/// let invocation = ProcessInvocation::new(["identify", "-verbose", "in.png"], Duration::from_secs(5))
///     .working_dir("/tmp");
/// assert_eq!(invocation.program_name(), "identify");
/// assert_eq!(invocation.timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    command: Vec<OsString>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    envs: Vec<(OsString, OsString)>,
}

impl ProcessInvocation {
    /// Creates an invocation from an argument vector and a time budget.
    ///
    /// The first element is the program; the rest are its arguments.
    #[must_use]
    pub fn new<I, S>(command: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            timeout,
            working_dir: None,
            stdin: None,
            envs: Vec::new(),
        }
    }

    /// Runs the child in `dir` instead of the caller's working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Writes `payload` to the child's stdin and then closes it.
    ///
    /// Without a payload the child's stdin is connected to the null device.
    #[must_use]
    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Adds an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns the full argument vector, program first.
    #[must_use]
    pub fn command(&self) -> &[OsString] {
        &self.command
    }

    /// Returns the program, or `None` for an empty command.
    #[must_use]
    pub fn program(&self) -> Option<&OsStr> {
        self.command.first().map(OsString::as_os_str)
    }

    /// Returns the program as a lossy string for diagnostics.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program()
            .map(|program| program.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns the time budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the configured working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Returns the stdin payload, if any.
    #[must_use]
    pub fn stdin_payload(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    fn build_command(&self, program: &OsStr, args: &[OsString]) -> Command {
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }
}

/// Runs external commands on behalf of plugins.
///
/// The trait is the seam between plugin logic and the operating system.
/// [`ProcessRunner`] is the production implementation; tests substitute
/// recording doubles to exercise provisioning without real interpreters.
pub trait CommandExecutor: Send + Sync {
    /// Executes `invocation`, streaming its output into the sinks.
    fn run(
        &self,
        invocation: &ProcessInvocation,
        stdout: &mut dyn OutputSink,
        stderr: &mut dyn OutputSink,
    ) -> ExecutionOutcome;
}

/// Executes commands as real child processes.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use mapforge_plugins::process::{CapturedLines, CommandExecutor, ProcessInvocation, ProcessRunner};
///
/// let mut stdout = CapturedLines::default();
/// let mut stderr = CapturedLines::default();
/// let invocation = ProcessInvocation::new(["echo", "hello"], Duration::from_secs(1));
/// let outcome = ProcessRunner::new().run(&invocation, &mut stdout, &mut stderr);
/// assert!(outcome.is_success());
/// assert_eq!(stdout.lines(), ["hello"]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CommandExecutor for ProcessRunner {
    fn run(
        &self,
        invocation: &ProcessInvocation,
        stdout: &mut dyn OutputSink,
        stderr: &mut dyn OutputSink,
    ) -> ExecutionOutcome {
        run_invocation(invocation, stdout, stderr)
    }
}

/// How supervision of a spawned child ended.
enum Completion {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(io::Error),
    Aborted(ExecutionOutcome),
}

fn run_invocation(
    invocation: &ProcessInvocation,
    stdout: &mut dyn OutputSink,
    stderr: &mut dyn OutputSink,
) -> ExecutionOutcome {
    let Some((program, args)) = invocation.command.split_first() else {
        return ExecutionOutcome::invalid_input().with_detail("command must not be empty");
    };
    if invocation.timeout.is_zero() {
        return ExecutionOutcome::invalid_input().with_detail("timeout must be greater than zero");
    }

    let program_name = invocation.program_name();
    debug!(
        target: PROCESS_TARGET,
        program = %program_name,
        args = args.len(),
        timeout_ms = millis(invocation.timeout),
        "spawning process"
    );

    let started = Instant::now();
    let mut child = match invocation.build_command(program, args).spawn() {
        Ok(child) => child,
        Err(error) => return spawn_failure(&program_name, &error),
    };
    let deadline = started + invocation.timeout;

    let mut stderr_tail = TailingSink::new(stderr, STDERR_TAIL_LINES);
    let completion = supervise(&mut child, invocation, deadline, stdout, &mut stderr_tail);
    let outcome = classify(invocation, completion, &stderr_tail);

    debug!(
        target: PROCESS_TARGET,
        program = %program_name,
        elapsed_ms = millis(started.elapsed()),
        outcome = %outcome.kind(),
        "process finished"
    );
    outcome
}

/// Drains both streams, feeds stdin and waits for exit within `deadline`.
fn supervise(
    child: &mut Child,
    invocation: &ProcessInvocation,
    deadline: Instant,
    stdout_sink: &mut dyn OutputSink,
    stderr_sink: &mut TailingSink<'_>,
) -> Completion {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdin_pipe = child.stdin.take();

    thread::scope(|scope| {
        let stdout_drain = stdout_pipe.map(|pipe| scope.spawn(move || drain(pipe, stdout_sink)));
        let stderr_drain = stderr_pipe.map(|pipe| scope.spawn(move || drain(pipe, stderr_sink)));
        // A child that never reads stdin must not hold the caller past the deadline.
        let stdin_feed = stdin_pipe
            .zip(invocation.stdin_payload())
            .map(|(pipe, payload)| scope.spawn(move || feed_stdin(pipe, payload)));

        let mut completion = wait_for_exit(child, deadline);
        // A grandchild may keep the pipes open after the child has exited.
        if matches!(completion, Completion::Exited(_))
            && !wait_for_drains(&[&stdout_drain, &stderr_drain, &stdin_feed], deadline)
        {
            completion = Completion::TimedOut;
        }
        if !matches!(completion, Completion::Exited(_)) {
            terminate(child);
        }

        match stdin_feed.map(ScopedJoinHandle::join) {
            Some(Ok(Err(error))) => debug!(
                target: PROCESS_TARGET,
                %error,
                "child closed stdin before consuming the payload"
            ),
            Some(Err(_)) => warn!(target: PROCESS_TARGET, "stdin writer panicked"),
            Some(Ok(Ok(()))) | None => {}
        }
        let joined =
            join_drain(stdout_drain, "stdout").and_then(|()| join_drain(stderr_drain, "stderr"));
        match (completion, joined) {
            (Completion::Exited(_), Err(outcome)) => Completion::Aborted(outcome),
            (other, _) => other,
        }
    })
}

/// Writes the payload and closes the pipe. A killed child breaks the pipe,
/// which ends a write that would otherwise block.
fn feed_stdin(mut pipe: ChildStdin, payload: &[u8]) -> io::Result<()> {
    pipe.write_all(payload)?;
    pipe.flush()
}

fn wait_for_exit(child: &mut Child, deadline: Instant) -> Completion {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Completion::Exited(status),
            Ok(None) if Instant::now() >= deadline => return Completion::TimedOut,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(error) => return Completion::WaitFailed(error),
        }
    }
}

type Drain<'scope> = Option<ScopedJoinHandle<'scope, io::Result<()>>>;

fn wait_for_drains(drains: &[&Drain<'_>], deadline: Instant) -> bool {
    loop {
        let finished = drains
            .iter()
            .all(|drain| drain.as_ref().is_none_or(ScopedJoinHandle::is_finished));
        if finished {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn join_drain(drain: Drain<'_>, stream: &str) -> Result<(), ExecutionOutcome> {
    let Some(handle) = drain else {
        return Ok(());
    };
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(ExecutionOutcome::execution_error()
            .with_detail(format!("failed to read child {stream}: {error}"))),
        Err(_) => {
            Err(ExecutionOutcome::unknown_error().with_detail(format!("{stream} drain panicked")))
        }
    }
}

/// Reads `pipe` to EOF, forwarding each raw line to the sink.
fn drain(pipe: impl Read, sink: &mut dyn OutputSink) -> io::Result<()> {
    let mut reader = BufReader::new(pipe);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(());
        }
        sink.write_bytes(&buffer);
    }
}

/// Kills the child and, on Unix, every process in its group, then reaps it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    kill_process_group(child.id());
    if let Err(error) = child.kill() {
        debug!(target: PROCESS_TARGET, %error, "kill after timeout failed");
    }
    if let Err(error) = child.wait() {
        warn!(target: PROCESS_TARGET, %error, "failed to reap terminated child");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(error) => warn!(
            target: PROCESS_TARGET,
            pid,
            %error,
            "failed to signal process group"
        ),
    }
}

fn spawn_failure(program: &str, error: &io::Error) -> ExecutionOutcome {
    let detail = format!("failed to spawn '{program}': {error}");
    warn!(target: PROCESS_TARGET, program, %error, "spawn failed");
    if error.kind() == io::ErrorKind::PermissionDenied {
        ExecutionOutcome::insufficient_privileges().with_detail(detail)
    } else {
        ExecutionOutcome::execution_error().with_detail(detail)
    }
}

fn classify(
    invocation: &ProcessInvocation,
    completion: Completion,
    stderr: &TailingSink<'_>,
) -> ExecutionOutcome {
    match completion {
        Completion::Exited(status) if status.success() => ExecutionOutcome::success(),
        Completion::Exited(status) => {
            ExecutionOutcome::execution_error().with_detail(exit_detail(status, &stderr.tail()))
        }
        Completion::TimedOut => {
            let timeout_ms = millis(invocation.timeout);
            warn!(
                target: PROCESS_TARGET,
                program = %invocation.program_name(),
                timeout_ms,
                "process exceeded its timeout and was killed"
            );
            ExecutionOutcome::timeout().with_detail(format!(
                "'{}' exceeded the {timeout_ms} ms timeout",
                invocation.program_name()
            ))
        }
        Completion::WaitFailed(error) => ExecutionOutcome::unknown_error().with_detail(format!(
            "failed to wait for '{}': {error}",
            invocation.program_name()
        )),
        Completion::Aborted(outcome) => outcome,
    }
}

fn exit_detail(status: ExitStatus, stderr: &str) -> String {
    let reason = status.code().map_or_else(
        || signal_description(status),
        |code| format!("exited with status {code}"),
    );
    if stderr.is_empty() {
        reason
    } else {
        format!("{reason}\n{stderr}")
    }
}

#[cfg(unix)]
fn signal_description(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or_else(
        || String::from("terminated without an exit code"),
        |signal| format!("terminated by signal {signal}"),
    )
}

#[cfg(not(unix))]
fn signal_description(_status: ExitStatus) -> String {
    String::from("terminated without an exit code")
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Forwards lines to an inner sink while remembering the most recent ones.
struct TailingSink<'a> {
    inner: &'a mut dyn OutputSink,
    tail: VecDeque<String>,
    limit: usize,
}

impl<'a> TailingSink<'a> {
    fn new(inner: &'a mut dyn OutputSink, limit: usize) -> Self {
        Self {
            inner,
            tail: VecDeque::with_capacity(limit),
            limit,
        }
    }

    fn tail(&self) -> String {
        self.tail
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn remember(&mut self, line: &str) {
        if self.tail.len() == self.limit {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_owned());
    }
}

impl OutputSink for TailingSink<'_> {
    fn write_line(&mut self, line: &str) {
        self.inner.write_line(line);
        self.remember(line);
    }

    fn write_bytes(&mut self, raw: &[u8]) {
        self.inner.write_bytes(raw);
        let line = String::from_utf8_lossy(raw);
        self.remember(line.trim_end_matches(['\n', '\r']));
    }
}
