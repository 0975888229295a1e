//! Operator entrypoint for the mapforge plugin host.
//!
//! All work is delegated to [`mapforge::run`] so the runtime can be driven
//! from tests with substitute streams.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    mapforge::run(std::env::args_os(), &mut stdout, &mut stderr)
}
