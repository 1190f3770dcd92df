//! CLI entrypoint for the conductor CI event dispatcher.
//!
//! The binary delegates to [`conductor_cli::run`], which parses arguments,
//! loads the handler document, and dispatches the current CI event.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    conductor_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
