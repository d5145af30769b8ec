//! Entry point of the `easel` plug-in host tool.
//!
//! The binary delegates to [`easel_cli::run`], which loads configuration,
//! installs telemetry and executes the requested command.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    easel_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
