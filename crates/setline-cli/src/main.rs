//! Entry point for the `setline` configuration tool.
//!
//! The binary delegates to [`setline_cli::run`], which loads configuration,
//! parses the subcommand and drives one device operation.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    setline_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
