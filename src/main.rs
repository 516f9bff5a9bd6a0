//! Binary entrypoint for the terminal chat client.

use std::process::ExitCode;

use threadline::start_threadline;

fn main() -> ExitCode {
    start_threadline::run()
}
