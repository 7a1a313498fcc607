//! # pulse: minimal Linux container runtime
//!
//! Runs commands from locally stored OCI images inside fresh namespaces.
//! The same binary is re-executed as `pulse child <cmd...>` to act as the
//! container's entry process.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use pulse_common::constants;
use pulse_common::error::PulseError;

use crate::commands::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some(constants::CHILD_MARKER) {
        return run_child(&args[2..]);
    }

    let cli = Cli::parse();
    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn run_child(args: &[String]) -> ExitCode {
    match pulse_runtime::child::run_child(args) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!("Container error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Prints `error` and picks the exit code, passing a container's own status
/// through unchanged.
fn report(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<PulseError>() {
        Some(PulseError::ContainerExit { code }) => {
            tracing::debug!(code, "container exited with non-zero status");
            ExitCode::from(u8::try_from(*code).unwrap_or(1))
        }
        _ => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
