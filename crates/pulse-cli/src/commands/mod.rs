//! CLI command definitions and dispatch.

pub mod images;
pub mod rmi;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pulse_common::config::PulseConfig;
use pulse_common::constants;
use pulse_runtime::engine::Engine;

/// Pulse: a minimal daemon-less Linux container runtime.
#[derive(Parser, Debug)]
#[command(name = "pulse", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Pulse home directory holding the image store.
    #[arg(long, global = true, env = constants::ENV_HOME_OVERRIDE)]
    pub home: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command in a container built from a stored image.
    Run(run::RunArgs),
    /// List stored images.
    Images(images::ImagesArgs),
    /// Remove a stored image.
    Rmi(rmi::RmiArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.home.map_or_else(PulseConfig::from_env, PulseConfig::with_home);
    let engine = Engine::new(config);
    match cli.command {
        Command::Run(args) => run::execute(&engine, args),
        Command::Images(args) => images::execute(&engine, &args),
        Command::Rmi(args) => rmi::execute(&engine, &args),
    }
}
