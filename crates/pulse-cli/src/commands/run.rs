//! `pulse run`: Run a command inside a stored image.

use clap::Args;
use pulse_runtime::engine::Engine;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference, e.g. `alpine:3.20`.
    pub image: String,

    /// Command and arguments; defaults to a shell found in the image.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Extra environment variable as `KEY=VALUE`.
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<String>,

    /// Connect the container to the host bridge (requires root).
    #[arg(short, long)]
    pub network: bool,

    /// Attach stdin to the container.
    #[arg(short, long)]
    pub interactive: bool,
}

fn parse_env(value: &str) -> Result<String, String> {
    match value.split_once('=') {
        Some((key, _)) if !key.is_empty() => Ok(value.to_string()),
        _ => Err(format!("expected KEY=VALUE, got `{value}`")),
    }
}

/// Executes the `run` command.
///
/// Ctrl+C reaches the container through the terminal's process group. The
/// engine ignores it and keeps waiting so ownership is restored after exit.
///
/// # Errors
///
/// Returns an error if the image cannot be extracted, the container cannot
/// be started, or it exits unsuccessfully.
pub fn execute(engine: &Engine, args: RunArgs) -> anyhow::Result<()> {
    ctrlc::set_handler(|| tracing::debug!("interrupt forwarded to container"))
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    tracing::info!(image = %args.image, network = args.network, "run");
    engine.run_image(
        &args.image,
        args.command,
        args.env,
        args.network,
        args.interactive,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Command};

    fn parse(args: &[&str]) -> RunArgs {
        match Cli::try_parse_from(args).expect("parse").command {
            Command::Run(run) => run,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn command_keeps_its_own_flags() {
        let run = parse(&["pulse", "run", "-n", "-e", "A=1", "alpine", "ls", "-la", "/"]);
        assert_eq!(run.image, "alpine");
        assert_eq!(run.command, vec!["ls", "-la", "/"]);
        assert_eq!(run.env, vec!["A=1"]);
        assert!(run.network);
        assert!(!run.interactive);
    }

    #[test]
    fn empty_command_is_allowed() {
        let run = parse(&["pulse", "run", "-i", "alpine"]);
        assert!(run.command.is_empty());
        assert!(run.interactive);
    }

    #[test]
    fn malformed_env_is_rejected() {
        assert!(Cli::try_parse_from(["pulse", "run", "-e", "NOVALUE", "alpine"]).is_err());
        assert!(Cli::try_parse_from(["pulse", "run", "-e", "=x", "alpine"]).is_err());
    }
}
