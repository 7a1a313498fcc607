//! `pulse rmi`: Remove a stored image.

use clap::Args;
use pulse_runtime::engine::Engine;

/// Arguments for the `rmi` command.
#[derive(Args, Debug)]
pub struct RmiArgs {
    /// Image reference to remove.
    pub image: String,
}

/// Executes the `rmi` command.
///
/// # Errors
///
/// Returns an error if the image is not stored or cannot be deleted.
pub fn execute(engine: &Engine, args: &RmiArgs) -> anyhow::Result<()> {
    let message = engine.remove_image(&args.image)?;
    println!("{message}");
    Ok(())
}
