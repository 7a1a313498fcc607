//! `pulse images`: List the local image store.

use clap::Args;
use pulse_runtime::engine::Engine;

use crate::output;

/// Arguments for the `images` command.
#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Print only layout directory names.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `images` command.
///
/// # Errors
///
/// Returns an error if the images directory cannot be read.
pub fn execute(engine: &Engine, args: &ImagesArgs) -> anyhow::Result<()> {
    tracing::debug!(dir = %engine.images_dir().display(), "listing images");
    let images = engine.list_images()?;
    if args.quiet {
        for image in &images {
            println!("{}", image.name);
        }
    } else {
        print!("{}", output::image_table(&images));
    }
    Ok(())
}
