//! On-disk image layouts and idempotent rootfs extraction.
//!
//! Each image lives in `<images>/<sanitized-ref>-oci/`. Its extracted root
//! filesystem is `rootfs/`, and `rootfs/.extraction_complete` is written only
//! after every layer has been applied. A rootfs without the marker is
//! treated as garbage and rebuilt from scratch.

use std::path::{Path, PathBuf};

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};
use pulse_common::types::ImageRef;

use crate::layer::LayerApplier;
use crate::manifest::{self, OciIndex, OciManifest};

/// Local store of OCI image layouts.
#[derive(Debug, Clone)]
pub struct ImageStore {
    images_dir: PathBuf,
}

impl ImageStore {
    /// Opens the store rooted at `images_dir`.
    #[must_use]
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
        }
    }

    /// Returns the directory holding all image layouts.
    #[must_use]
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Returns the OCI layout directory of `image`.
    #[must_use]
    pub fn image_dir(&self, image: &ImageRef) -> PathBuf {
        self.images_dir.join(image.dir_name())
    }

    /// Returns the rootfs directory of `image`.
    #[must_use]
    pub fn rootfs_dir(&self, image: &ImageRef) -> PathBuf {
        self.image_dir(image).join(constants::ROOTFS_DIR_NAME)
    }

    /// Returns whether `image` has a complete extracted rootfs.
    #[must_use]
    pub fn is_extracted(&self, image: &ImageRef) -> bool {
        self.rootfs_dir(image)
            .join(constants::EXTRACTION_MARKER)
            .exists()
    }

    /// Extracts `image` into its rootfs and returns the rootfs path.
    ///
    /// Returns immediately if the completion marker is present. Otherwise
    /// any partial rootfs is deleted and every layer is re-applied. On
    /// failure the partial rootfs is removed again.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::NotFound`] if the image is not stored locally,
    /// or an image/I/O error if extraction fails.
    pub fn extract(&self, image: &ImageRef) -> Result<PathBuf> {
        let image_dir = self.image_dir(image);
        let rootfs = self.rootfs_dir(image);

        if self.is_extracted(image) {
            tracing::info!(image = %image, rootfs = %rootfs.display(), "image already extracted");
            return Ok(rootfs);
        }
        if !image_dir.is_dir() {
            return Err(PulseError::NotFound {
                kind: "image",
                id: image.to_string(),
            });
        }

        remove_partial(&rootfs)?;
        tracing::info!(image = %image, rootfs = %rootfs.display(), "extracting image");

        match populate(&image_dir, &rootfs) {
            Ok(layers) => {
                tracing::info!(image = %image, layers, "extraction complete");
                Ok(rootfs)
            }
            Err(e) => {
                if let Err(cleanup) = remove_partial(&rootfs) {
                    tracing::warn!(rootfs = %rootfs.display(), error = %cleanup, "failed to remove partial rootfs");
                }
                Err(e)
            }
        }
    }
}

fn populate(image_dir: &Path, rootfs: &Path) -> Result<usize> {
    let index = OciIndex::load(image_dir)?;
    let manifest = OciManifest::load(image_dir, index.first_manifest()?)?;

    let mut applier = LayerApplier::new(rootfs)?;
    for (i, layer) in manifest.layers.iter().enumerate() {
        let blob = manifest::verified_blob(image_dir, &layer.digest)?;
        tracing::debug!(
            layer = i + 1,
            total = manifest.layers.len(),
            digest = %layer.digest,
            "applying layer"
        );
        let _ = applier.apply(&blob)?;
    }
    let layers = applier.finish()?;

    let marker = rootfs.join(constants::EXTRACTION_MARKER);
    let _ = std::fs::File::create(&marker).map_err(|e| PulseError::io(&marker, e))?;
    Ok(layers)
}

fn remove_partial(rootfs: &Path) -> Result<()> {
    match std::fs::remove_dir_all(rootfs) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PulseError::io(rootfs, e)),
    }
}
