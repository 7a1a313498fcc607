//! Local image listing and removal.

use chrono::{DateTime, Utc};
use pulse_common::constants;
use pulse_common::error::{PulseError, Result};
use pulse_common::types::ImageRef;
use serde::{Deserialize, Serialize};

use crate::storage::ImageStore;

/// One locally stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Layout directory name, e.g. `alpine_latest-oci`.
    pub name: String,
    /// Last modification time of the layout directory (RFC 3339).
    pub modified: String,
    /// Whether the rootfs has been fully extracted.
    pub extracted: bool,
}

impl ImageStore {
    /// Lists every `*-oci` layout in the store, sorted by name.
    ///
    /// A missing images directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the images directory cannot be read.
    pub fn list(&self) -> Result<Vec<ImageSummary>> {
        let dir = self.images_dir();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PulseError::io(dir, e)),
        };

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PulseError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(constants::IMAGE_DIR_SUFFIX) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let modified = meta
                .modified()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
                .unwrap_or_default();
            let extracted = entry
                .path()
                .join(constants::ROOTFS_DIR_NAME)
                .join(constants::EXTRACTION_MARKER)
                .exists();
            images.push(ImageSummary {
                name,
                modified,
                extracted,
            });
        }
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    /// Deletes the whole layout of `image`, rootfs included.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::NotFound`] if the image is not stored locally,
    /// or an I/O error if removal fails.
    pub fn remove(&self, image: &ImageRef) -> Result<String> {
        let dir = self.image_dir(image);
        if !dir.exists() {
            return Err(PulseError::NotFound {
                kind: "image",
                id: image.to_string(),
            });
        }
        std::fs::remove_dir_all(&dir).map_err(|e| PulseError::io(&dir, e))?;
        tracing::info!(image = %image, path = %dir.display(), "image removed");
        Ok(format!("Successfully removed image: {image}"))
    }
}
