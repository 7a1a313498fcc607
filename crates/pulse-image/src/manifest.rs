//! OCI image index and manifest parsing.

use std::path::{Path, PathBuf};

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};
use serde::{Deserialize, Serialize};

use crate::hash;

/// Reference to a content-addressed blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced blob.
    #[serde(default)]
    pub media_type: String,
    /// `sha256:<hex>` digest of the blob.
    pub digest: String,
    /// Size of the blob in bytes.
    #[serde(default)]
    pub size: u64,
}

/// The `index.json` at the root of an OCI layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciIndex {
    /// Manifests available in the layout.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl OciIndex {
    /// Reads `index.json` from `image_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidImage`] if the file is missing or is not
    /// a valid index.
    pub fn load(image_dir: &Path) -> Result<Self> {
        let path = image_dir.join(constants::OCI_INDEX_FILE);
        let data = std::fs::read(&path).map_err(|e| PulseError::InvalidImage {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        serde_json::from_slice(&data).map_err(|e| PulseError::InvalidImage {
            message: format!("invalid index.json: {e}"),
        })
    }

    /// Returns the first manifest descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidImage`] if the index lists no manifests.
    pub fn first_manifest(&self) -> Result<&Descriptor> {
        self.manifests.first().ok_or_else(|| PulseError::InvalidImage {
            message: "no manifest found in index.json".into(),
        })
    }
}

/// An OCI image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciManifest {
    /// Layers, bottom first.
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl OciManifest {
    /// Reads and verifies the manifest blob referenced by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an image error if the blob is missing, fails its digest, is
    /// not a valid manifest, or lists more layers than allowed.
    pub fn load(image_dir: &Path, descriptor: &Descriptor) -> Result<Self> {
        let path = verified_blob(image_dir, &descriptor.digest)?;
        let data = std::fs::read(&path).map_err(|e| PulseError::io(&path, e))?;
        let manifest: Self = serde_json::from_slice(&data).map_err(|e| PulseError::InvalidImage {
            message: format!("invalid manifest JSON: {e}"),
        })?;
        if manifest.layers.len() > constants::MAX_IMAGE_LAYERS {
            return Err(PulseError::InvalidImage {
                message: format!(
                    "manifest lists {} layers, limit is {}",
                    manifest.layers.len(),
                    constants::MAX_IMAGE_LAYERS
                ),
            });
        }
        Ok(manifest)
    }
}

/// Returns the path of the blob named by `digest` inside `image_dir`.
///
/// # Errors
///
/// Returns [`PulseError::InvalidImage`] if the digest is malformed.
pub fn blob_path(image_dir: &Path, digest: &str) -> Result<PathBuf> {
    let hex = hash::digest_hex(digest)?;
    Ok(image_dir.join(constants::OCI_BLOBS_SHA256).join(hex))
}

/// Returns the path of a blob after checking it exists and matches its
/// digest.
///
/// # Errors
///
/// Returns an image error if the blob is missing or its content does not
/// hash to `digest`.
pub fn verified_blob(image_dir: &Path, digest: &str) -> Result<PathBuf> {
    let path = blob_path(image_dir, digest)?;
    if !path.is_file() {
        return Err(PulseError::InvalidImage {
            message: format!("missing blob {digest}"),
        });
    }
    hash::validate_hash(&path, hash::digest_hex(digest)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_parses_manifest_digests() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("index.json"),
            r#"{"schemaVersion":2,"manifests":[{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:aa","size":7}]}"#,
        )
        .expect("write");
        let index = OciIndex::load(dir.path()).expect("load");
        let first = index.first_manifest().expect("manifest");
        assert_eq!(first.digest, "sha256:aa");
        assert_eq!(first.size, 7);
    }

    #[test]
    fn missing_or_empty_index_is_an_image_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            OciIndex::load(dir.path()),
            Err(PulseError::InvalidImage { .. })
        ));

        std::fs::write(dir.path().join("index.json"), r#"{"manifests":[]}"#).expect("write");
        let index = OciIndex::load(dir.path()).expect("load");
        assert!(index.first_manifest().is_err());
    }

    #[test]
    fn missing_blob_is_reported_by_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let digest = format!("sha256:{}", "a".repeat(64));
        let err = verified_blob(dir.path(), &digest).expect_err("missing");
        assert!(err.to_string().contains(&digest));
    }
}
