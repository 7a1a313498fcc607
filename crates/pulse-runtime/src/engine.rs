//! Runtime engine that ties image storage to the container launcher.

use std::path::{Path, PathBuf};

use pulse_common::config::PulseConfig;
use pulse_common::error::{PulseError, Result};
use pulse_common::types::ImageRef;
use pulse_core::ownership::OwnershipReconciler;
use pulse_image::registry::ImageSummary;
use pulse_image::storage::ImageStore;

use crate::container::ContainerSpec;
use crate::launcher::Launcher;

/// The runtime engine that coordinates image and container operations.
///
/// Provides the high-level API used by the CLI: extracting stored OCI
/// layouts, running containers on an extracted rootfs, and managing the
/// local image directory.
#[derive(Debug)]
pub struct Engine {
    config: PulseConfig,
    store: ImageStore,
    launcher: Launcher,
    ownership: OwnershipReconciler,
}

impl Engine {
    /// Creates an engine for the current host with the given configuration.
    #[must_use]
    pub fn new(config: PulseConfig) -> Self {
        let launcher = Launcher::new(config.clone());
        Self::with_launcher(config, launcher, OwnershipReconciler::detect())
    }

    /// Creates an engine configured from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(PulseConfig::from_env())
    }

    /// Creates an engine around an explicit launcher.
    #[must_use]
    pub fn with_launcher(config: PulseConfig, launcher: Launcher, ownership: OwnershipReconciler) -> Self {
        let store = ImageStore::new(config.images_dir());
        Self {
            config,
            store,
            launcher,
            ownership,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Extracts `image` into its rootfs and returns the rootfs path.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is not stored locally or any layer
    /// fails to extract.
    pub fn extract(&self, image: &str) -> Result<PathBuf> {
        self.ensure_images_dir()?;
        self.store.extract(&ImageRef::new(image))
    }

    /// Runs `spec` to completion.
    ///
    /// # Errors
    ///
    /// See [`Launcher::run_container`].
    pub fn run_container(&self, spec: ContainerSpec) -> Result<()> {
        self.launcher.run_container(spec)
    }

    /// Extracts `image` if needed and runs `command` inside it.
    ///
    /// # Errors
    ///
    /// Returns extraction errors or the container's failure.
    pub fn run_image(
        &self,
        image: &str,
        command: Vec<String>,
        env: Vec<String>,
        network: bool,
        interactive: bool,
    ) -> Result<()> {
        let rootfs = self.extract(image)?;
        self.run_container(ContainerSpec {
            rootfs,
            command,
            env,
            network,
            interactive,
        })
    }

    /// Deletes the stored layout of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::NotFound`] if the image is not stored.
    pub fn remove_image(&self, image: &str) -> Result<String> {
        self.store.remove(&ImageRef::new(image))
    }

    /// Lists stored images.
    ///
    /// # Errors
    ///
    /// Returns an error if the images directory cannot be read.
    pub fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.store.list()
    }

    /// Returns the images directory.
    #[must_use]
    pub fn images_dir(&self) -> &Path {
        self.store.images_dir()
    }

    fn ensure_images_dir(&self) -> Result<()> {
        let dir = self.store.images_dir();
        if dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(dir).map_err(|e| PulseError::io(dir, e))?;
        self.ownership.claim_dir(dir);
        tracing::info!(path = %dir.display(), "created images directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pulse_core::network::NetworkProvisioner;
    use pulse_core::network::host::RecordingHost;

    use super::*;
    use crate::launcher::HostIdentity;

    fn engine(home: &Path) -> Engine {
        let config = PulseConfig::with_home(home);
        let launcher = Launcher::with_parts(
            config.clone(),
            HostIdentity { euid: 1000, uid: 1000, gid: 1000 },
            OwnershipReconciler::new(false, None),
            NetworkProvisioner::new(Arc::new(RecordingHost::new()), config.network.clone()),
        );
        Engine::with_launcher(config, launcher, OwnershipReconciler::new(false, None))
    }

    #[test]
    fn extract_creates_images_dir_before_lookup() {
        let home = tempfile::tempdir().expect("tempdir");
        let engine = engine(home.path());

        let err = engine.extract("alpine:3.20").expect_err("not stored");
        assert!(matches!(err, PulseError::NotFound { kind: "image", .. }));
        assert!(home.path().join("images").is_dir());
    }

    #[test]
    fn empty_home_lists_nothing() {
        let home = tempfile::tempdir().expect("tempdir");
        let engine = engine(&home.path().join("never-created"));
        assert!(engine.list_images().expect("list").is_empty());
        assert!(matches!(
            engine.remove_image("alpine"),
            Err(PulseError::NotFound { .. })
        ));
    }
}
