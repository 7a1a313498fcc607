//! Root filesystem change via `chroot(2)`.
//!
//! Runs inside the container's private mount namespace after all mounts are
//! in place.

use std::path::Path;

use pulse_common::error::{PulseError, Result};

/// Changes the root directory to `rootfs` and moves the working directory to
/// the new `/`.
///
/// # Errors
///
/// Returns [`PulseError::Mount`] if `chroot` or the directory change fails.
#[cfg(target_os = "linux")]
pub fn enter_root(rootfs: &Path) -> Result<()> {
    nix::unistd::chroot(rootfs).map_err(|e| PulseError::Mount {
        target: rootfs.to_path_buf(),
        message: format!("chroot: {e}"),
    })?;
    std::env::set_current_dir("/").map_err(|e| PulseError::Mount {
        target: rootfs.to_path_buf(),
        message: format!("chdir to new root: {e}"),
    })?;
    tracing::debug!(rootfs = %rootfs.display(), "entered container root");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: the root change requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_root(_rootfs: &Path) -> Result<()> {
    Err(PulseError::Config {
        message: "Linux required for native container operations".into(),
    })
}
