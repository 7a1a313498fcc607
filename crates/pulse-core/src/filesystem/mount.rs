//! Mount utilities for container filesystem setup.
//!
//! Handles mounting `/proc`, `/sys`, `/tmp`, the device allow-list and a
//! private `devpts` inside the container's mount namespace, before the root
//! change.

use std::path::{Path, PathBuf};

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};

/// A pseudo-filesystem mounted into the rootfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoMount {
    /// Filesystem source name passed to `mount(2)`.
    pub source: &'static str,
    /// Filesystem type.
    pub fstype: &'static str,
    /// Mount point inside the rootfs.
    pub target: PathBuf,
}

/// Returns the mandatory pseudo-filesystems in mount order.
#[must_use]
pub fn essential_mounts(rootfs: &Path) -> [PseudoMount; 3] {
    [
        PseudoMount {
            source: "proc",
            fstype: "proc",
            target: rootfs.join("proc"),
        },
        PseudoMount {
            source: "sysfs",
            fstype: "sysfs",
            target: rootfs.join("sys"),
        },
        PseudoMount {
            source: "tmpfs",
            fstype: "tmpfs",
            target: rootfs.join("tmp"),
        },
    ]
}

/// Returns `(host device, placeholder)` pairs for allow-listed devices that
/// exist on the host.
#[must_use]
pub fn device_binds(rootfs: &Path, host_dev: &Path) -> Vec<(PathBuf, PathBuf)> {
    constants::DEVICE_ALLOWLIST
        .iter()
        .map(|name| (host_dev.join(name), rootfs.join("dev").join(name)))
        .filter(|(host, _)| host.exists())
        .collect()
}

/// Prepares every mount the container needs under `rootfs`.
///
/// `proc`, `sysfs` and `tmpfs` are mandatory. Device binds and `devpts` are
/// best-effort and only logged on failure.
///
/// # Errors
///
/// Returns [`PulseError::Mount`] if a mandatory mount or its mount point
/// cannot be created.
#[cfg(target_os = "linux")]
pub fn setup_mounts(rootfs: &Path) -> Result<()> {
    make_mounts_private();

    for spec in essential_mounts(rootfs) {
        create_mount_point(&spec.target)?;
        mount_fs(spec.source, &spec.target, spec.fstype, None)?;
        tracing::debug!(target = %spec.target.display(), fstype = spec.fstype, "mounted");
    }

    let dev = rootfs.join("dev");
    create_mount_point(&dev)?;
    for (host, placeholder) in device_binds(rootfs, Path::new("/dev")) {
        if let Err(e) = bind_device(&host, &placeholder) {
            tracing::debug!(device = %host.display(), error = %e, "device bind skipped");
        }
    }

    let pts = dev.join("pts");
    if std::fs::create_dir_all(&pts).is_ok() {
        if let Err(e) = mount_fs("devpts", &pts, "devpts", Some(constants::DEVPTS_OPTIONS)) {
            tracing::warn!(error = %e, "failed to mount /dev/pts");
        }
    }

    tracing::info!(rootfs = %rootfs.display(), "container mounts ready");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: container mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn setup_mounts(_rootfs: &Path) -> Result<()> {
    Err(PulseError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Marks every mount in the new namespace private so container mounts never
/// propagate back to the host.
#[cfg(target_os = "linux")]
fn make_mounts_private() {
    use nix::mount::{MsFlags, mount};

    if let Err(e) = mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    ) {
        tracing::warn!(error = %e, "could not make mounts private");
    }
}

#[cfg(target_os = "linux")]
fn mount_fs(source: &str, target: &Path, fstype: &str, data: Option<&str>) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(Some(source), target, Some(fstype), MsFlags::empty(), data).map_err(|e| {
        PulseError::Mount {
            target: target.to_path_buf(),
            message: format!("{fstype}: {e}"),
        }
    })
}

/// Creates an empty placeholder at `placeholder` and bind-mounts `host` onto it.
///
/// # Errors
///
/// Returns an error if the placeholder cannot be created or the bind fails.
#[cfg(target_os = "linux")]
pub fn bind_device(host: &Path, placeholder: &Path) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    use nix::mount::{MsFlags, mount};

    let _file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .mode(0o666)
        .open(placeholder)
        .map_err(|e| PulseError::io(placeholder, e))?;

    mount(
        Some(host),
        placeholder,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| PulseError::Mount {
        target: placeholder.to_path_buf(),
        message: format!("bind {}: {e}", host.display()),
    })
}

fn create_mount_point(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| PulseError::Mount {
        target: path.to_path_buf(),
        message: format!("cannot create mount point: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essential_mounts_are_ordered_proc_sys_tmp() {
        let mounts = essential_mounts(Path::new("/r"));
        let targets: Vec<_> = mounts.iter().map(|m| m.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                PathBuf::from("/r/proc"),
                PathBuf::from("/r/sys"),
                PathBuf::from("/r/tmp")
            ]
        );
        assert_eq!(mounts[1].fstype, "sysfs");
    }

    #[test]
    fn device_binds_skip_devices_missing_on_host() {
        let host = tempfile::tempdir().expect("tempdir");
        std::fs::write(host.path().join("null"), b"").expect("write");
        std::fs::write(host.path().join("urandom"), b"").expect("write");

        let binds = device_binds(Path::new("/r"), host.path());
        let placeholders: Vec<_> = binds.iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(
            placeholders,
            vec![PathBuf::from("/r/dev/null"), PathBuf::from("/r/dev/urandom")]
        );
    }

    #[test]
    fn create_mount_point_reports_mount_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("file");
        std::fs::write(&file, b"").expect("write");
        let err = create_mount_point(&file.join("proc")).expect_err("under a file");
        assert!(matches!(err, PulseError::Mount { .. }));
    }
}
