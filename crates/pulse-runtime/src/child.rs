//! Entry point of the re-executed child inside fresh namespaces.
//!
//! The launcher re-invokes its own binary as `<exe> child <cmd...>` with the
//! rootfs in `PULSE_ROOTFS`. This side mounts the container filesystems,
//! switches root, sets the hostname and replaces itself with the command.

use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};
use pulse_core::filesystem::{chroot, mount};
use pulse_core::namespace::uts;

use crate::resolve;

/// Returns the rootfs handed down by the launcher.
///
/// # Errors
///
/// Returns [`PulseError::Config`] if the variable is missing or empty.
pub fn rootfs_from_env(value: Option<std::ffi::OsString>) -> Result<PathBuf> {
    value
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| PulseError::Config {
            message: format!("{} not set", constants::ENV_ROOTFS),
        })
}

/// Runs the child role with `args` as the container command.
///
/// Only returns on failure; on success the process image is replaced.
///
/// # Errors
///
/// Returns an error if the rootfs is unknown, a mandatory mount or the root
/// change fails, the hostname cannot be set, the command cannot be found, or
/// `execve` fails.
pub fn run_child(args: &[String]) -> Result<Infallible> {
    let rootfs = rootfs_from_env(std::env::var_os(constants::ENV_ROOTFS))?;
    let (program, rest) = args.split_first().ok_or_else(|| PulseError::Config {
        message: "no command given to container".into(),
    })?;

    tracing::debug!(rootfs = %rootfs.display(), command = %program, "entering container");
    mount::setup_mounts(&rootfs)?;
    chroot::enter_root(&rootfs)?;
    uts::set_hostname(constants::CONTAINER_HOSTNAME)?;

    let resolved = resolve::resolve_command(program, Path::new("/"))?;
    let err = Command::new(&resolved).args(rest).exec();
    Err(PulseError::Exec {
        command: resolved.display().to_string(),
        message: err.to_string(),
    })
}
