//! Shell probing and command lookup inside a root filesystem.

use std::path::{Path, PathBuf};

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};

/// Picks the first shell present in `rootfs`, falling back to `/bin/sh`.
///
/// A candidate counts when it exists and is not a directory. Symlinks are
/// accepted without following them, since absolute targets only make sense
/// after the root change.
#[must_use]
pub fn default_shell(rootfs: &Path) -> String {
    constants::SHELL_CANDIDATES
        .iter()
        .find(|shell| {
            std::fs::symlink_metadata(inside(rootfs, shell)).is_ok_and(|m| !m.is_dir())
        })
        .map_or_else(|| constants::DEFAULT_SHELL.to_string(), |s| (*s).to_string())
}

/// Resolves `command` to the path to execute, as seen from inside `root`.
///
/// Absolute commands must exist. Bare names are searched in the fixed
/// container search path; the host `PATH` is never consulted.
///
/// # Errors
///
/// Returns [`PulseError::CommandNotFound`] if nothing matches.
pub fn resolve_command(command: &str, root: &Path) -> Result<PathBuf> {
    if command.starts_with('/') {
        if inside(root, command).exists() {
            return Ok(PathBuf::from(command));
        }
        return Err(PulseError::CommandNotFound {
            command: command.to_string(),
        });
    }

    constants::COMMAND_SEARCH_PATHS
        .iter()
        .map(|dir| Path::new(dir).join(command))
        .find(|candidate| inside(root, &candidate.to_string_lossy()).exists())
        .ok_or_else(|| PulseError::CommandNotFound {
            command: command.to_string(),
        })
}

fn inside(root: &Path, absolute: &str) -> PathBuf {
    root.join(absolute.trim_start_matches('/'))
}
