//! Ownership reconciliation around sudo privilege transitions.
//!
//! When `pulse` runs as real root on behalf of a regular user, the rootfs was
//! extracted by that user but the container runs as uid 0 without a user
//! namespace. Before start the tree is handed to root; after exit it is handed
//! back so the user can still manage the image from the host. Every step is
//! best-effort: failures are logged and skipped, never returned.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pulse_common::types::InvokingUser;

use crate::walk::{WalkPolicy, WalkReport, walk_tree};

/// Read and execute bits for "other".
const OTHER_RX: u32 = 0o005;

/// Adjusts rootfs ownership around an elevated container run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipReconciler {
    elevated: bool,
    invoking: Option<InvokingUser>,
}

impl OwnershipReconciler {
    /// Creates a reconciler from explicit privilege facts.
    #[must_use]
    pub const fn new(elevated: bool, invoking: Option<InvokingUser>) -> Self {
        Self { elevated, invoking }
    }

    /// Detects privilege state from the effective uid and sudo hints.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(nix::unistd::geteuid().is_root(), InvokingUser::from_env())
    }

    /// Returns whether the process runs as root on behalf of another user.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.elevated && self.invoking.is_some()
    }

    /// Prepares `rootfs` for a container running as real root.
    ///
    /// Makes every ancestor world-traversable and chowns the tree to `0:0`.
    /// Does nothing unless [`Self::is_active`].
    pub fn before_start(&self, rootfs: &Path) {
        if !self.is_active() {
            return;
        }
        make_path_traversable(rootfs);
        let report = chown_tree(rootfs, 0, 0);
        tracing::info!(
            rootfs = %rootfs.display(),
            changed = report.visited,
            skipped = report.skipped.len(),
            "rootfs handed to root"
        );
    }

    /// Restores ownership of `rootfs` to the invoking user after exit.
    pub fn after_exit(&self, rootfs: &Path) {
        let Some(user) = self.invoking.filter(|_| self.elevated) else {
            return;
        };
        let report = chown_tree(rootfs, user.uid, user.gid);
        tracing::info!(
            rootfs = %rootfs.display(),
            uid = user.uid,
            gid = user.gid,
            changed = report.visited,
            skipped = report.skipped.len(),
            "rootfs ownership restored"
        );
    }

    /// Chowns a single directory to the invoking user.
    ///
    /// Used for directories the engine creates on the user's behalf, such as
    /// the images directory.
    pub fn claim_dir(&self, dir: &Path) {
        let Some(user) = self.invoking.filter(|_| self.elevated) else {
            return;
        };
        if let Err(e) = std::os::unix::fs::chown(dir, Some(user.uid), Some(user.gid)) {
            tracing::warn!(path = %dir.display(), error = %e, "failed to chown directory");
        }
    }
}

/// Returns `path` and each of its ancestors, outermost first, excluding `/`.
#[must_use]
pub fn ancestors_below_root(path: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = path
        .ancestors()
        .filter(|p| !p.as_os_str().is_empty() && *p != Path::new("/"))
        .map(Path::to_path_buf)
        .collect();
    dirs.reverse();
    dirs
}

/// Adds `o+rx` to `path` and every ancestor that lacks it.
///
/// Missing directories and chmod failures are skipped.
pub fn make_path_traversable(path: &Path) {
    for dir in ancestors_below_root(path) {
        let Ok(meta) = std::fs::metadata(&dir) else {
            continue;
        };
        let mode = meta.permissions().mode();
        if mode & OTHER_RX == OTHER_RX {
            continue;
        }
        let perms = std::fs::Permissions::from_mode((mode | OTHER_RX) & 0o7777);
        match std::fs::set_permissions(&dir, perms) {
            Ok(()) => tracing::debug!(dir = %dir.display(), "made directory traversable"),
            Err(e) => tracing::debug!(dir = %dir.display(), error = %e, "chmod skipped"),
        }
    }
}

/// Recursively changes ownership of `root` without following symlinks.
///
/// Individual failures are skipped and reported.
pub fn chown_tree(root: &Path, uid: u32, gid: u32) -> WalkReport {
    walk_tree(root, WalkPolicy::ContinueOnError, |path| {
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
    })
    .unwrap_or_default()
}
