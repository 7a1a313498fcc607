//! Depth-first filesystem walk with an explicit error policy.
//!
//! Ownership reconciliation must never fail a container run, while other
//! callers want the first error. The policy makes that choice visible at the
//! call site instead of burying it in ad hoc `let _ =` chains.

use std::path::{Path, PathBuf};

use pulse_common::error::{PulseError, Result};

/// What to do when visiting or listing an entry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPolicy {
    /// Record the failure, skip the entry, and keep walking.
    ContinueOnError,
    /// Stop at the first failure and return it.
    AbortOnError,
}

/// Summary of a completed walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Entries the visitor was applied to successfully.
    pub visited: usize,
    /// Entries skipped because listing or visiting them failed.
    pub skipped: Vec<PathBuf>,
}

/// Walks `root` depth-first, calling `visit` on every entry including `root`.
///
/// Symbolic links are visited but never followed. Parents are visited before
/// their children. Under [`WalkPolicy::ContinueOnError`] a failing entry is
/// skipped on its own; its children are still walked.
///
/// # Errors
///
/// With [`WalkPolicy::AbortOnError`], returns the first listing or visitor
/// failure. With [`WalkPolicy::ContinueOnError`] this never fails.
pub fn walk_tree<F>(root: &Path, policy: WalkPolicy, mut visit: F) -> Result<WalkReport>
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    let mut report = WalkReport::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(path) = stack.pop() {
        // A directory the visitor rejected is still descended into.
        match visit(&path) {
            Ok(()) => report.visited += 1,
            Err(e) => handle_failure(policy, &mut report, &path, e)?,
        }

        let is_dir = std::fs::symlink_metadata(&path).is_ok_and(|m| m.file_type().is_dir());
        if !is_dir {
            continue;
        }

        match std::fs::read_dir(&path) {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        Ok(entry) => stack.push(entry.path()),
                        Err(e) => handle_failure(policy, &mut report, &path, e)?,
                    }
                }
            }
            Err(e) => handle_failure(policy, &mut report, &path, e)?,
        }
    }

    Ok(report)
}

fn handle_failure(
    policy: WalkPolicy,
    report: &mut WalkReport,
    path: &Path,
    error: std::io::Error,
) -> Result<()> {
    match policy {
        WalkPolicy::AbortOnError => Err(PulseError::io(path, error)),
        WalkPolicy::ContinueOnError => {
            tracing::debug!(path = %path.display(), error = %error, "skipping entry");
            report.skipped.push(path.to_path_buf());
            Ok(())
        }
    }
}
