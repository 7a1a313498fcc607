//! Unified error types for the Pulse workspace.
//!
//! The variants follow the failure classes of the engine: image errors,
//! privilege errors, mount/chroot errors, network provisioning errors and
//! exec resolution errors are kept distinct so callers can report them
//! differently.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PulseError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A blob did not match the digest it is stored under.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// The OCI layout or one of its layers is malformed.
    #[error("invalid image: {message}")]
    InvalidImage {
        /// What was wrong with the image.
        message: String,
    },

    /// A permission or privilege error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A mount or root-change step failed inside the container.
    #[error("mount failed at {target}: {message}")]
    Mount {
        /// Mount point or path involved.
        target: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Host bridge, NAT, or per-container network setup failed.
    #[error("network error: {message}")]
    Network {
        /// Description of the failed step.
        message: String,
    },

    /// The target command could not be located inside the container.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// Command as requested by the caller.
        command: String,
    },

    /// Replacing the process image failed.
    #[error("exec failed for {command}: {message}")]
    Exec {
        /// Resolved command path.
        command: String,
        /// Underlying failure.
        message: String,
    },

    /// The container process exited with a non-zero status.
    #[error("container exited with status {code}")]
    ContainerExit {
        /// Exit code reported by `waitpid(2)`.
        code: i32,
    },

    /// The container process was terminated by a signal.
    #[error("container killed by signal {signal}")]
    ContainerSignaled {
        /// Name of the terminating signal.
        signal: String,
    },
}

impl PulseError {
    /// Wraps an I/O error together with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PulseError>;
