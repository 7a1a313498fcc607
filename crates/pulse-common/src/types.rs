//! Domain primitive types used across the Pulse workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Identifier of a running container.
///
/// Containers have no persisted identity; the id is the decimal pid of the
/// container's entry process as seen from the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the container ID from the host pid of its entry process.
    #[must_use]
    pub fn from_pid(pid: u32) -> Self {
        Self(pid.to_string())
    }

    /// Returns at most the first `len` characters of the id.
    #[must_use]
    pub fn prefix(&self, len: usize) -> &str {
        self.0
            .char_indices()
            .nth(len)
            .map_or(self.0.as_str(), |(idx, _)| &self.0[..idx])
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image reference as given by the user, e.g. `docker.io/library/alpine:3.20`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates an image reference from a string value.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the reference with `/` and `:` replaced by `_`, suitable as a
    /// single path component.
    #[must_use]
    pub fn sanitized(&self) -> String {
        self.0.replace(['/', ':'], "_")
    }

    /// Returns the name of the image's OCI layout directory.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}{}", self.sanitized(), constants::IMAGE_DIR_SUFFIX)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unprivileged user on whose behalf a sudo invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokingUser {
    /// Original uid (`SUDO_UID`).
    pub uid: u32,
    /// Original gid (`SUDO_GID`).
    pub gid: u32,
}

impl InvokingUser {
    /// Reads the sudo identity hints from the process environment.
    ///
    /// Returns `None` unless both `SUDO_UID` and `SUDO_GID` are present and
    /// numeric.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_vars(
            std::env::var(constants::ENV_SUDO_UID).ok().as_deref(),
            std::env::var(constants::ENV_SUDO_GID).ok().as_deref(),
        )
    }

    /// Builds the identity from raw `SUDO_UID` / `SUDO_GID` values.
    #[must_use]
    pub fn from_vars(uid: Option<&str>, gid: Option<&str>) -> Option<Self> {
        let uid = uid?.trim().parse().ok()?;
        let gid = gid?.trim().parse().ok()?;
        Some(Self { uid, gid })
    }
}

/// Lifecycle state of a container run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Run requested, nothing done yet.
    Created,
    /// Rootfs ownership prepared for a root-owned container.
    OwnershipFixed,
    /// `resolv.conf` written into the rootfs.
    DnsReady,
    /// Child process spawned and held at the launch gate.
    Launching,
    /// Per-container network being configured.
    NetworkConfiguring,
    /// Per-container network configured.
    Configured,
    /// Child released and running its command.
    Running,
    /// Child exited (successfully or with a status).
    Exited,
    /// Launch failed or the child could not enter the container.
    Failed,
}

impl ContainerState {
    /// Returns whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Failed)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::OwnershipFixed => "ownership-fixed",
            Self::DnsReady => "dns-ready",
            Self::Launching => "launching",
            Self::NetworkConfiguring => "network-configuring",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
