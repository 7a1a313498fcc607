//! Linux namespace management for container isolation.
//!
//! Translates the isolation requested for a run into `clone(2)` flags and
//! provides the id-map and hostname steps that complete each namespace.

pub mod user;
pub mod uts;

/// Configuration for which namespaces a container is cloned into.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate user namespace.
    pub user: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
}

impl NamespaceConfig {
    /// Returns the namespace set for a container started by a user with the
    /// given privilege.
    ///
    /// Mount, UTS, IPC, PID and network namespaces are always created. A user
    /// namespace is added only when the caller is not root, so that an
    /// unprivileged caller becomes root inside the container.
    #[must_use]
    pub const fn for_caller(is_root: bool) -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            user: !is_root,
            ipc: true,
            uts: true,
        }
    }

    /// Converts the configuration into `clone(2)` flags.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn clone_flags(&self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        let mut flags = CloneFlags::empty();
        for (enabled, flag) in [
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.user, CloneFlags::CLONE_NEWUSER),
        ] {
            if enabled {
                flags |= flag;
            }
        }
        flags
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self::for_caller(true)
    }
}
