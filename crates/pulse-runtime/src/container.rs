//! Core container struct and lifecycle state machine.

use std::path::PathBuf;

use pulse_common::error::{PulseError, Result};
use pulse_common::types::{ContainerId, ContainerState};

/// What to run and how to isolate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Extracted root filesystem.
    pub rootfs: PathBuf,
    /// Command and arguments; empty selects a shell from the rootfs.
    pub command: Vec<String>,
    /// Extra `KEY=VALUE` entries for the container environment.
    pub env: Vec<String>,
    /// Connect the container to the host bridge.
    pub network: bool,
    /// Attach the caller's stdin.
    pub interactive: bool,
}

impl ContainerSpec {
    /// Creates a spec running `command` in `rootfs` with no networking.
    #[must_use]
    pub fn new(rootfs: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            rootfs: rootfs.into(),
            command,
            env: Vec::new(),
            network: false,
            interactive: false,
        }
    }
}

/// A single container run.
///
/// Containers are ephemeral: the id is the host pid of the entry process
/// and exists only once the process has been spawned.
#[derive(Debug)]
pub struct Container {
    /// Host pid of the entry process, once spawned.
    pub pid: Option<u32>,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// Run configuration.
    pub spec: ContainerSpec,
}

impl Container {
    /// Creates a container in the `Created` state.
    #[must_use]
    pub const fn new(spec: ContainerSpec) -> Self {
        Self {
            pid: None,
            state: ContainerState::Created,
            spec,
        }
    }

    /// Returns the container id, available once the process is spawned.
    #[must_use]
    pub fn id(&self) -> Option<ContainerId> {
        self.pid.map(ContainerId::from_pid)
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] for an illegal transition.
    pub fn transition(&mut self, next: ContainerState) -> Result<()> {
        if !can_transition(self.state, next) {
            return Err(PulseError::Config {
                message: format!("illegal container transition {} -> {next}", self.state),
            });
        }
        tracing::debug!(from = %self.state, to = %next, pid = ?self.pid, "container state");
        self.state = next;
        Ok(())
    }

    /// Marks the run failed unless it already reached a terminal state.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = ContainerState::Failed;
        }
    }
}

/// Returns whether the lifecycle permits moving from `from` to `to`.
#[must_use]
pub const fn can_transition(from: ContainerState, to: ContainerState) -> bool {
    use ContainerState::{
        Configured, Created, DnsReady, Exited, Failed, Launching, NetworkConfiguring,
        OwnershipFixed, Running,
    };

    match (from, to) {
        (Exited | Failed, _) => false,
        (_, Failed) => true,
        (Created, OwnershipFixed | DnsReady | Launching)
        | (OwnershipFixed, DnsReady | Launching)
        | (DnsReady, Launching)
        | (Launching, NetworkConfiguring | Running)
        | (NetworkConfiguring, Configured)
        | (Configured, Running)
        | (Running, Exited) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Container {
        Container::new(ContainerSpec::new("/tmp/rootfs", vec!["/bin/true".into()]))
    }

    #[test]
    fn new_container_has_no_identity() {
        let c = container();
        assert_eq!(c.state, ContainerState::Created);
        assert!(c.id().is_none());
    }

    #[test]
    fn networked_elevated_path_is_accepted() {
        let mut c = container();
        for next in [
            ContainerState::OwnershipFixed,
            ContainerState::DnsReady,
            ContainerState::Launching,
            ContainerState::NetworkConfiguring,
            ContainerState::Configured,
            ContainerState::Running,
            ContainerState::Exited,
        ] {
            c.transition(next).expect("legal transition");
        }
        assert!(c.state.is_terminal());
    }

    #[test]
    fn plain_path_skips_optional_states() {
        let mut c = container();
        c.transition(ContainerState::Launching).expect("launch");
        c.transition(ContainerState::Running).expect("run");
        c.pid = Some(4242);
        assert_eq!(c.id(), Some(ContainerId::new("4242")));
    }

    #[test]
    fn cannot_run_before_network_is_configured() {
        let mut c = container();
        c.transition(ContainerState::Launching).expect("launch");
        c.transition(ContainerState::NetworkConfiguring).expect("net");
        assert!(c.transition(ContainerState::Running).is_err());
        assert_eq!(c.state, ContainerState::NetworkConfiguring);
    }

    #[test]
    fn configured_network_cannot_relaunch() {
        let mut c = container();
        for next in [
            ContainerState::Launching,
            ContainerState::NetworkConfiguring,
            ContainerState::Configured,
        ] {
            c.transition(next).expect("valid transition");
        }
        assert!(c.transition(ContainerState::Launching).is_err());
        assert_eq!(c.state, ContainerState::Configured);
        assert!(!can_transition(ContainerState::Configured, ContainerState::Launching));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut c = container();
        c.fail();
        assert_eq!(c.state, ContainerState::Failed);
        assert!(c.transition(ContainerState::Running).is_err());
        assert!(!can_transition(ContainerState::Exited, ContainerState::Failed));
    }
}
