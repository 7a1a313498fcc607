//! Bridged container networking.
//!
//! A single host bridge with NAT to the default-route interface, one veth
//! pair per container, and a `resolv.conf` injected into the rootfs.

pub mod bridge;
pub mod dns;
pub mod firewall;
pub mod host;
pub mod veth;

use std::path::Path;
use std::sync::Arc;

use pulse_common::config::NetworkConfig;
use pulse_common::error::Result;
use pulse_common::types::ContainerId;

pub use bridge::BridgeStatus;
use host::{HostOps, SystemHost};
pub use veth::VethPair;

/// Network provisioning entry points bound to a host and configuration.
#[derive(Clone)]
pub struct NetworkProvisioner {
    host: Arc<dyn HostOps>,
    config: NetworkConfig,
}

impl std::fmt::Debug for NetworkProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProvisioner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NetworkProvisioner {
    /// Creates a provisioner acting on the real host.
    #[must_use]
    pub fn system(config: NetworkConfig) -> Self {
        Self::new(Arc::new(SystemHost), config)
    }

    /// Creates a provisioner acting through `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostOps>, config: NetworkConfig) -> Self {
        Self { host, config }
    }

    /// Returns the network configuration.
    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Ensures the host bridge and its NAT rules exist.
    ///
    /// # Errors
    ///
    /// Returns a network error if a required tool is missing or a setup
    /// step fails.
    pub fn setup_networking(&self) -> Result<BridgeStatus> {
        host::preflight(self.host.as_ref())?;
        bridge::ensure_bridge(self.host.as_ref(), &self.config)
    }

    /// Connects the network namespace of `pid` to the bridge.
    ///
    /// # Errors
    ///
    /// Returns a network error if any step fails; the host veth is removed
    /// first.
    pub fn configure_container_network(&self, pid: u32, id: &ContainerId) -> Result<VethPair> {
        veth::configure_container_network(self.host.as_ref(), &self.config, pid, id)
    }

    /// Writes the container's `resolv.conf` into `rootfs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn setup_dns(&self, rootfs: &Path) -> Result<()> {
        dns::setup_dns(rootfs, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::host::RecordingHost;
    use super::*;

    #[test]
    fn setup_networking_preflights_tools_first() {
        let host = Arc::new(RecordingHost::new().without_tool("iptables"));
        let provisioner = NetworkProvisioner::new(host.clone(), NetworkConfig::default());
        let err = provisioner.setup_networking().expect_err("iptables missing");
        assert!(err.to_string().contains("iptables"));
        assert!(host.calls().is_empty());
    }
}
