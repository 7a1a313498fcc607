//! Host bridge lifecycle.
//!
//! The bridge is a host-wide singleton shared by every container. Setup is
//! idempotent: an existing bridge is left untouched, and losing a creation
//! race to another process counts as success. A bridge this process created
//! but could not finish configuring is deleted again, so the next run starts
//! from scratch instead of finding a half-configured link.

use std::sync::{Mutex, PoisonError};

use pulse_common::config::NetworkConfig;
use pulse_common::error::Result;

use super::firewall;
use super::host::HostOps;

/// Serializes bridge setup within this process.
static BRIDGE_LOCK: Mutex<()> = Mutex::new(());

/// Outcome of [`ensure_bridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    /// The bridge was already present; nothing was changed.
    Existing,
    /// The bridge was created and configured by this call.
    Created,
}

/// Ensures the host bridge exists, is addressed, is up, and is NATed.
///
/// # Errors
///
/// Returns a network error if any setup step fails after the bridge was
/// found missing. The bridge is deleted before the error is returned.
pub fn ensure_bridge(host: &dyn HostOps, config: &NetworkConfig) -> Result<BridgeStatus> {
    let _guard = BRIDGE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let bridge = config.bridge_name.as_str();

    if host.link_exists(bridge) {
        tracing::debug!(bridge, "bridge already exists");
        return Ok(BridgeStatus::Existing);
    }

    if let Err(e) = host.run("ip", &["link", "add", bridge, "type", "bridge"]) {
        if host.link_exists(bridge) {
            tracing::debug!(bridge, "bridge created concurrently");
            return Ok(BridgeStatus::Existing);
        }
        return Err(e);
    }
    if let Err(e) = configure_bridge(host, config) {
        if let Err(cleanup) = host.run("ip", &["link", "delete", bridge]) {
            tracing::warn!(bridge, error = %cleanup, "failed to remove partially configured bridge");
        }
        return Err(e);
    }

    tracing::info!(bridge, cidr = %config.bridge_cidr, "bridge created");
    Ok(BridgeStatus::Created)
}

fn configure_bridge(host: &dyn HostOps, config: &NetworkConfig) -> Result<()> {
    let bridge = config.bridge_name.as_str();
    host.run("ip", &["addr", "add", config.bridge_cidr.as_str(), "dev", bridge])?;
    host.run("ip", &["link", "set", bridge, "up"])?;
    host.write_sysctl(&config.ip_forward_path, "1")?;
    firewall::ensure_nat(host, config)
}

#[cfg(test)]
mod tests {
    use super::super::host::RecordingHost;
    use super::*;

    #[test]
    fn existing_bridge_is_left_alone() {
        let host = RecordingHost::new().with_link("pulse0");
        let status = ensure_bridge(&host, &NetworkConfig::default()).expect("ensure");
        assert_eq!(status, BridgeStatus::Existing);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn missing_bridge_is_created_in_order() {
        let host = RecordingHost::new().with_default_route("default via 10.0.0.1 dev eth1");
        let status = ensure_bridge(&host, &NetworkConfig::default()).expect("ensure");
        assert_eq!(status, BridgeStatus::Created);

        let calls = host.calls();
        assert_eq!(calls[0], "ip link add pulse0 type bridge");
        assert_eq!(calls[1], "ip addr add 172.18.0.1/24 dev pulse0");
        assert_eq!(calls[2], "ip link set pulse0 up");
        assert_eq!(calls[3], "sysctl /proc/sys/net/ipv4/ip_forward=1");
        assert_eq!(calls[4], "ip route show default");
    }

    #[test]
    fn second_ensure_is_a_no_op() {
        let host = RecordingHost::new();
        let config = NetworkConfig::default();
        let _ = ensure_bridge(&host, &config).expect("first");
        let before = host.calls().len();
        assert_eq!(ensure_bridge(&host, &config).expect("second"), BridgeStatus::Existing);
        assert_eq!(host.calls().len(), before);
    }

    #[test]
    fn address_failure_is_fatal() {
        let host = RecordingHost::new().failing_on("addr add");
        assert!(ensure_bridge(&host, &NetworkConfig::default()).is_err());
    }

    #[test]
    fn failed_setup_removes_new_bridge() {
        let host = RecordingHost::new().failing_on("sysctl");
        let config = NetworkConfig::default();
        assert!(ensure_bridge(&host, &config).is_err());
        assert_eq!(host.calls().last().map(String::as_str), Some("ip link delete pulse0"));
        assert!(!host.link_exists("pulse0"));

        // The next attempt configures from scratch instead of reporting Existing.
        assert!(ensure_bridge(&host, &config).is_err());
        let adds = host
            .calls()
            .iter()
            .filter(|c| c.as_str() == "ip link add pulse0 type bridge")
            .count();
        assert_eq!(adds, 2);
    }

    #[test]
    fn nat_failure_removes_new_bridge() {
        let host = RecordingHost::new().failing_on("iptables");
        assert!(ensure_bridge(&host, &NetworkConfig::default()).is_err());
        assert!(!host.link_exists("pulse0"));
    }
}
