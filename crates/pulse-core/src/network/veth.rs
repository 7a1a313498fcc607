//! Per-container veth pairs and address assignment.

use pulse_common::config::NetworkConfig;
use pulse_common::error::Result;
use pulse_common::types::ContainerId;

use super::host::{HostOps, exec_in_netns};

/// Number of host addresses handed out from the container subnet.
const ADDRESS_POOL: u32 = 253;

/// First host octet handed to containers (`.1` is the gateway).
const FIRST_HOST_OCTET: u32 = 2;

/// Names of a container's veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// End attached to the host bridge.
    pub host: String,
    /// End moved into the container's network namespace.
    pub container: String,
}

impl VethPair {
    /// Derives interface names from the container id, keeping both under
    /// the kernel's 15-byte limit.
    #[must_use]
    pub fn for_container(id: &ContainerId) -> Self {
        Self {
            host: format!("veth{}", id.prefix(8)),
            container: format!("vethc{}", id.prefix(7)),
        }
    }
}

/// Returns the CIDR address assigned to the container entered by `pid`.
///
/// Addresses are `<prefix>.<2 + pid mod 253>`, so pids congruent modulo 253
/// receive the same address.
#[must_use]
pub fn container_ip(config: &NetworkConfig, pid: u32) -> String {
    format!(
        "{}.{}/{}",
        config.ip_prefix,
        FIRST_HOST_OCTET + pid % ADDRESS_POOL,
        config.prefix_len
    )
}

/// Wires the network namespace of `pid` to the host bridge.
///
/// Creates the veth pair, attaches and raises the host end, moves the peer
/// into the container, then addresses it, raises it and `lo`, and installs
/// the default route. On failure the host end is deleted before returning.
///
/// # Errors
///
/// Returns a network error naming the step that failed.
pub fn configure_container_network(
    host: &dyn HostOps,
    config: &NetworkConfig,
    pid: u32,
    id: &ContainerId,
) -> Result<VethPair> {
    let pair = VethPair::for_container(id);
    host.run(
        "ip",
        &["link", "add", pair.host.as_str(), "type", "veth", "peer", "name", pair.container.as_str()],
    )?;

    if let Err(e) = wire(host, config, pid, &pair) {
        if let Err(cleanup) = host.run("ip", &["link", "delete", pair.host.as_str()]) {
            tracing::warn!(veth = %pair.host, error = %cleanup, "failed to remove veth");
        }
        return Err(e);
    }

    tracing::info!(
        pid,
        veth = %pair.host,
        ip = %container_ip(config, pid),
        "container network configured"
    );
    Ok(pair)
}

fn wire(host: &dyn HostOps, config: &NetworkConfig, pid: u32, pair: &VethPair) -> Result<()> {
    let pid_str = pid.to_string();
    let address = container_ip(config, pid);

    host.run("ip", &["link", "set", pair.host.as_str(), "master", config.bridge_name.as_str()])?;
    host.run("ip", &["link", "set", pair.host.as_str(), "up"])?;
    host.run("ip", &["link", "set", pair.container.as_str(), "netns", pid_str.as_str()])?;

    exec_in_netns(host, pid, &["ip", "addr", "add", address.as_str(), "dev", pair.container.as_str()])?;
    exec_in_netns(host, pid, &["ip", "link", "set", pair.container.as_str(), "up"])?;
    exec_in_netns(host, pid, &["ip", "link", "set", "lo", "up"])?;
    exec_in_netns(
        host,
        pid,
        &["ip", "route", "add", "default", "via", config.gateway.as_str()],
    )
}
