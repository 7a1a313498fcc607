//! NAT and forwarding rules for the container subnet (iptables).
//!
//! Every rule is checked with `iptables -C` and appended only when absent,
//! so repeated setup never stacks duplicate rules.

use pulse_common::config::NetworkConfig;
use pulse_common::constants;
use pulse_common::error::Result;

use super::host::HostOps;

/// Extracts the interface name following `dev` in `ip route show default`
/// output.
#[must_use]
pub fn parse_default_interface(route_output: &str) -> Option<String> {
    let mut fields = route_output.split_whitespace();
    while let Some(field) = fields.next() {
        if field == "dev" {
            return fields.next().map(str::to_string);
        }
    }
    None
}

/// Returns the host interface carrying the default route.
///
/// Falls back to `eth0` when the route cannot be read or parsed.
pub fn default_interface(host: &dyn HostOps) -> String {
    match host.output("ip", &["route", "show", "default"]) {
        Ok(out) => parse_default_interface(&out).unwrap_or_else(|| {
            tracing::warn!("no default route interface found, assuming eth0");
            constants::FALLBACK_EGRESS_INTERFACE.to_string()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read default route, assuming eth0");
            constants::FALLBACK_EGRESS_INTERFACE.to_string()
        }
    }
}

/// Returns the rule specs installed for the bridge, as
/// `(table, chain, match + target)` triples.
#[must_use]
pub fn bridge_rules(config: &NetworkConfig, egress: &str) -> Vec<(&'static str, &'static str, Vec<String>)> {
    let owned = |parts: &[&str]| parts.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
    vec![
        (
            "nat",
            "POSTROUTING",
            owned(&["-s", config.subnet.as_str(), "-o", egress, "-j", "MASQUERADE"]),
        ),
        (
            "filter",
            "FORWARD",
            owned(&["-i", config.bridge_name.as_str(), "-j", "ACCEPT"]),
        ),
        (
            "filter",
            "FORWARD",
            owned(&["-o", config.bridge_name.as_str(), "-j", "ACCEPT"]),
        ),
    ]
}

/// Ensures masquerading and bridge forwarding rules exist.
///
/// # Errors
///
/// Returns a network error if a missing rule cannot be appended.
pub fn ensure_nat(host: &dyn HostOps, config: &NetworkConfig) -> Result<()> {
    let egress = default_interface(host);
    for (table, chain, spec) in bridge_rules(config, &egress) {
        ensure_rule(host, table, chain, &spec)?;
    }
    tracing::info!(subnet = %config.subnet, egress = %egress, "NAT rules in place");
    Ok(())
}

fn ensure_rule(host: &dyn HostOps, table: &str, chain: &str, spec: &[String]) -> Result<()> {
    let rule: Vec<&str> = spec.iter().map(String::as_str).collect();

    let mut check = vec!["-t", table, "-C", chain];
    check.extend_from_slice(&rule);
    if host.run("iptables", &check).is_ok() {
        tracing::debug!(table, chain, rule = ?rule, "rule already present");
        return Ok(());
    }

    let mut append = vec!["-t", table, "-A", chain];
    append.extend_from_slice(&rule);
    host.run("iptables", &append)
}
