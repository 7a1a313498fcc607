//! DNS injection into the container rootfs.
//!
//! Host resolvers on loopback (e.g. the systemd-resolved stub at
//! `127.0.0.53`) are unreachable from a container network namespace, so only
//! routable nameservers are copied.

use std::io::Write;
use std::path::{Path, PathBuf};

use pulse_common::config::NetworkConfig;
use pulse_common::error::{PulseError, Result};

/// Returns whether a nameserver address is only reachable on the host.
#[must_use]
pub fn is_loopback(nameserver: &str) -> bool {
    nameserver.starts_with("127.") || nameserver == "::1" || nameserver == "localhost"
}

/// Extracts routable nameservers from a `resolv.conf` body.
#[must_use]
pub fn routable_nameservers(resolv_conf: &str) -> Vec<String> {
    resolv_conf
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.strip_prefix("nameserver"))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
        .filter(|ns| !ns.is_empty() && !is_loopback(ns))
        .map(str::to_string)
        .collect()
}

/// Renders the container's `resolv.conf`.
///
/// Uses the host's routable nameservers, or `fallback` when there are none or
/// the host file could not be read.
#[must_use]
pub fn render_resolv_conf(host_conf: Option<&str>, fallback: &[String]) -> String {
    let servers = host_conf.map(routable_nameservers).unwrap_or_default();
    let chosen = if servers.is_empty() {
        tracing::debug!("no routable host nameservers, using public fallback");
        fallback
    } else {
        tracing::debug!(count = servers.len(), "using host nameservers");
        servers.as_slice()
    };
    chosen.iter().map(|ns| format!("nameserver {ns}\n")).collect()
}

/// Writes `etc/resolv.conf` into `rootfs`, replacing any existing file.
///
/// An existing `resolv.conf` link is removed, never written through. A
/// symlinked `etc/` is only used when it resolves inside the rootfs.
///
/// # Errors
///
/// Returns [`PulseError::InvalidImage`] if `etc/` leads outside the rootfs,
/// or an I/O error if the file cannot be written.
pub fn setup_dns(rootfs: &Path, config: &NetworkConfig) -> Result<()> {
    let etc = rootfs_etc(rootfs)?;

    let host_conf = std::fs::read_to_string(&config.host_resolv_conf)
        .map_err(|e| {
            tracing::debug!(path = %config.host_resolv_conf.display(), error = %e, "host resolver unreadable");
        })
        .ok();
    let content = render_resolv_conf(host_conf.as_deref(), &config.fallback_nameservers);

    let target = etc.join("resolv.conf");
    match std::fs::remove_file(&target) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PulseError::io(&target, e)),
    }
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .map_err(|e| PulseError::io(&target, e))?;
    file.write_all(content.as_bytes()).map_err(|e| PulseError::io(&target, e))?;

    tracing::debug!(path = %target.display(), "wrote DNS config");
    Ok(())
}

/// Returns the real `etc/` directory of `rootfs`, creating it if missing.
fn rootfs_etc(rootfs: &Path) -> Result<PathBuf> {
    let etc = rootfs.join("etc");
    match std::fs::symlink_metadata(&etc) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let root = std::fs::canonicalize(rootfs).map_err(|e| PulseError::io(rootfs, e))?;
            let resolved = std::fs::canonicalize(&etc)
                .ok()
                .filter(|p| p.starts_with(&root) && p.is_dir());
            resolved.ok_or_else(|| {
                tracing::warn!(path = %etc.display(), "etc links outside the rootfs, not writing DNS config");
                PulseError::InvalidImage {
                    message: format!("{} links outside the rootfs", etc.display()),
                }
            })
        }
        Ok(meta) if meta.is_dir() => Ok(etc),
        Ok(_) => Err(PulseError::InvalidImage {
            message: format!("{} is not a directory", etc.display()),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(&etc).map_err(|e| PulseError::io(&etc, e))?;
            Ok(etc)
        }
        Err(e) => Err(PulseError::io(&etc, e)),
    }
}
