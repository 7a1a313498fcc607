//! Host command execution for network provisioning.
//!
//! All bridge, firewall, and veth work goes through [`HostOps`], so the
//! provisioning sequence can run against the real host or, in tests and with
//! the `test-util` feature, against a `RecordingHost` that only records what
//! would have been executed.

#[cfg(any(test, feature = "test-util"))]
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
#[cfg(any(test, feature = "test-util"))]
use std::sync::{Mutex, PoisonError};

use pulse_common::error::{PulseError, Result};

/// Tools the network provisioner shells out to.
pub const REQUIRED_TOOLS: [&str; 3] = ["ip", "iptables", "nsenter"];

/// Side-effecting host operations used by the network provisioner.
pub trait HostOps: Send + Sync {
    /// Runs `program` with `args`, failing on a non-zero exit status.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Network`] if the program cannot be spawned or
    /// exits unsuccessfully.
    fn run(&self, program: &str, args: &[&str]) -> Result<()>;

    /// Runs `program` with `args` and returns its standard output.
    ///
    /// # Errors
    ///
    /// Same as [`HostOps::run`].
    fn output(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Returns whether a network link named `name` exists.
    fn link_exists(&self, name: &str) -> bool;

    /// Writes `value` to a sysctl file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write_sysctl(&self, path: &Path, value: &str) -> Result<()>;

    /// Returns whether `tool` can be found on `PATH`.
    fn has_tool(&self, tool: &str) -> bool;
}

/// [`HostOps`] backed by real processes and the real `/sys` and `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl SystemHost {
    fn spawn(program: &str, args: &[&str]) -> Result<std::process::Output> {
        tracing::debug!(program, args = ?args, "host command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| PulseError::Network {
                message: format!("failed to spawn {program}: {e}"),
            })?;
        if !output.status.success() {
            return Err(PulseError::Network {
                message: format!(
                    "`{program} {}` failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output)
    }
}

impl HostOps for SystemHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        Self::spawn(program, args).map(|_| ())
    }

    fn output(&self, program: &str, args: &[&str]) -> Result<String> {
        Self::spawn(program, args).map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
    }

    fn link_exists(&self, name: &str) -> bool {
        Path::new("/sys/class/net").join(name).exists()
    }

    fn write_sysctl(&self, path: &Path, value: &str) -> Result<()> {
        std::fs::write(path, value).map_err(|e| PulseError::io(path, e))
    }

    fn has_tool(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }
}

/// Fails with a network error naming the first required tool missing from
/// `PATH`.
///
/// # Errors
///
/// Returns [`PulseError::Network`] if any of [`REQUIRED_TOOLS`] is missing.
pub fn preflight(host: &dyn HostOps) -> Result<()> {
    match REQUIRED_TOOLS.iter().find(|tool| !host.has_tool(tool)) {
        Some(tool) => Err(PulseError::Network {
            message: format!("required tool `{tool}` not found in PATH"),
        }),
        None => Ok(()),
    }
}

/// Runs `args` inside the network namespace of process `pid` via `nsenter`.
///
/// # Errors
///
/// Returns an error if `nsenter` or the inner command fails.
pub fn exec_in_netns(host: &dyn HostOps, pid: u32, args: &[&str]) -> Result<()> {
    let netns = format!("--net=/proc/{pid}/ns/net");
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(netns.as_str());
    full.extend_from_slice(args);
    host.run("nsenter", &full)
}

/// [`HostOps`] that records commands instead of running them.
///
/// `ip link add <name>` and `ip link delete <name>` update the simulated
/// link table so idempotence can be observed.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<String>>,
    links: Mutex<BTreeSet<String>>,
    fail_on: Vec<String>,
    missing_tools: Vec<String>,
    default_route: String,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingHost {
    /// Creates an empty recording host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as an existing link.
    #[must_use]
    pub fn with_link(self, name: &str) -> Self {
        let _ = self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        self
    }

    /// Makes every command whose rendered form contains `pattern` fail.
    #[must_use]
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_on.push(pattern.to_string());
        self
    }

    /// Reports `tool` as missing from `PATH`.
    #[must_use]
    pub fn without_tool(mut self, tool: &str) -> Self {
        self.missing_tools.push(tool.to_string());
        self
    }

    /// Sets the output of `ip route show default`.
    #[must_use]
    pub fn with_default_route(mut self, route: &str) -> Self {
        self.default_route = route.to_string();
        self
    }

    /// Returns every recorded operation in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, line: String) -> Result<()> {
        let failing = self.fail_on.iter().any(|p| line.contains(p.as_str()));
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());
        if failing {
            return Err(PulseError::Network {
                message: format!("`{line}` failed"),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
impl HostOps for RecordingHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        self.record(format!("{program} {}", args.join(" ")))?;
        if program == "ip" {
            let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
            match args {
                ["link", "add", name, ..] => {
                    let _ = links.insert((*name).to_string());
                }
                ["link", "delete", name, ..] => {
                    let _ = links.remove(*name);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn output(&self, program: &str, args: &[&str]) -> Result<String> {
        self.record(format!("{program} {}", args.join(" ")))?;
        Ok(self.default_route.clone())
    }

    fn link_exists(&self, name: &str) -> bool {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    fn write_sysctl(&self, path: &Path, value: &str) -> Result<()> {
        self.record(format!("sysctl {}={value}", path.display()))
    }

    fn has_tool(&self, tool: &str) -> bool {
        !self.missing_tools.iter().any(|t| t == tool)
    }
}
