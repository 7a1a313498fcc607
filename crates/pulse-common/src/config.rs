//! Global configuration model for the Pulse engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for the Pulse engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Pulse home directory (`~/.pulse` of the invoking user).
    pub home: PathBuf,
    /// Executable re-invoked in the child role.
    pub self_exe: PathBuf,
    /// Bridge and addressing parameters.
    pub network: NetworkConfig,
}

impl PulseConfig {
    /// Builds the configuration from the process environment.
    ///
    /// The home directory honours `PULSE_HOME`, then the sudo-original user,
    /// then `HOME`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            home: resolve_pulse_home(|key| std::env::var(key).ok(), lookup_home_dir),
            ..Self::default()
        }
    }

    /// Creates a configuration rooted at an explicit home directory.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Returns the directory holding all OCI image layouts.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.home.join(constants::IMAGES_DIR_NAME)
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(constants::FALLBACK_HOME).join(constants::PULSE_DIR_NAME),
            self_exe: PathBuf::from(constants::SELF_EXE),
            network: NetworkConfig::default(),
        }
    }
}

/// Host bridge and container addressing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Name of the shared host bridge.
    pub bridge_name: String,
    /// Bridge address in CIDR notation.
    pub bridge_cidr: String,
    /// Container subnet in CIDR notation, used for NAT.
    pub subnet: String,
    /// Gateway installed as the default route inside containers.
    pub gateway: String,
    /// First three octets of container addresses.
    pub ip_prefix: String,
    /// Prefix length of container addresses.
    pub prefix_len: u8,
    /// Resolvers used when the host offers none outside loopback.
    pub fallback_nameservers: Vec<String>,
    /// Host resolver file parsed for DNS injection.
    pub host_resolv_conf: PathBuf,
    /// Sysctl file toggling IPv4 forwarding.
    pub ip_forward_path: PathBuf,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge_name: constants::BRIDGE_NAME.into(),
            bridge_cidr: constants::BRIDGE_CIDR.into(),
            subnet: constants::CONTAINER_SUBNET.into(),
            gateway: constants::BRIDGE_GATEWAY.into(),
            ip_prefix: constants::CONTAINER_IP_PREFIX.into(),
            prefix_len: constants::CONTAINER_PREFIX_LEN,
            fallback_nameservers: constants::FALLBACK_NAMESERVERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            host_resolv_conf: PathBuf::from(constants::HOST_RESOLV_CONF),
            ip_forward_path: PathBuf::from(constants::IP_FORWARD_SYSCTL),
        }
    }
}

/// Resolves the pulse home directory.
///
/// `var` reads environment variables and `home_of` maps a uid to its home
/// directory; both are injected so the precedence can be tested.
pub fn resolve_pulse_home(
    var: impl Fn(&str) -> Option<String>,
    home_of: impl Fn(u32) -> Option<PathBuf>,
) -> PathBuf {
    if let Some(explicit) = var(constants::ENV_HOME_OVERRIDE).filter(|v| !v.is_empty()) {
        return PathBuf::from(explicit);
    }

    if let Some(sudo_uid) = var(constants::ENV_SUDO_UID).filter(|v| !v.is_empty()) {
        if let Some(home) = sudo_uid.trim().parse::<u32>().ok().and_then(&home_of) {
            return home.join(constants::PULSE_DIR_NAME);
        }
        if let Some(user) = var(constants::ENV_SUDO_USER).filter(|v| !v.is_empty()) {
            return Path::new("/home").join(user).join(constants::PULSE_DIR_NAME);
        }
    }

    let home = var("HOME")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| constants::FALLBACK_HOME.to_string());
    PathBuf::from(home).join(constants::PULSE_DIR_NAME)
}

/// Looks up a user's home directory in the system user database.
fn lookup_home_dir(uid: u32) -> Option<PathBuf> {
    nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|user| user.dir)
}
