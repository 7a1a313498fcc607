//! Launches a container: prepares the rootfs and host, clones the child into
//! its namespaces, configures it while gated, then waits for it to exit.

use std::path::Path;

use pulse_common::config::PulseConfig;
use pulse_common::constants;
use pulse_common::error::{PulseError, Result};
use pulse_common::types::ContainerState;
use pulse_core::namespace::NamespaceConfig;
use pulse_core::namespace::user::{IdMapping, write_id_maps};
use pulse_core::network::NetworkProvisioner;
use pulse_core::ownership::OwnershipReconciler;

use crate::container::{Container, ContainerSpec};
use crate::process::{self, GatedChild, LaunchRequest};
use crate::resolve;

/// Credentials of the process starting containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostIdentity {
    /// Effective uid.
    pub euid: u32,
    /// Real uid, mapped to root inside a user namespace.
    pub uid: u32,
    /// Real gid, mapped to root inside a user namespace.
    pub gid: u32,
}

impl HostIdentity {
    /// Reads the identity of the current process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            euid: nix::unistd::geteuid().as_raw(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }

    /// Returns whether the effective user is root.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.euid == 0
    }
}

/// Runs containers on this host.
#[derive(Debug)]
pub struct Launcher {
    config: PulseConfig,
    identity: HostIdentity,
    ownership: OwnershipReconciler,
    network: NetworkProvisioner,
}

impl Launcher {
    /// Creates a launcher for the current process and host.
    #[must_use]
    pub fn new(config: PulseConfig) -> Self {
        let network = NetworkProvisioner::system(config.network.clone());
        Self::with_parts(
            config,
            HostIdentity::current(),
            OwnershipReconciler::detect(),
            network,
        )
    }

    /// Creates a launcher from explicit parts.
    #[must_use]
    pub const fn with_parts(
        config: PulseConfig,
        identity: HostIdentity,
        ownership: OwnershipReconciler,
        network: NetworkProvisioner,
    ) -> Self {
        Self {
            config,
            identity,
            ownership,
            network,
        }
    }

    /// Runs `spec` to completion.
    ///
    /// Networking requires root and is rejected before anything is touched.
    /// When running as root for a sudo user, the rootfs is handed to root for
    /// the run and back to the user afterwards, including on failure.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::PermissionDenied`] for networking without root,
    /// a network error if the bridge or the container interface cannot be set
    /// up, a spawn error, or the container's own failure as
    /// [`PulseError::ContainerExit`] or [`PulseError::ContainerSignaled`].
    pub fn run_container(&self, spec: ContainerSpec) -> Result<()> {
        if spec.network && !self.identity.is_root() {
            return Err(PulseError::PermissionDenied {
                message: "container networking requires root; re-run with sudo".into(),
            });
        }

        let mut container = Container::new(spec);
        tracing::info!(
            rootfs = %container.spec.rootfs.display(),
            network = container.spec.network,
            interactive = container.spec.interactive,
            "starting container"
        );

        if self.ownership.is_active() {
            self.ownership.before_start(&container.spec.rootfs);
            container.transition(ContainerState::OwnershipFixed)?;
        }

        let outcome = self.launch(&mut container);
        self.ownership.after_exit(&container.spec.rootfs);
        match &outcome {
            Ok(()) => container.transition(ContainerState::Exited)?,
            Err(e) => {
                container.fail();
                tracing::info!(pid = ?container.pid, error = %e, "container finished with error");
            }
        }
        outcome
    }

    fn launch(&self, container: &mut Container) -> Result<()> {
        let rootfs = container.spec.rootfs.clone();

        if container.spec.network {
            match self.network.setup_dns(&rootfs) {
                Ok(()) => container.transition(ContainerState::DnsReady)?,
                Err(e) => tracing::warn!(error = %e, "DNS setup failed, continuing without it"),
            }
            let bridge = self.network.setup_networking()?;
            tracing::debug!(?bridge, "bridge ready");
        }

        let request = self.launch_request(&container.spec)?;
        let namespaces = NamespaceConfig::for_caller(self.identity.is_root());

        container.transition(ContainerState::Launching)?;
        let mut child = process::spawn_gated(&request, namespaces.clone_flags())?;
        container.pid = Some(child.pid());

        if let Err(e) = self.prepare(container, &child, namespaces.user) {
            child.kill();
            return Err(e);
        }

        child.release()?;
        container.transition(ContainerState::Running)?;
        tracing::info!(pid = child.pid(), "container running");

        child.wait()?.into_result()
    }

    /// Completes namespace setup while the child is held on its gate.
    fn prepare(&self, container: &mut Container, child: &GatedChild, user_ns: bool) -> Result<()> {
        if user_ns {
            write_id_maps(
                child.pid(),
                IdMapping::root_to(self.identity.uid),
                IdMapping::root_to(self.identity.gid),
            )?;
        }

        if container.spec.network {
            container.transition(ContainerState::NetworkConfiguring)?;
            let id = container.id().ok_or_else(|| PulseError::Config {
                message: "container has no pid".into(),
            })?;
            let veth = self.network.configure_container_network(child.pid(), &id)?;
            tracing::debug!(host = %veth.host, container = %veth.container, "container interface ready");
            container.transition(ContainerState::Configured)?;
        }
        Ok(())
    }

    /// Builds the re-exec request for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] if an argument contains a NUL byte.
    pub fn launch_request(&self, spec: &ContainerSpec) -> Result<LaunchRequest> {
        let command = if spec.command.is_empty() {
            let shell = resolve::default_shell(&spec.rootfs);
            tracing::debug!(shell = %shell, "no command given, using shell");
            vec![shell]
        } else {
            spec.command.clone()
        };

        let program = &self.config.self_exe;
        let mut argv = vec![
            program.to_string_lossy().into_owned(),
            constants::CHILD_MARKER.to_string(),
        ];
        argv.extend(command);

        LaunchRequest::new(
            program,
            &argv,
            &child_env(&spec.rootfs, &spec.env, spec.network),
            spec.interactive,
        )
    }
}

/// Environment of the re-executed child, in precedence order.
#[must_use]
pub fn child_env(rootfs: &Path, extra: &[String], network: bool) -> Vec<String> {
    let mut env = Vec::with_capacity(extra.len() + 3);
    env.push(constants::CONTAINER_PATH.to_string());
    env.extend(extra.iter().cloned());
    env.push(format!("{}={}", constants::ENV_ROOTFS, rootfs.display()));
    env.push(format!("{}={network}", constants::ENV_NETWORK));
    env
}
