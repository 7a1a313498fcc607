//! System-wide constants and fixed names.

/// Name of the per-user state directory under the home directory.
pub const PULSE_DIR_NAME: &str = ".pulse";

/// Subdirectory of the pulse home holding OCI image layouts.
pub const IMAGES_DIR_NAME: &str = "images";

/// Suffix appended to a sanitized image reference to form its directory name.
pub const IMAGE_DIR_SUFFIX: &str = "-oci";

/// Name of the extracted root filesystem inside an image directory.
pub const ROOTFS_DIR_NAME: &str = "rootfs";

/// Sentinel written into the rootfs once every layer has been applied.
pub const EXTRACTION_MARKER: &str = ".extraction_complete";

/// OCI image index file name.
pub const OCI_INDEX_FILE: &str = "index.json";

/// Relative path of the SHA-256 blob store inside an OCI layout.
pub const OCI_BLOBS_SHA256: &str = "blobs/sha256";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Maximum number of layers accepted in a manifest.
pub const MAX_IMAGE_LAYERS: usize = 128;

/// Last-resort home directory when none can be resolved.
pub const FALLBACK_HOME: &str = "/tmp";

// ── Re-exec contract ─────────────────────────────────────────────────

/// First argument that switches the binary into the child role.
pub const CHILD_MARKER: &str = "child";

/// Default re-exec target for the child role.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Environment variable carrying the rootfs path into the child.
pub const ENV_ROOTFS: &str = "PULSE_ROOTFS";

/// Environment variable carrying the network flag into the child.
pub const ENV_NETWORK: &str = "PULSE_NETWORK";

/// Environment variable overriding the pulse home directory.
pub const ENV_HOME_OVERRIDE: &str = "PULSE_HOME";

/// `PATH` given to every container process.
pub const CONTAINER_PATH: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Hostname set inside the UTS namespace.
pub const CONTAINER_HOSTNAME: &str = "container";

/// Shells tried, in order, when no command is supplied.
pub const SHELL_CANDIDATES: [&str; 6] = [
    "/usr/bin/bash",
    "/bin/bash",
    "/usr/bin/sh",
    "/bin/sh",
    "/bin/ash",
    "/bin/dash",
];

/// Shell used when none of [`SHELL_CANDIDATES`] exists in the rootfs.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Directories searched for bare command names inside the container.
pub const COMMAND_SEARCH_PATHS: [&str; 5] =
    ["/usr/bin", "/bin", "/usr/sbin", "/sbin", "/usr/local/bin"];

/// Host devices bind-mounted into the container's `/dev`.
pub const DEVICE_ALLOWLIST: [&str; 5] = ["null", "zero", "random", "urandom", "tty"];

/// Mount options for the container's private `devpts` instance.
pub const DEVPTS_OPTIONS: &str = "newinstance,ptmxmode=0666,mode=0620";

/// Size of the uid/gid range mapped into an unprivileged user namespace.
pub const ID_MAP_RANGE: u32 = 65536;

// ── Sudo identity hints ──────────────────────────────────────────────

/// Original uid of a sudo invocation.
pub const ENV_SUDO_UID: &str = "SUDO_UID";

/// Original gid of a sudo invocation.
pub const ENV_SUDO_GID: &str = "SUDO_GID";

/// Original user name of a sudo invocation.
pub const ENV_SUDO_USER: &str = "SUDO_USER";

// ── Networking ───────────────────────────────────────────────────────

/// Host bridge shared by all containers.
pub const BRIDGE_NAME: &str = "pulse0";

/// Bridge address in CIDR notation.
pub const BRIDGE_CIDR: &str = "172.18.0.1/24";

/// Container subnet masqueraded to the default interface.
pub const CONTAINER_SUBNET: &str = "172.18.0.0/24";

/// Default gateway installed inside every container.
pub const BRIDGE_GATEWAY: &str = "172.18.0.1";

/// First three octets of container addresses.
pub const CONTAINER_IP_PREFIX: &str = "172.18.0";

/// Prefix length of container addresses.
pub const CONTAINER_PREFIX_LEN: u8 = 24;

/// Host interface assumed when the default route cannot be parsed.
pub const FALLBACK_EGRESS_INTERFACE: &str = "eth0";

/// Public resolvers written when the host has no usable nameserver.
pub const FALLBACK_NAMESERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

/// Host resolver configuration read for DNS injection.
pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Kernel switch for IPv4 forwarding.
pub const IP_FORWARD_SYSCTL: &str = "/proc/sys/net/ipv4/ip_forward";
