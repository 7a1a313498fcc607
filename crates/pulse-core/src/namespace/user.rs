//! User namespace id mapping.
//!
//! Maps uid/gid 0 inside the container to the unprivileged caller on the
//! host, making the caller root inside its own namespaces.

use std::path::Path;

use pulse_common::constants;
use pulse_common::error::{PulseError, Result};

/// One line of a `uid_map` or `gid_map` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    /// First id inside the namespace.
    pub container_id: u32,
    /// First id on the host.
    pub host_id: u32,
    /// Number of consecutive ids mapped.
    pub range: u32,
}

impl IdMapping {
    /// Maps container root onto `host_id` with the default range.
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            range: constants::ID_MAP_RANGE,
        }
    }

    /// Returns the same mapping narrowed to a single id.
    #[must_use]
    pub const fn single(self) -> Self {
        Self { range: 1, ..self }
    }

    /// Renders the mapping in `/proc/<pid>/uid_map` syntax.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.container_id, self.host_id, self.range)
    }
}

/// Writes uid and gid maps for the process `pid`.
///
/// `setgroups` is denied first, as the kernel requires for unprivileged
/// gid maps. An unprivileged writer may only map its own id, so when the
/// full range is refused with `EPERM` the map is retried with a single id.
///
/// # Errors
///
/// Returns an error if the `setgroups`, `uid_map` or `gid_map` write fails.
pub fn write_id_maps(pid: u32, uid: IdMapping, gid: IdMapping) -> Result<()> {
    write_id_maps_under(Path::new("/proc"), pid, uid, gid)
}

/// Same as [`write_id_maps`] with an explicit procfs root.
///
/// # Errors
///
/// See [`write_id_maps`].
pub fn write_id_maps_under(proc_root: &Path, pid: u32, uid: IdMapping, gid: IdMapping) -> Result<()> {
    let base = proc_root.join(pid.to_string());

    let setgroups = base.join("setgroups");
    if setgroups.exists() {
        std::fs::write(&setgroups, "deny").map_err(|e| PulseError::io(&setgroups, e))?;
    }

    let uid_written = write_map(&base.join("uid_map"), uid)?;
    let gid_written = write_map(&base.join("gid_map"), gid)?;

    tracing::debug!(
        pid,
        uid_map = %uid_written.to_line(),
        gid_map = %gid_written.to_line(),
        "wrote UID/GID map"
    );
    Ok(())
}

fn write_map(path: &Path, mapping: IdMapping) -> Result<IdMapping> {
    match std::fs::write(path, mapping.to_line()) {
        Ok(()) => Ok(mapping),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && mapping.range > 1 => {
            let narrowed = mapping.single();
            tracing::debug!(path = %path.display(), "full id range refused, mapping a single id");
            std::fs::write(path, narrowed.to_line()).map_err(|e| PulseError::PermissionDenied {
                message: format!("writing {}: {e}", path.display()),
            })?;
            Ok(narrowed)
        }
        Err(e) => Err(PulseError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_mapping_uses_default_range() {
        let m = IdMapping::root_to(1000);
        assert_eq!(m.to_line(), "0 1000 65536");
        assert_eq!(m.single().to_line(), "0 1000 1");
    }

    #[test]
    fn writes_setgroups_before_maps() {
        let proc_root = tempfile::tempdir().expect("tempdir");
        let base = proc_root.path().join("77");
        std::fs::create_dir_all(&base).expect("mkdir");
        std::fs::write(base.join("setgroups"), "allow").expect("write");

        write_id_maps_under(
            proc_root.path(),
            77,
            IdMapping::root_to(1000),
            IdMapping::root_to(100),
        )
        .expect("write maps");

        let read = |name: &str| std::fs::read_to_string(base.join(name)).expect("read");
        assert_eq!(read("setgroups"), "deny");
        assert_eq!(read("uid_map"), "0 1000 65536");
        assert_eq!(read("gid_map"), "0 100 65536");
    }

    #[test]
    fn missing_process_is_an_io_error() {
        let proc_root = tempfile::tempdir().expect("tempdir");
        let err = write_id_maps_under(
            proc_root.path(),
            1,
            IdMapping::root_to(0),
            IdMapping::root_to(0),
        )
        .expect_err("no such pid dir");
        assert!(matches!(err, PulseError::Io { .. }));
    }
}
