//! Filesystem layer application.
//!
//! Layers are applied bottom to top onto a single mutable rootfs. OCI
//! whiteouts delete entries from lower layers:
//!
//! - `.wh.<name>` removes `<name>` from the same directory.
//! - `.wh..wh..opq` empties the directory it appears in.
//!
//! Every entry is placed relative to the rootfs. `..` components are
//! rejected and parent directories are resolved one component at a time, so
//! a symlink planted by an earlier entry cannot redirect a write outside the
//! rootfs. Directory modes are applied once all layers are in, so a
//! read-only directory never blocks entries that a later layer adds to it.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use pulse_common::error::{PulseError, Result};

/// Whiteout prefix for deleted entries.
const WHITEOUT_PREFIX: &str = ".wh.";

/// Opaque directory marker.
const WHITEOUT_OPAQUE: &str = ".wh..wh..opq";

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Permission bits kept from tar headers.
const MODE_MASK: u32 = 0o7777;

/// Owner bits kept on directories while layers are still being applied.
const OWNER_RWX: u32 = 0o700;

/// Counts from one applied layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    /// Entries written to the rootfs.
    pub entries: usize,
    /// Whiteout markers processed.
    pub whiteouts: usize,
    /// Entries of unsupported types (devices, fifos) that were skipped.
    pub skipped: usize,
}

/// Applies tar layers onto a rootfs directory.
#[derive(Debug)]
pub struct LayerApplier {
    root: PathBuf,
    deferred_dirs: Vec<(PathBuf, u32)>,
    layers: usize,
}

impl LayerApplier {
    /// Prepares to apply layers into `rootfs`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or resolved.
    pub fn new(rootfs: &Path) -> Result<Self> {
        fs::create_dir_all(rootfs).map_err(|e| PulseError::io(rootfs, e))?;
        let root = fs::canonicalize(rootfs).map_err(|e| PulseError::io(rootfs, e))?;
        Ok(Self {
            root,
            deferred_dirs: Vec::new(),
            layers: 0,
        })
    }

    /// Applies the layer blob at `blob`, gzip-compressed or plain tar.
    ///
    /// # Errors
    ///
    /// Returns an image error if the archive cannot be decoded or contains
    /// an unsafe path, or an I/O error if writing the rootfs fails.
    pub fn apply(&mut self, blob: &Path) -> Result<LayerStats> {
        let file = fs::File::open(blob).map_err(|e| PulseError::io(blob, e))?;
        let mut reader = BufReader::new(file);
        let gzip = reader
            .fill_buf()
            .map_err(|e| PulseError::io(blob, e))?
            .starts_with(&GZIP_MAGIC);

        let stats = if gzip {
            self.apply_reader(GzDecoder::new(reader))?
        } else {
            self.apply_reader(reader)?
        };
        tracing::debug!(
            layer = %blob.display(),
            gzip,
            entries = stats.entries,
            whiteouts = stats.whiteouts,
            "layer applied"
        );
        Ok(stats)
    }

    /// Applies an uncompressed tar stream.
    ///
    /// # Errors
    ///
    /// See [`LayerApplier::apply`].
    pub fn apply_reader<R: Read>(&mut self, reader: R) -> Result<LayerStats> {
        let mut stats = LayerStats::default();
        let mut archive = tar::Archive::new(reader);
        let entries = archive.entries().map_err(decode_error)?;
        for entry in entries {
            let mut entry = entry.map_err(decode_error)?;
            self.apply_entry(&mut entry, &mut stats)?;
        }
        self.layers += 1;
        Ok(stats)
    }

    /// Applies the recorded directory modes and returns the number of layers
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory mode cannot be set.
    pub fn finish(mut self) -> Result<usize> {
        // Deepest first, so a read-only parent is locked after its children.
        self.deferred_dirs
            .sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
        for (dir, mode) in &self.deferred_dirs {
            let still_dir = fs::symlink_metadata(dir).is_ok_and(|meta| meta.is_dir());
            if !still_dir {
                tracing::debug!(path = %dir.display(), "directory replaced, mode not applied");
                continue;
            }
            fs::set_permissions(dir, fs::Permissions::from_mode(*mode))
                .map_err(|e| PulseError::io(dir, e))?;
        }
        Ok(self.layers)
    }

    fn apply_entry<R: Read>(
        &mut self,
        entry: &mut tar::Entry<'_, R>,
        stats: &mut LayerStats,
    ) -> Result<()> {
        let raw_path = entry.path().map_err(decode_error)?.into_owned();
        let Some(rel) = normalize_entry_path(&raw_path)? else {
            return Ok(());
        };
        let (parent_rel, name) = split_parent(&rel);
        let name_str = name.to_string_lossy();

        if name_str == WHITEOUT_OPAQUE {
            if let Some(dir) = self.resolve_dir(parent_rel, false)? {
                clear_directory(&dir)?;
                self.forget_deferred(&dir, false);
            }
            stats.whiteouts += 1;
            return Ok(());
        }
        if let Some(victim) = name_str.strip_prefix(WHITEOUT_PREFIX) {
            let victim = whiteout_victim(victim, &raw_path)?;
            if let Some(dir) = self.resolve_dir(parent_rel, false)? {
                let doomed = dir.join(victim);
                remove_existing(&doomed)?;
                self.forget_deferred(&doomed, true);
            }
            stats.whiteouts += 1;
            return Ok(());
        }

        let header = entry.header();
        let entry_type = header.entry_type();
        let mode = header.mode().map_err(decode_error)? & MODE_MASK;
        let link_name = entry
            .link_name()
            .map_err(decode_error)?
            .map(std::borrow::Cow::into_owned);

        let parent = self
            .resolve_dir(parent_rel, true)?
            .ok_or_else(|| escape_error(&raw_path))?;
        let target = parent.join(name);

        match entry_type {
            tar::EntryType::Directory => self.make_dir(&target, mode)?,
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                write_file(entry, &target, mode)?;
                self.forget_deferred(&target, true);
            }
            tar::EntryType::Symlink => {
                let link = link_name.ok_or_else(|| missing_link(&raw_path))?;
                make_symlink(&link, &target)?;
            }
            tar::EntryType::Link => {
                let link = link_name.ok_or_else(|| missing_link(&raw_path))?;
                self.make_hard_link(&link, &target)?;
                self.forget_deferred(&target, true);
            }
            other => {
                tracing::debug!(path = %raw_path.display(), entry_type = ?other, "skipping entry");
                stats.skipped += 1;
                return Ok(());
            }
        }
        stats.entries += 1;
        Ok(())
    }

    /// Resolves a rootfs-relative directory to a real path inside the rootfs.
    ///
    /// Missing components are created when `create` is set; otherwise
    /// `None` is returned. Symlinked components are followed only while they
    /// stay inside the rootfs.
    fn resolve_dir(&self, rel: &Path, create: bool) -> Result<Option<PathBuf>> {
        let mut current = self.root.clone();
        for component in rel.components() {
            let next = current.join(component);
            match fs::symlink_metadata(&next) {
                Ok(meta) if meta.is_dir() => current = next,
                Ok(meta) if meta.file_type().is_symlink() => {
                    current = self.follow_dir_link(&next)?;
                }
                Ok(_) => {
                    return Err(PulseError::InvalidImage {
                        message: format!("{} is not a directory", next.display()),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if !create {
                        return Ok(None);
                    }
                    fs::DirBuilder::new()
                        .mode(0o755)
                        .create(&next)
                        .map_err(|e| PulseError::io(&next, e))?;
                    current = next;
                }
                Err(e) => return Err(PulseError::io(&next, e)),
            }
        }
        Ok(Some(current))
    }

    /// Follows a symlinked directory, interpreting absolute targets relative
    /// to the rootfs.
    fn follow_dir_link(&self, link: &Path) -> Result<PathBuf> {
        let target = fs::read_link(link).map_err(|e| PulseError::io(link, e))?;
        let candidate = if target.is_absolute() {
            self.root.join(target.strip_prefix("/").unwrap_or(&target))
        } else {
            link.parent().unwrap_or(&self.root).join(&target)
        };
        let resolved = fs::canonicalize(&candidate).map_err(|e| PulseError::io(&candidate, e))?;
        if !resolved.starts_with(&self.root) || !resolved.is_dir() {
            return Err(escape_error(link));
        }
        Ok(resolved)
    }

    fn make_dir(&mut self, target: &Path, mode: u32) -> Result<()> {
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                remove_existing(target)?;
                create_dir(target)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => create_dir(target)?,
            Err(e) => return Err(PulseError::io(target, e)),
        }
        fs::set_permissions(target, fs::Permissions::from_mode(mode | OWNER_RWX))
            .map_err(|e| PulseError::io(target, e))?;
        self.deferred_dirs.push((target.to_path_buf(), mode));
        Ok(())
    }

    /// Drops recorded modes for directories removed under `path`.
    fn forget_deferred(&mut self, path: &Path, include_self: bool) {
        self.deferred_dirs
            .retain(|(dir, _)| !(dir.starts_with(path) && (include_self || dir != path)));
    }

    fn make_hard_link(&self, link: &Path, target: &Path) -> Result<()> {
        let rel = normalize_entry_path(link)?.ok_or_else(|| escape_error(link))?;
        let (parent_rel, name) = split_parent(&rel);
        let source = self
            .resolve_dir(parent_rel, false)?
            .map(|dir| dir.join(name))
            .filter(|p| p.symlink_metadata().is_ok())
            .ok_or_else(|| PulseError::InvalidImage {
                message: format!("hard link target {} missing", link.display()),
            })?;
        remove_existing(target)?;
        fs::hard_link(&source, target).map_err(|e| PulseError::io(target, e))
    }
}

/// Strips root and `.` components from a tar entry path.
///
/// Returns `None` for the archive root itself.
///
/// # Errors
///
/// Returns [`PulseError::InvalidImage`] for paths containing `..`.
pub fn normalize_entry_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return Err(escape_error(path)),
        }
    }
    Ok((!out.as_os_str().is_empty()).then_some(out))
}

/// Checks that a whiteout names a single entry of its directory.
fn whiteout_victim<'a>(victim: &'a str, raw: &Path) -> Result<&'a str> {
    let mut components = Path::new(victim).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !victim.contains('/') => Ok(victim),
        _ => Err(PulseError::InvalidImage {
            message: format!("whiteout {} does not name an entry", raw.display()),
        }),
    }
}

fn split_parent(rel: &Path) -> (&Path, &std::ffi::OsStr) {
    let parent = rel.parent().unwrap_or_else(|| Path::new(""));
    let name = rel.file_name().unwrap_or(rel.as_os_str());
    (parent, name)
}

fn create_dir(target: &Path) -> Result<()> {
    fs::DirBuilder::new()
        .mode(0o755)
        .create(target)
        .map_err(|e| PulseError::io(target, e))
}

fn write_file<R: Read>(entry: &mut tar::Entry<'_, R>, target: &Path, mode: u32) -> Result<()> {
    remove_existing(target)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(target)
        .map_err(|e| PulseError::io(target, e))?;
    let _ = std::io::copy(entry, &mut file).map_err(|e| PulseError::io(target, e))?;
    drop(file);
    fs::set_permissions(target, fs::Permissions::from_mode(mode))
        .map_err(|e| PulseError::io(target, e))
}

/// Creates a symlink, replacing a previous non-directory entry.
///
/// An existing directory at the same path is kept.
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            tracing::debug!(path = %target.display(), "keeping existing directory over symlink");
            return Ok(());
        }
        Ok(_) => remove_existing(target)?,
        Err(_) => {}
    }
    match std::os::unix::fs::symlink(link, target) {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        other => other.map_err(|e| PulseError::io(target, e)),
    }
}

/// Removes whatever is at `path` without following symlinks.
fn remove_existing(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| PulseError::io(path, e))
}

fn clear_directory(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| PulseError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PulseError::io(dir, e))?;
        remove_existing(&entry.path())?;
    }
    Ok(())
}

fn decode_error(e: std::io::Error) -> PulseError {
    PulseError::InvalidImage {
        message: format!("tar decode failed: {e}"),
    }
}

fn escape_error(path: &Path) -> PulseError {
    PulseError::InvalidImage {
        message: format!("entry {} escapes the rootfs", path.display()),
    }
}

fn missing_link(path: &Path) -> PulseError {
    PulseError::InvalidImage {
        message: format!("link entry {} has no target", path.display()),
    }
}
