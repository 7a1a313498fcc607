//! Integration tests for OCI layout extraction.
//!
//! Each test writes a real OCI layout (`index.json`, manifest blob, gzip
//! layer blobs under `blobs/sha256`) into a scratch images directory and
//! drives [`ImageStore::extract`] against it.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use pulse_common::error::PulseError;
use pulse_common::types::ImageRef;
use pulse_image::storage::ImageStore;
use sha2::{Digest, Sha256};

// ── Fixtures ─────────────────────────────────────────────────────────

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn write_blob(image_dir: &Path, data: &[u8]) -> String {
    let hex = sha256_hex(data);
    let blobs = image_dir.join("blobs/sha256");
    std::fs::create_dir_all(&blobs).expect("mkdir blobs");
    std::fs::write(blobs.join(&hex), data).expect("write blob");
    format!("sha256:{hex}")
}

/// Builds a gzip layer; names ending in `/` become directories.
fn gzip_layer(files: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, mode, data) in files {
        let mut header = tar::Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
        }
        header.set_mode(*mode);
        header.set_size(data.len() as u64);
        builder.append_data(&mut header, name, *data).expect("append");
    }
    let tar = builder.into_inner().expect("tar");
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&tar).expect("gzip");
    enc.finish().expect("gzip finish")
}

/// Writes an OCI layout for `image` and returns the layer digests.
fn write_layout(store: &ImageStore, image: &ImageRef, layers: &[Vec<u8>]) -> Vec<String> {
    let image_dir = store.image_dir(image);
    let digests: Vec<String> = layers.iter().map(|l| write_blob(&image_dir, l)).collect();

    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "layers": digests.iter().map(|d| serde_json::json!({
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "digest": d,
        })).collect::<Vec<_>>(),
    });
    let manifest_digest = write_blob(&image_dir, manifest.to_string().as_bytes());

    let index = serde_json::json!({
        "schemaVersion": 2,
        "manifests": [{ "digest": manifest_digest }],
    });
    std::fs::write(image_dir.join("index.json"), index.to_string()).expect("index");
    digests
}

fn blob_path(store: &ImageStore, image: &ImageRef, digest: &str) -> std::path::PathBuf {
    store
        .image_dir(image)
        .join("blobs/sha256")
        .join(digest.trim_start_matches("sha256:"))
}

// ── Extraction ───────────────────────────────────────────────────────

#[test]
fn two_layer_image_produces_merged_rootfs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("docker.io/library/tiny:1");
    let layer_a = gzip_layer(&[("bin/sh", 0o755, b"#!shell"), ("etc/issue", 0o600, b"old")]);
    let layer_b = gzip_layer(&[("etc/issue", 0o644, b"Tiny Linux\n")]);
    let _ = write_layout(&store, &image, &[layer_a, layer_b]);

    let rootfs = store.extract(&image).expect("extract");

    assert_eq!(rootfs, store.rootfs_dir(&image));
    let sh = std::fs::metadata(rootfs.join("bin/sh")).expect("sh");
    assert_eq!(sh.permissions().mode() & 0o7777, 0o755);
    assert_eq!(
        std::fs::read_to_string(rootfs.join("etc/issue")).expect("issue"),
        "Tiny Linux\n"
    );
    let issue = std::fs::metadata(rootfs.join("etc/issue")).expect("issue");
    assert_eq!(issue.permissions().mode() & 0o7777, 0o644);
    assert!(rootfs.join(".extraction_complete").exists());
    assert!(store.is_extracted(&image));
}

#[test]
fn upper_layer_whiteouts_remove_lower_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("whiteouts");
    let lower = gzip_layer(&[
        ("var/cache/", 0o755, b""),
        ("var/cache/apk/", 0o750, b""),
        ("var/cache/apk/index", 0o644, b"idx"),
        ("opt/app/", 0o700, b""),
        ("opt/app/run", 0o755, b"run"),
        ("opt/keep", 0o644, b"keep"),
    ]);
    let upper = gzip_layer(&[
        ("var/cache/.wh..wh..opq", 0o644, b""),
        ("var/cache/fresh", 0o644, b"new"),
        ("opt/.wh.app", 0o644, b""),
    ]);
    let _ = write_layout(&store, &image, &[lower, upper]);

    let rootfs = store.extract(&image).expect("extract");

    let cache: Vec<_> = std::fs::read_dir(rootfs.join("var/cache"))
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name())
        .collect();
    assert_eq!(cache, vec![std::ffi::OsString::from("fresh")]);
    assert!(!rootfs.join("opt/app").exists());
    assert!(!rootfs.join("opt/.wh.app").exists());
    assert_eq!(std::fs::read(rootfs.join("opt/keep")).expect("keep"), b"keep");
    assert!(store.is_extracted(&image));
}

#[test]
fn second_extract_does_not_decode_layers_again() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("idem");
    let digests = write_layout(&store, &image, &[gzip_layer(&[("hello", 0o644, b"hi")])]);

    let first = store.extract(&image).expect("first");
    // Corrupting the blob proves the second call never reads it.
    std::fs::write(blob_path(&store, &image, &digests[0]), b"garbage").expect("corrupt");
    let second = store.extract(&image).expect("second");

    assert_eq!(first, second);
    assert_eq!(std::fs::read(second.join("hello")).expect("read"), b"hi");
}

#[test]
fn file_modes_survive_across_layers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("modes");
    let _ = write_layout(
        &store,
        &image,
        &[
            gzip_layer(&[("usr/bin/tool", 0o750, b"a"), ("etc/shadow", 0o640, b"b")]),
            gzip_layer(&[("usr/bin/tool", 0o711, b"c"), ("tmp/sticky", 0o1644, b"d")]),
        ],
    );

    let rootfs = store.extract(&image).expect("extract");
    let mode = |p: &str| {
        std::fs::metadata(rootfs.join(p))
            .expect("stat")
            .permissions()
            .mode()
            & 0o7777
    };
    assert_eq!(mode("usr/bin/tool"), 0o711);
    assert_eq!(mode("etc/shadow"), 0o640);
    assert_eq!(mode("tmp/sticky"), 0o1644);
}

// ── Failure cleanup ──────────────────────────────────────────────────

#[test]
fn undecodable_layer_leaves_no_rootfs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("corrupt");
    let good = gzip_layer(&[("ok", 0o644, b"ok")]);
    // Gzip magic with an unknown compression method.
    let bad = vec![0x1f, 0x8b, 0x00, 0, 0, 0, 0, 0, 0, 0];
    let _ = write_layout(&store, &image, &[good, bad]);

    let err = store.extract(&image).expect_err("bad layer");
    assert!(matches!(err, PulseError::InvalidImage { .. }));
    assert!(!store.rootfs_dir(&image).exists());
}

#[test]
fn tampered_blob_fails_digest_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("tampered");
    let digests = write_layout(&store, &image, &[gzip_layer(&[("f", 0o644, b"x")])]);
    let replacement = gzip_layer(&[("f", 0o644, b"evil")]);
    std::fs::write(blob_path(&store, &image, &digests[0]), replacement).expect("tamper");

    let err = store.extract(&image).expect_err("mismatch");
    assert!(matches!(err, PulseError::HashMismatch { .. }));
    assert!(!store.rootfs_dir(&image).exists());
}

#[test]
fn missing_layer_blob_is_an_image_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("missing");
    let digests = write_layout(&store, &image, &[gzip_layer(&[("f", 0o644, b"x")])]);
    std::fs::remove_file(blob_path(&store, &image, &digests[0])).expect("rm");

    let err = store.extract(&image).expect_err("missing blob");
    assert!(matches!(err, PulseError::InvalidImage { .. }));
    assert!(!store.is_extracted(&image));
}

#[test]
fn interrupted_extraction_is_restarted_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("restart");
    let _ = write_layout(&store, &image, &[gzip_layer(&[("fresh", 0o644, b"1")])]);
    let stale = store.rootfs_dir(&image).join("stale-from-crash");
    std::fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
    std::fs::write(&stale, b"old").expect("write");

    let rootfs = store.extract(&image).expect("extract");
    assert!(!stale.exists());
    assert!(rootfs.join("fresh").exists());
}

// ── Listing and removal ──────────────────────────────────────────────

#[test]
fn list_then_remove_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ImageStore::new(dir.path());
    let image = ImageRef::new("alpine:3.20");
    let _ = write_layout(&store, &image, &[gzip_layer(&[("a", 0o644, b"a")])]);
    let _ = store.extract(&image).expect("extract");

    let listed = store.list().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "alpine_3.20-oci");
    assert!(listed[0].extracted);

    let _ = store.remove(&image).expect("remove");
    assert!(store.list().expect("list").is_empty());
    assert!(matches!(
        store.remove(&image),
        Err(PulseError::NotFound { .. })
    ));
}
