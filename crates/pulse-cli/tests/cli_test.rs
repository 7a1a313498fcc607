//! Integration tests for the `pulse` binary.
//!
//! Store management and argument handling run anywhere. Running real
//! containers needs root and a stored image, so those tests are ignored by
//! default and read the image reference from `PULSE_TEST_IMAGE`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use sha2::{Digest, Sha256};

// ── Fixtures ─────────────────────────────────────────────────────────

fn pulse(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pulse"))
        .args(args)
        .env("PULSE_HOME", home)
        .env_remove("SUDO_UID")
        .env_remove("SUDO_GID")
        .output()
        .expect("spawn pulse")
}

fn write_blob(image_dir: &Path, data: &[u8]) -> String {
    let hex: String = Sha256::digest(data).iter().map(|b| format!("{b:02x}")).collect();
    let blobs = image_dir.join("blobs/sha256");
    std::fs::create_dir_all(&blobs).expect("mkdir blobs");
    std::fs::write(blobs.join(&hex), data).expect("write blob");
    format!("sha256:{hex}")
}

fn store_single_layer_image(home: &Path, dir_name: &str) {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_mode(0o644);
    header.set_size(5);
    builder.append_data(&mut header, "etc/issue", &b"pulse"[..]).expect("append");
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&builder.into_inner().expect("tar")).expect("gzip");
    let layer = enc.finish().expect("gzip finish");

    let image_dir = home.join("images").join(dir_name);
    let layer_digest = write_blob(&image_dir, &layer);
    let manifest = serde_json::json!({ "schemaVersion": 2, "layers": [{ "digest": layer_digest }] });
    let manifest_digest = write_blob(&image_dir, manifest.to_string().as_bytes());
    let index = serde_json::json!({ "schemaVersion": 2, "manifests": [{ "digest": manifest_digest }] });
    std::fs::write(image_dir.join("index.json"), index.to_string()).expect("index");
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ── Image store ──────────────────────────────────────────────────────

#[test]
fn images_on_empty_home_prints_header() {
    let home = tempfile::tempdir().expect("tempdir");
    let out = pulse(home.path(), &["images"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "IMAGE  MODIFIED  EXTRACTED\n");
}

#[test]
fn images_then_rmi() {
    let home = tempfile::tempdir().expect("tempdir");
    store_single_layer_image(home.path(), "alpine_3.20-oci");

    let listed = pulse(home.path(), &["images", "--quiet"]);
    assert_eq!(stdout(&listed), "alpine_3.20-oci\n");

    let removed = pulse(home.path(), &["rmi", "alpine:3.20"]);
    assert!(removed.status.success(), "{}", stderr(&removed));
    assert_eq!(stdout(&removed), "Successfully removed image: alpine:3.20\n");
    assert!(!home.path().join("images/alpine_3.20-oci").exists());
}

#[test]
fn rmi_of_unknown_image_fails() {
    let home = tempfile::tempdir().expect("tempdir");
    let out = pulse(home.path(), &["rmi", "ghost"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("not found"), "{}", stderr(&out));
}

// ── Child role ───────────────────────────────────────────────────────

#[test]
fn child_without_rootfs_reports_container_error() {
    let home = tempfile::tempdir().expect("tempdir");
    let out = Command::new(env!("CARGO_BIN_EXE_pulse"))
        .args(["child", "/bin/true"])
        .env("PULSE_HOME", home.path())
        .env_remove("PULSE_ROOTFS")
        .output()
        .expect("spawn pulse");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Container error: "), "{}", stderr(&out));
}

// ── Privileged runs ──────────────────────────────────────────────────

fn test_image() -> String {
    std::env::var("PULSE_TEST_IMAGE").expect("PULSE_TEST_IMAGE names a stored image")
}

#[test]
#[ignore = "requires root and a stored image named by PULSE_TEST_IMAGE"]
fn run_echo_without_network() {
    let home = std::env::var("PULSE_HOME").expect("PULSE_HOME");
    let out = pulse(Path::new(&home), &["run", &test_image(), "/bin/echo", "hi"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "hi\n");
}

#[test]
#[ignore = "requires root and a stored image named by PULSE_TEST_IMAGE"]
fn container_exit_status_is_propagated() {
    let home = std::env::var("PULSE_HOME").expect("PULSE_HOME");
    let out = pulse(Path::new(&home), &["run", &test_image(), "/bin/sh", "-c", "exit 3"]);
    assert_eq!(out.status.code(), Some(3));
}

#[test]
#[ignore = "requires root and a stored image named by PULSE_TEST_IMAGE"]
fn hostname_is_container() {
    let home = std::env::var("PULSE_HOME").expect("PULSE_HOME");
    let out = pulse(Path::new(&home), &["run", &test_image(), "hostname"]);
    assert_eq!(stdout(&out).trim(), "container");
}
