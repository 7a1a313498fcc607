//! # pulse-image
//!
//! OCI image layout handling for the Pulse runtime.
//!
//! Handles:
//! - **Hashing**: SHA-256 verification of content-addressed blobs.
//! - **Manifests**: `index.json` and image manifest parsing.
//! - **Layers**: ordered application of tar layers, including whiteouts.
//! - **Storage**: idempotent extraction into `rootfs/` behind a completion marker.
//! - **Registry**: listing and removal of local images.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod hash;
pub mod layer;
pub mod manifest;
pub mod registry;
pub mod storage;
