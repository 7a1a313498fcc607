//! # pulse-core
//!
//! Low-level Linux isolation primitives for the Pulse runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags, user namespace id maps, and the UTS hostname.
//! - **Filesystem**: pseudo-filesystem mounts, device binds, and the root change.
//! - **Network**: the shared host bridge, NAT, veth pairs, and DNS injection.
//! - **Ownership**: rootfs hand-over between a sudo user and real root.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod namespace;
pub mod network;
pub mod ownership;
pub mod walk;
