//! Filesystem management for container isolation.
//!
//! Provides the in-namespace mount sequence and the `chroot` root change.

pub mod chroot;
pub mod mount;
