//! Container launching for the Pulse runtime.
//!
//! The launcher side prepares the host and clones a gated child into fresh
//! namespaces; the child side ([`child`]) runs inside them after re-exec.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod child;
pub mod container;
pub mod engine;
pub mod launcher;
pub mod process;
pub mod resolve;
