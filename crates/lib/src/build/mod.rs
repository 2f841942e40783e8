//! Artifact building.
//!
//! A build runs inside a leased build environment, so a [`Builder`] can only
//! be invoked once the provisioner has handed out an
//! [`EnvLease`](crate::env::EnvLease). The actual compilation is delegated to
//! a [`Toolchain`].
//!
//! # Submodules
//!
//! - [`builder`] - per-unit build directories, flag threading, artifact checks
//! - [`toolchain`] - the toolchain trait and the command-template implementation

pub mod builder;
pub mod toolchain;
mod types;

pub use builder::Builder;
pub use toolchain::{CommandToolchain, Toolchain};
pub use types::*;
