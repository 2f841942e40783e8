//! wheelhouse-lib: build-and-verify orchestration for Python distributions
//!
//! This crate provides the pieces of a wheelhouse pipeline run:
//! - `matrix`: the configuration axes and the build units they expand into
//! - `env`: isolated interpreter environments and their lifecycle
//! - `build`: driving the native toolchain for one unit
//! - `verify`: installing and smoke-testing an artifact in a clean environment
//! - `publish`: uploading verified artifacts to a package index
//! - `pipeline`: scheduling units, aggregating results and gating publication

pub mod build;
pub mod cmd;
pub mod config;
pub mod consts;
pub mod dist;
pub mod env;
pub mod matrix;
pub mod pipeline;
pub mod placeholder;
pub mod platform;
pub mod publish;
pub mod util;
pub mod verify;
