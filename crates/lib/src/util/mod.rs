//! Shared utilities.
//!
//! Hashing helpers and, under test, recording fakes for the external
//! collaborators.

pub mod hash;

#[cfg(test)]
pub mod testutil;
