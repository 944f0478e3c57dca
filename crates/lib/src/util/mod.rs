//! Shared utilities.
//!
//! Filesystem moves for staging trees, download hashing and test helpers.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
