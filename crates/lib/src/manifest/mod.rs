//! Build manifests: what to build, for which versions, and how.
//!
//! A [`BuildManifest`] is usually produced from a TOML file by [`load_manifest`],
//! but any Rust closure can serve as the instructions.

mod file;
mod types;

pub use file::*;
pub use types::*;
