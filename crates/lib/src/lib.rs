//! nbuild-lib: Core types and logic for nbuild
//!
//! This crate turns build manifests into distributable packages:
//! - `BuildManifest`: metadata, versioned arguments and build instructions
//! - `Build`: one version of a manifest, with its caches and command context
//! - `Template`: the fetch to dependency-link step pipeline
//! - `Package`: a staged output, wrapped into a `.nest` archive
//! - `split` / `deplink`: partitioning an install tree and linking ELF dependencies

pub mod build;
pub mod cache;
pub mod check;
pub mod config;
pub mod consts;
pub mod deplink;
pub mod fetch;
pub mod graph;
pub mod manifest;
pub mod package;
pub mod pattern;
pub mod platform;
pub mod split;
pub mod template;
pub mod util;
