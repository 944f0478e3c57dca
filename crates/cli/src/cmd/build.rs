//! Implementation of the `nbuild build` command.
//!
//! Every version of every manifest is built in turn and each resulting
//! package is wrapped into its `.nest` archive. The first failure stops the run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use nbuild_lib::cache::CacheLock;
use nbuild_lib::config::Config;
use nbuild_lib::manifest::load_manifest;

use crate::output::{BuildTotals, print_build_complete, print_built};

pub fn cmd_build(manifests: &[PathBuf], config: &Config) -> Result<()> {
  let start = Instant::now();

  let _lock = CacheLock::acquire(&config.cache_dir, "build").context("Failed to acquire cache lock")?;

  let mut totals = BuildTotals {
    builds: 0,
    archives: 0,
    elapsed: Duration::ZERO,
  };
  for path in manifests {
    let path = dunce::canonicalize(path).with_context(|| format!("Manifest not found: {}", path.display()))?;
    let manifest = load_manifest(&path)?;
    let builds = manifest
      .builds(config)
      .with_context(|| format!("Invalid versions in {}", path.display()))?;

    for mut build in builds {
      let identity = build.identity().to_string();
      let wrapped = build
        .build_and_wrap()
        .with_context(|| format!("Failed to build {identity}"))?;

      for archive in &wrapped {
        info!(archive = %archive.display(), "package written");
      }
      print_built(&identity, &wrapped, &config.output_dir);
      totals.builds += 1;
      totals.archives += wrapped.len();
    }
  }

  totals.elapsed = start.elapsed();
  print_build_complete(&totals);

  Ok(())
}
