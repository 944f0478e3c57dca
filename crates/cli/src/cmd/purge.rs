use anyhow::{Context, Result};

use nbuild_lib::cache::{CacheLock, purge};
use nbuild_lib::config::Config;

use crate::output::{OutputFormat, print_json, print_purge_report};

pub fn cmd_purge(config: &Config, dry_run: bool, output: OutputFormat) -> Result<()> {
  let _lock = CacheLock::acquire(&config.cache_dir, "purge").context("Failed to acquire cache lock")?;

  let result = purge(&config.cache_dir, dry_run)?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    print_purge_report(&result, dry_run);
  }

  Ok(())
}
