//! How nbuild reports to the terminal.
//!
//! Reports are assembled as plain text and only colored when printed, so the
//! wording can be checked without a terminal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use nbuild_lib::cache::PurgeResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    self == OutputFormat::Json
  }
}

/// Marker in front of a headline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Done,
  Skipped,
  Failed,
}

fn headline(mark: Mark, text: &str) {
  match mark {
    Mark::Done => println!(
      "{} {}",
      "==>".if_supports_color(Stream::Stdout, |m| m.green()),
      text.if_supports_color(Stream::Stdout, |t| t.bold())
    ),
    Mark::Skipped => eprintln!(
      "{} {}",
      "==>".if_supports_color(Stream::Stderr, |m| m.yellow()),
      text.if_supports_color(Stream::Stderr, |t| t.yellow())
    ),
    Mark::Failed => eprintln!(
      "{} {}",
      "error:".if_supports_color(Stream::Stderr, |m| m.red()),
      text
    ),
  }
}

fn detail(line: &str) {
  println!("    {}", line.if_supports_color(Stream::Stdout, |l| l.dimmed()));
}

fn plural(count: usize, one: &str, many: &str) -> String {
  if count == 1 {
    format!("1 {one}")
  } else {
    format!("{count} {many}")
  }
}

/// Binary units with one decimal; exact below 1 KiB.
fn human_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.1} {}", UNITS[unit])
}

/// `850ms`, `12.3s` or `4m07s`.
fn human_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  if secs >= 60 {
    format!("{}m{:02}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{:.1}s", elapsed.as_secs_f64())
  } else {
    format!("{}ms", elapsed.as_millis())
  }
}

fn built_headline(identity: &str, archives: usize) -> String {
  if archives == 0 {
    format!("{identity} produced no package")
  } else {
    format!("Built {identity} ({})", plural(archives, "package", "packages"))
  }
}

/// An archive path, shown relative to the output directory when below it.
fn archive_line(archive: &Path, output_dir: &Path) -> String {
  let shown = archive.strip_prefix(output_dir).unwrap_or(archive);
  format!("-> {}", shown.display())
}

/// Report one finished build and the archives it wrapped.
pub fn print_built(identity: &str, archives: &[PathBuf], output_dir: &Path) {
  let mark = if archives.is_empty() { Mark::Skipped } else { Mark::Done };
  headline(mark, &built_headline(identity, archives.len()));
  for archive in archives {
    detail(&archive_line(archive, output_dir));
  }
}

/// Totals of a whole `build` run.
#[derive(Debug, Clone, Copy)]
pub struct BuildTotals {
  pub builds: usize,
  pub archives: usize,
  pub elapsed: Duration,
}

fn build_complete(totals: &BuildTotals) -> String {
  format!(
    "Build complete: {} from {} in {}",
    plural(totals.archives, "package", "packages"),
    plural(totals.builds, "build", "builds"),
    human_elapsed(totals.elapsed)
  )
}

pub fn print_build_complete(totals: &BuildTotals) {
  println!();
  headline(Mark::Done, &build_complete(totals));
}

fn purge_headline(result: &PurgeResult, dry_run: bool) -> String {
  let entries = plural(result.stats.entries_deleted, "cache entry", "cache entries");
  let size = human_size(result.stats.bytes_freed);
  if dry_run {
    format!("Dry run: {entries} would be removed, freeing {size}")
  } else {
    format!("Cache purged: {entries} removed, {size} freed")
  }
}

/// Report a purge and the cache directories it touched.
pub fn print_purge_report(result: &PurgeResult, dry_run: bool) {
  headline(Mark::Done, &purge_headline(result, dry_run));
  for path in &result.deleted_paths {
    detail(&path.display().to_string());
  }
}

fn field_line(label: &str, value: &str) -> String {
  format!("{label:>12}  {value}")
}

/// One aligned `label  value` line.
pub fn print_field(label: &str, value: &str) {
  println!("{}", field_line(label, value));
}

pub fn print_failure(message: &str) {
  headline(Mark::Failed, message);
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}
