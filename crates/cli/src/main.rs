mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nbuild_lib::config::Config;

use cmd::{cmd_build, cmd_info, cmd_purge};
use output::{OutputFormat, print_failure};

/// nbuild - build packages from declarative manifests
#[derive(Parser)]
#[command(name = "nbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Directory receiving the built packages
  #[arg(short, long, global = true)]
  output_dir: Option<PathBuf>,

  /// Root of the download, build, install and wrap caches
  #[arg(short, long, global = true)]
  cache_dir: Option<PathBuf>,

  /// Repository the built packages belong to
  #[arg(short, long, global = true)]
  repository: Option<String>,

  /// Configuration file (default: <config dir>/nbuild/config.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Increase logging verbosity; also forwards build tool output
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build and wrap the packages of one or more manifests
  Build {
    /// Manifest files (TOML)
    #[arg(required = true)]
    manifests: Vec<PathBuf>,
  },

  /// Remove every cache entry
  Purge {
    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the effective configuration
  Info {
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = match cli.verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_failure(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let config = load_config(&cli)?;

  match cli.command {
    Commands::Build { manifests } => cmd_build(&manifests, &config),
    Commands::Purge { dry_run, format } => cmd_purge(&config, dry_run, format),
    Commands::Info { format } => cmd_info(&config, cli.config.as_deref(), format),
  }
}

/// Configuration file and environment, with command-line flags on top.
fn load_config(cli: &Cli) -> Result<Config> {
  let mut config = Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;

  if let Some(cache_dir) = &cli.cache_dir {
    config.cache_dir = cache_dir.clone();
  }
  if let Some(output_dir) = &cli.output_dir {
    config.output_dir = output_dir.clone();
  }
  if let Some(repository) = &cli.repository {
    config.repository = repository.clone();
  }
  config.verbose = cli.verbose > 0;

  Ok(config)
}
