use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use nbuild_lib::config::Config;
use nbuild_lib::platform::host_target;

use crate::output::{OutputFormat, print_field, print_json};

#[derive(Serialize)]
struct Info<'a> {
  version: &'static str,
  config_file: PathBuf,
  host: Option<String>,
  #[serde(flatten)]
  config: &'a Config,
}

pub fn cmd_info(config: &Config, config_file: Option<&Path>, output: OutputFormat) -> Result<()> {
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    config_file: config_file.map(Path::to_path_buf).unwrap_or_else(Config::default_path),
    host: host_target(),
    config,
  };

  if output.is_json() {
    return print_json(&info);
  }

  println!("nbuild v{}", info.version);
  print_field("Config file", &info.config_file.display().to_string());
  print_field("Host", info.host.as_deref().unwrap_or("unsupported"));
  print_field("Target", &config.target);
  print_field("Repository", &config.repository);
  print_field("Cache", &config.cache_dir.display().to_string());
  print_field("Output", &config.output_dir.display().to_string());
  for repository in &config.repositories {
    print_field("Remote", &format!("{} ({})", repository.name, repository.url));
  }

  Ok(())
}
