//! Declarative TOML manifests.
//!
//! ```toml
//! [metadata]
//! name = "sed"
//! category = "sys-apps"
//! description = "GNU stream editor."
//!
//! [template]
//! kind = "autotools"
//! configure_flags = ["--disable-nls"]
//!
//! [[versions]]
//! semver = "4.5.0"
//! fetch = [{ url = "https://ftp.gnu.org/gnu/sed/sed-4.5.tar.xz", sha256 = "..." }]
//! ```
//!
//! The `[template]` table selects the build system and overrides any of its
//! steps with shell commands. `[[template.variants]]` entries switch the
//! pipeline to one configure-to-install pass per variant.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{BuildManifest, Metadata, VersionArgs};
use crate::deplink::DeplinkOptions;
use crate::split::SplitKind;
use crate::template::adapters::{self, Configure};
use crate::template::{InstallPolicy, Step, Template, Variant, deplink_step, split_step};

#[derive(Debug, Error)]
pub enum ManifestFileError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid manifest {path}: {message}")]
  Invalid { path: PathBuf, message: String },
}

/// Build system driving the configure to install steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
  Autotools,
  Make,
  Cmake,
  Meson,
  Cargo,
  /// No build system: only the steps given as shell commands run.
  #[default]
  Custom,
}

impl TemplateKind {
  fn default_split(&self) -> SplitKind {
    match self {
      Self::Autotools => SplitKind::DrainAll,
      _ => SplitKind::System,
    }
  }

  fn default_build_folder(&self) -> &'static str {
    match self {
      Self::Meson => "build",
      _ => ".",
    }
  }
}

/// Shell commands replacing the build system's own steps.
#[derive(Debug, Clone, Copy, Default)]
struct StepCommands<'a> {
  configure: Option<&'a String>,
  compile: Option<&'a String>,
  check: Option<&'a String>,
  install: Option<&'a String>,
}

/// A `[[template.variants]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantSpec {
  pub build_folder: Option<PathBuf>,
  /// Appended to the template's own flags.
  #[serde(default)]
  pub configure_flags: Vec<String>,
  pub configure: Option<String>,
  pub compile: Option<String>,
  pub check: Option<String>,
  pub install: Option<String>,
  pub clean_before: Option<String>,
  pub clean_after: Option<String>,
}

impl VariantSpec {
  fn commands(&self) -> StepCommands<'_> {
    StepCommands {
      configure: self.configure.as_ref(),
      compile: self.compile.as_ref(),
      check: self.check.as_ref(),
      install: self.install.as_ref(),
    }
  }
}

/// The `[template]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
  #[serde(default)]
  pub kind: TemplateKind,
  pub build_folder: Option<PathBuf>,
  /// A splitter name, or `none`. Defaults from `kind`.
  pub split: Option<String>,
  #[serde(default = "default_true")]
  pub deplink: bool,
  #[serde(default = "default_true")]
  pub local_resolving: bool,
  #[serde(default = "default_true")]
  pub remote_resolving: bool,
  /// Script run instead of `./configure` (autotools).
  pub configure_binary: Option<String>,
  #[serde(default)]
  pub configure_flags: Vec<String>,
  /// `-D` entries given to cmake.
  #[serde(default)]
  pub cmake_entries: BTreeMap<String, String>,
  #[serde(default)]
  pub meson_args: Vec<String>,
  pub configure: Option<String>,
  pub compile: Option<String>,
  pub check: Option<String>,
  pub install: Option<String>,
  #[serde(default)]
  pub variants: Vec<VariantSpec>,
  /// Whether variants install on top of each other.
  #[serde(default)]
  pub fresh_install: bool,
}

fn default_true() -> bool {
  true
}

impl Default for TemplateSpec {
  fn default() -> Self {
    Self {
      kind: TemplateKind::default(),
      build_folder: None,
      split: None,
      deplink: true,
      local_resolving: true,
      remote_resolving: true,
      configure_binary: None,
      configure_flags: Vec::new(),
      cmake_entries: BTreeMap::new(),
      meson_args: Vec::new(),
      configure: None,
      compile: None,
      check: None,
      install: None,
      variants: Vec::new(),
      fresh_install: false,
    }
  }
}

/// The steps of one configure-to-install pass.
struct BuildSteps {
  configure: Option<Step>,
  compile: Option<Step>,
  check: Option<Step>,
  install: Option<Step>,
}

impl TemplateSpec {
  /// The splitter this template uses, `None` when splitting is disabled.
  pub fn split_kind(&self) -> Result<Option<SplitKind>, String> {
    match self.split.as_deref() {
      None => Ok(Some(self.kind.default_split())),
      Some("none") => Ok(None),
      Some(name) => name.parse().map(Some),
    }
  }

  pub fn install_policy(&self) -> InstallPolicy {
    if self.fresh_install {
      InstallPolicy::Fresh
    } else {
      InstallPolicy::Cumulative
    }
  }

  fn commands(&self) -> StepCommands<'_> {
    StepCommands {
      configure: self.configure.as_ref(),
      compile: self.compile.as_ref(),
      check: self.check.as_ref(),
      install: self.install.as_ref(),
    }
  }

  fn build_steps(&self, configure_flags: &[String], commands: StepCommands<'_>) -> BuildSteps {
    let kind_steps = match self.kind {
      TemplateKind::Autotools => BuildSteps {
        configure: Some(
          Configure {
            binary: self.configure_binary.clone().unwrap_or_else(|| "./configure".to_string()),
            flags: configure_flags.to_vec(),
            ..Configure::default()
          }
          .step(),
        ),
        compile: Some(adapters::make::<&str>(&[])),
        check: Some(adapters::make(&["check"])),
        install: Some(adapters::make_install()),
      },
      TemplateKind::Make => BuildSteps {
        configure: None,
        compile: Some(adapters::make::<&str>(&[])),
        check: Some(adapters::make(&["check"])),
        install: Some(adapters::make_install()),
      },
      TemplateKind::Cmake => BuildSteps {
        configure: Some(adapters::cmake(".", &self.cmake_entries)),
        compile: Some(adapters::make::<&str>(&[])),
        check: Some(adapters::make(&["check"])),
        install: Some(adapters::make_install()),
      },
      TemplateKind::Meson => BuildSteps {
        configure: Some(adapters::meson(&self.meson_args)),
        compile: Some(adapters::ninja::<&str>(&[])),
        check: Some(adapters::ninja_test()),
        install: Some(adapters::ninja_install()),
      },
      TemplateKind::Cargo => BuildSteps {
        configure: None,
        compile: Some(adapters::cargo_build()),
        check: Some(adapters::cargo_check()),
        install: Some(adapters::cargo_install()),
      },
      TemplateKind::Custom => BuildSteps {
        configure: None,
        compile: None,
        check: None,
        install: None,
      },
    };

    let pick = |command: Option<&String>, default: Option<Step>| command.map(Step::cmd).or(default);
    BuildSteps {
      configure: pick(commands.configure, kind_steps.configure),
      compile: pick(commands.compile, kind_steps.compile),
      check: pick(commands.check, kind_steps.check),
      install: pick(commands.install, kind_steps.install),
    }
  }

  /// The pipeline described by this table.
  pub fn template(&self) -> Result<Template, String> {
    let steps = self.build_steps(&self.configure_flags, self.commands());
    let build_folder = self
      .build_folder
      .clone()
      .unwrap_or_else(|| PathBuf::from(self.kind.default_build_folder()));

    let options = DeplinkOptions {
      local_resolving: self.local_resolving,
      remote_resolving: self.remote_resolving,
      ..DeplinkOptions::default()
    };

    Ok(
      Template::default()
        .with_build_folder(build_folder)
        .with_configure(steps.configure)
        .with_compile(steps.compile)
        .with_check(steps.check)
        .with_install(steps.install)
        .with_split(self.split_kind()?.map(split_step))
        .with_deplink(self.deplink.then(|| deplink_step(options))),
    )
  }

  /// One [`Variant`] per `[[template.variants]]` entry.
  pub fn variants(&self) -> Vec<Variant> {
    self
      .variants
      .iter()
      .map(|spec| {
        let flags: Vec<String> = self.configure_flags.iter().chain(&spec.configure_flags).cloned().collect();
        let steps = self.build_steps(&flags, spec.commands());
        Variant {
          build_folder: spec.build_folder.clone(),
          clean_before: spec.clean_before.as_ref().map(Step::cmd),
          configure: steps.configure,
          compile: steps.compile,
          check: steps.check,
          install: steps.install,
          clean_after: spec.clean_after.as_ref().map(Step::cmd),
        }
      })
      .collect()
  }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
  metadata: Metadata,
  #[serde(default)]
  template: TemplateSpec,
  #[serde(default)]
  versions: Vec<VersionArgs>,
}

/// Parse a manifest. Relative `file` fetch entries resolve against `source_dir`.
pub fn parse_manifest(contents: &str, path: &Path, source_dir: &Path) -> Result<BuildManifest, ManifestFileError> {
  let file: ManifestFile = toml::from_str(contents).map_err(|source| ManifestFileError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  let invalid = |message: String| ManifestFileError::Invalid {
    path: path.to_path_buf(),
    message,
  };

  if file.versions.is_empty() {
    return Err(invalid("no [[versions]] entry".to_string()));
  }
  // Reject bad values now rather than when the first build starts.
  file.template.template().map_err(invalid)?;

  let spec = file.template;
  let manifest = BuildManifest::new(file.metadata, move |build| {
    let mut template = spec.template().map_err(crate::build::BuildError::custom)?;
    if spec.variants.is_empty() {
      template.run(build)
    } else {
      template.build_all(build, spec.variants(), spec.install_policy())
    }
  })
  .with_source_dir(source_dir);

  Ok(
    file
      .versions
      .into_iter()
      .fold(manifest, |manifest, version| manifest.with_version(version)),
  )
}

/// Read the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<BuildManifest, ManifestFileError> {
  let contents = std::fs::read_to_string(path).map_err(|source| ManifestFileError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let source_dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  debug!(path = %path.display(), "loaded manifest");
  parse_manifest(&contents, path, &source_dir)
}
