use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::build::{Build, BuildError};
use crate::config::Config;
use crate::package::Packages;

/// Whether a package carries a file payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  #[default]
  Effective,
  Virtual,
}

impl Kind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Effective => "effective",
      Self::Virtual => "virtual",
    }
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Software licenses a package can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum License {
  Gpl,
  Lgpl,
  GplV1,
  GplV2,
  GplV3,
  AgplV3,
  LgplV2,
  #[serde(rename = "lgpl_v2_1")]
  LgplV2_1,
  LgplV3,
  Bsd,
  Psf,
  Mozilla,
  Mit,
  Apache,
  PerlArtistic,
  PublicDomain,
  Custom,
  None,
}

impl License {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Gpl => "gpl",
      Self::Lgpl => "lgpl",
      Self::GplV1 => "gpl_v1",
      Self::GplV2 => "gpl_v2",
      Self::GplV3 => "gpl_v3",
      Self::AgplV3 => "agpl_v3",
      Self::LgplV2 => "lgpl_v2",
      Self::LgplV2_1 => "lgpl_v2_1",
      Self::LgplV3 => "lgpl_v3",
      Self::Bsd => "bsd",
      Self::Psf => "psf",
      Self::Mozilla => "mozilla",
      Self::Mit => "mit",
      Self::Apache => "apache",
      Self::PerlArtistic => "perl_artistic",
      Self::PublicDomain => "public_domain",
      Self::Custom => "custom",
      Self::None => "none",
    }
  }
}

impl fmt::Display for License {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Descriptive metadata shared by a manifest and, by default, every package it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  pub name: String,
  pub category: String,
  pub description: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub maintainer: String,
  #[serde(default)]
  pub licenses: Vec<License>,
  #[serde(default)]
  pub upstream_url: String,
  #[serde(default)]
  pub kind: Kind,
}

impl Metadata {
  pub fn new(category: &str, name: &str, description: &str) -> Self {
    Self {
      name: name.to_string(),
      category: category.to_string(),
      description: description.to_string(),
      tags: Vec::new(),
      maintainer: String::new(),
      licenses: Vec::new(),
      upstream_url: String::new(),
      kind: Kind::Effective,
    }
  }

  pub fn with_tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags = tags.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_maintainer(mut self, maintainer: &str) -> Self {
    self.maintainer = maintainer.to_string();
    self
  }

  pub fn with_licenses(mut self, licenses: Vec<License>) -> Self {
    self.licenses = licenses;
    self
  }

  pub fn with_upstream_url(mut self, url: &str) -> Self {
    self.upstream_url = url.to_string();
    self
  }

  pub fn with_kind(mut self, kind: Kind) -> Self {
    self.kind = kind;
    self
  }
}

/// One input of the fetch step.
///
/// In TOML an entry has exactly one of `url` (with an optional `sha256`) or
/// `file` (a path relative to the manifest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFetchEntry", into = "RawFetchEntry")]
pub enum FetchSpec {
  Url { url: String, sha256: Option<String> },
  File { file: PathBuf },
}

impl FetchSpec {
  pub fn url(url: &str, sha256: Option<&str>) -> Self {
    Self::Url {
      url: url.to_string(),
      sha256: sha256.map(str::to_string),
    }
  }

  pub fn file(path: impl Into<PathBuf>) -> Self {
    Self::File { file: path.into() }
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFetchEntry {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  sha256: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  file: Option<PathBuf>,
}

impl TryFrom<RawFetchEntry> for FetchSpec {
  type Error = String;

  fn try_from(raw: RawFetchEntry) -> Result<Self, Self::Error> {
    match (raw.url, raw.file) {
      (Some(url), None) => Ok(Self::Url { url, sha256: raw.sha256 }),
      (None, Some(file)) => {
        if raw.sha256.is_some() {
          return Err("`sha256` only applies to `url` fetch entries".to_string());
        }
        Ok(Self::File { file })
      }
      (Some(_), Some(_)) => Err("a fetch entry must not contain both `url` and `file`".to_string()),
      (None, None) => Err("a fetch entry must contain either `url` or `file`".to_string()),
    }
  }
}

impl From<FetchSpec> for RawFetchEntry {
  fn from(spec: FetchSpec) -> Self {
    match spec {
      FetchSpec::Url { url, sha256 } => Self {
        url: Some(url),
        sha256,
        file: None,
      },
      FetchSpec::File { file } => Self {
        file: Some(file),
        ..Self::default()
      },
    }
  }
}

/// Arguments of one buildable version.
///
/// `semver` and `fetch` are understood by nbuild; every other key is kept in
/// `extra` for the manifest's own instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionArgs {
  pub semver: String,
  #[serde(default)]
  pub fetch: Vec<FetchSpec>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, toml::Value>,
}

impl VersionArgs {
  pub fn new(semver: &str) -> Self {
    Self {
      semver: semver.to_string(),
      fetch: Vec::new(),
      extra: BTreeMap::new(),
    }
  }

  pub fn with_fetch(mut self, spec: FetchSpec) -> Self {
    self.fetch.push(spec);
    self
  }

  pub fn with_extra(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
    self.extra.insert(key.to_string(), value.into());
    self
  }

  pub fn extra_str(&self, key: &str) -> Option<&str> {
    self.extra.get(key).and_then(toml::Value::as_str)
  }
}

/// Instructions run by [`Build::build`], returning the packages to wrap.
pub type Instructions = Box<dyn Fn(&mut Build<'_>) -> Result<Packages, BuildError>>;

/// Metadata, versions and build instructions of one piece of software.
pub struct BuildManifest {
  pub metadata: Metadata,
  pub versions: Vec<VersionArgs>,
  /// Directory relative `file` fetch entries and instruction scripts are read from.
  pub source_dir: PathBuf,
  instructions: Instructions,
}

impl BuildManifest {
  pub fn new<F>(metadata: Metadata, instructions: F) -> Self
  where
    F: Fn(&mut Build<'_>) -> Result<Packages, BuildError> + 'static,
  {
    Self {
      metadata,
      versions: Vec::new(),
      source_dir: PathBuf::from("."),
      instructions: Box::new(instructions),
    }
  }

  pub fn with_version(mut self, args: VersionArgs) -> Self {
    self.versions.push(args);
    self
  }

  pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.source_dir = dir.into();
    self
  }

  pub(crate) fn instructions(&self) -> &Instructions {
    &self.instructions
  }

  /// One [`Build`] per version entry, validated up front.
  pub fn builds<'m>(&'m self, config: &'m Config) -> Result<Vec<Build<'m>>, BuildError> {
    self
      .versions
      .iter()
      .map(|args| Build::new(self, args.clone(), config))
      .collect()
  }
}

impl fmt::Debug for BuildManifest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuildManifest")
      .field("metadata", &self.metadata)
      .field("versions", &self.versions)
      .field("source_dir", &self.source_dir)
      .finish_non_exhaustive()
  }
}
