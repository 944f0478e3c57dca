//! Looking up which published package ships a file.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::RepositoryConfig;

#[derive(Debug, Error)]
pub enum ResolutionError {
  #[error("{repository} has {count} packages containing {file}")]
  Ambiguous {
    repository: String,
    file: String,
    count: usize,
  },

  #[error("{repository} has {package} containing {file}, but not in all its versions")]
  PartialVersions {
    repository: String,
    file: String,
    package: String,
  },

  #[error("request to {repository} failed: {source}")]
  Http {
    repository: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{repository} answered HTTP {status}")]
  Status { repository: String, status: StatusCode },

  #[error("invalid search response from {repository}: {source}")]
  Decode {
    repository: String,
    #[source]
    source: reqwest::Error,
  },
}

/// A searchable set of published packages.
pub trait PackageIndex {
  fn name(&self) -> &str;

  /// Full name of the single package shipping `file` in all of its versions.
  ///
  /// `Ok(None)` when no package ships it.
  fn search_file(&self, file: &str) -> Result<Option<String>, ResolutionError>;
}

#[derive(Debug, Deserialize)]
struct SearchHit {
  name: String,
  all_versions: bool,
}

/// A repository's HTTP search endpoint.
pub struct RepositoryClient {
  name: String,
  url: String,
  client: Client,
}

impl RepositoryClient {
  pub fn new(config: &RepositoryConfig) -> Self {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .unwrap_or_else(|_| Client::new());
    Self {
      name: config.name.clone(),
      url: config.url.trim_end_matches('/').to_string(),
      client,
    }
  }
}

impl PackageIndex for RepositoryClient {
  fn name(&self) -> &str {
    &self.name
  }

  fn search_file(&self, file: &str) -> Result<Option<String>, ResolutionError> {
    let url = format!("{}/api/search", self.url);
    debug!(repository = %self.name, file, "searching repository");

    let response = self
      .client
      .get(&url)
      .query(&[("q", file), ("search_by", "content"), ("exact_match", "true")])
      .send()
      .map_err(|source| ResolutionError::Http {
        repository: self.name.clone(),
        source,
      })?;

    match response.status() {
      StatusCode::OK => {}
      StatusCode::NOT_FOUND => return Ok(None),
      status => {
        return Err(ResolutionError::Status {
          repository: self.name.clone(),
          status,
        });
      }
    }

    let mut hits: Vec<SearchHit> = response.json().map_err(|source| ResolutionError::Decode {
      repository: self.name.clone(),
      source,
    })?;

    match hits.len() {
      0 => Ok(None),
      1 => {
        let hit = hits.remove(0);
        if hit.all_versions {
          Ok(Some(hit.name))
        } else {
          Err(ResolutionError::PartialVersions {
            repository: self.name.clone(),
            file: file.to_string(),
            package: hit.name,
          })
        }
      }
      count => Err(ResolutionError::Ambiguous {
        repository: self.name.clone(),
        file: file.to_string(),
        count,
      }),
    }
  }
}
