//! Getting a build's inputs into its working directory.
//!
//! Every entry of the version's `fetch` list is either downloaded over HTTP
//! (and kept in the download cache, keyed by file name and verified by
//! SHA-256) or copied from the manifest's directory. Extraction and patching
//! of what was fetched live in [`extract`] and [`patch`].

pub mod extract;
pub mod patch;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::build::Build;
use crate::manifest::FetchSpec;
use crate::util::fs::copy_tree;
use crate::util::hash::{sha256_bytes, sha256_file};

pub use extract::{ExtractError, extract_all, flat_extract};
pub use patch::{apply_patch, patch_all};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("failed to download {url}: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to download {url}: HTTP {status}")]
  Status { url: String, status: StatusCode },

  #[error("integrity check failed for {url}: expected sha256 {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("unsupported URL scheme, only http and https can be fetched: {url}")]
  UnsupportedScheme { url: String },

  #[error("fetch expects a path relative to the manifest, got absolute path {0}")]
  AbsoluteFile(PathBuf),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

/// Fetch every entry of the build's `fetch` list into its working directory.
pub fn fetch(build: &Build<'_>) -> Result<Vec<PathBuf>, FetchError> {
  let mut fetched = Vec::new();
  for spec in &build.args().fetch {
    let path = match spec {
      FetchSpec::Url { url, sha256 } => fetch_url(build, url, sha256.as_deref())?,
      FetchSpec::File { file } => fetch_file(build, file)?,
    };
    fetched.push(path);
  }
  Ok(fetched)
}

/// Download `url` into the working directory, going through the download cache.
///
/// A cached copy is used only when `sha256` is given and matches it. Without
/// a hash nothing can be trusted, so the file is downloaded every time.
pub fn fetch_url(build: &Build<'_>, url: &str, sha256: Option<&str>) -> Result<PathBuf, FetchError> {
  let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
  if !matches!(scheme.as_deref(), Some("http" | "https")) {
    return Err(FetchError::UnsupportedScheme { url: url.to_string() });
  }

  let filename = url_to_filename(url);
  let cached = build.download_cache().join(&filename);
  let dest = build.cwd().join(&filename);
  let expected = sha256.map(str::to_ascii_lowercase);

  match &expected {
    Some(expected) if cached.is_file() => {
      let actual = sha256_file(&cached)?;
      if &actual == expected {
        info!(url = %url, "cache hit");
        fs::copy(&cached, &dest)?;
        return Ok(dest);
      }
      debug!(expected = %expected, actual = %actual, "cached file hash mismatch, re-downloading");
    }
    Some(_) => {}
    None => warn!(url = %url, "no sha256 to ensure the integrity of this file"),
  }

  info!(url = %url, "cache miss, fetching");
  let bytes = download(url)?;
  let actual = sha256_bytes(&bytes);

  if let Some(expected) = expected
    && actual != expected
  {
    return Err(FetchError::HashMismatch {
      url: url.to_string(),
      expected,
      actual,
    });
  }

  fs::create_dir_all(build.download_cache())?;
  fs::write(&cached, &bytes)?;
  fs::copy(&cached, &dest)?;

  info!(path = %dest.display(), size = bytes.len(), "download complete");
  Ok(dest)
}

/// Copy a file or directory, relative to the manifest's directory, into the working directory.
pub fn fetch_file(build: &Build<'_>, file: &Path) -> Result<PathBuf, FetchError> {
  if file.is_absolute() {
    return Err(FetchError::AbsoluteFile(file.to_path_buf()));
  }

  let src = build.manifest().source_dir.join(file);
  let name = file.file_name().ok_or_else(|| {
    FetchError::Io(io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("no file name in {}", file.display()),
    ))
  })?;
  let dest = build.cwd().join(name);

  if src.is_dir() {
    copy_tree(&src, &dest)?;
  } else {
    fs::copy(&src, &dest)?;
  }

  debug!(src = %src.display(), dest = %dest.display(), "copied local input");
  Ok(dest)
}

fn download(url: &str) -> Result<Vec<u8>, FetchError> {
  let http_err = |source| FetchError::Http {
    url: url.to_string(),
    source,
  };

  let client = reqwest::blocking::Client::builder()
    .timeout(Duration::from_secs(600))
    .build()
    .map_err(http_err)?;
  let response = client.get(url).send().map_err(http_err)?;

  if !response.status().is_success() {
    return Err(FetchError::Status {
      url: url.to_string(),
      status: response.status(),
    });
  }

  let bytes = response.bytes().map_err(http_err)?;
  Ok(bytes.to_vec())
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of
/// the URL if no suitable filename can be extracted.
fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split(['?', '#']).next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '+' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  format!("download_{}", &sha256_bytes(url.as_bytes())[..16])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::VersionArgs;
  use crate::util::testutil::Fixture;
  use mockito::Server;

  const PAYLOAD: &[u8] = b"source tarball";

  mod filenames {
    use super::*;

    #[test]
    fn simple() {
      assert_eq!(url_to_filename("https://example.com/sed-4.5.tar.xz"), "sed-4.5.tar.xz");
    }

    #[test]
    fn query_and_fragment_are_dropped() {
      assert_eq!(
        url_to_filename("https://example.com/file.tar.gz?token=abc"),
        "file.tar.gz"
      );
      assert_eq!(url_to_filename("https://example.com/file.tar.gz#top"), "file.tar.gz");
    }

    #[test]
    fn special_chars_are_sanitized() {
      assert_eq!(
        url_to_filename("https://example.com/file name.tar.gz"),
        "file_name.tar.gz"
      );
    }

    #[test]
    fn fallback_for_empty() {
      assert!(url_to_filename("https://example.com/").starts_with("download_"));
    }
  }

  mod url {
    use super::*;

    #[test]
    fn download_is_cached_and_reused() {
      let mut server = Server::new();
      let mock = server
        .mock("GET", "/hello-1.0.tar.gz")
        .with_status(200)
        .with_body(PAYLOAD)
        .expect(1)
        .create();
      let url = format!("{}/hello-1.0.tar.gz", server.url());
      let sha = sha256_bytes(PAYLOAD);
      let fixture = Fixture::new();

      let first = fixture.prepared_build("1.0.0");
      let path = fetch_url(&first, &url, Some(&sha)).unwrap();
      assert_eq!(fs::read(&path).unwrap(), PAYLOAD);
      assert!(first.download_cache().join("hello-1.0.tar.gz").is_file());

      // The build cache is wiped, the download cache is not.
      let second = fixture.prepared_build("1.0.0");
      assert!(!second.build_cache().join("hello-1.0.tar.gz").exists());
      let path = fetch_url(&second, &url, Some(&sha.to_uppercase())).unwrap();
      assert_eq!(fs::read(&path).unwrap(), PAYLOAD);

      mock.assert();
    }

    #[test]
    fn missing_hash_always_downloads() {
      let mut server = Server::new();
      let mock = server
        .mock("GET", "/data.bin")
        .with_status(200)
        .with_body(PAYLOAD)
        .expect(2)
        .create();
      let url = format!("{}/data.bin", server.url());
      let fixture = Fixture::new();
      let build = fixture.prepared_build("1.0.0");

      fetch_url(&build, &url, None).unwrap();
      fetch_url(&build, &url, None).unwrap();

      mock.assert();
    }

    #[test]
    fn hash_mismatch_is_fatal_and_not_cached() {
      let mut server = Server::new();
      let _mock = server.mock("GET", "/bad.tar.gz").with_status(200).with_body(PAYLOAD).create();
      let url = format!("{}/bad.tar.gz", server.url());
      let fixture = Fixture::new();
      let build = fixture.prepared_build("1.0.0");

      let err = fetch_url(&build, &url, Some(&"0".repeat(64))).unwrap_err();

      assert!(matches!(err, FetchError::HashMismatch { .. }));
      assert!(!build.download_cache().join("bad.tar.gz").exists());
      assert!(!build.cwd().join("bad.tar.gz").exists());
    }

    #[test]
    fn error_status_is_reported() {
      let mut server = Server::new();
      let _mock = server.mock("GET", "/gone.tar.gz").with_status(404).create();
      let url = format!("{}/gone.tar.gz", server.url());
      let fixture = Fixture::new();
      let build = fixture.prepared_build("1.0.0");

      let err = fetch_url(&build, &url, None).unwrap_err();
      assert!(matches!(err, FetchError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[test]
    fn other_schemes_are_unsupported() {
      let fixture = Fixture::new();
      let build = fixture.prepared_build("1.0.0");

      for url in ["ftp://ftp.gnu.org/gnu/sed/sed-4.5.tar.xz", "sed-4.5.tar.xz"] {
        let err = fetch_url(&build, url, None).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme { .. }), "{url}");
      }
    }
  }

  mod file {
    use super::*;

    #[test]
    fn copies_files_and_directories() {
      let fixture = Fixture::new();
      fs::write(fixture.source_dir().join("fix.patch"), "diff").unwrap();
      fs::create_dir_all(fixture.source_dir().join("extra/nested")).unwrap();
      fs::write(fixture.source_dir().join("extra/nested/file"), "x").unwrap();
      let build = fixture.prepared_build("1.0.0");

      fetch_file(&build, Path::new("fix.patch")).unwrap();
      fetch_file(&build, Path::new("extra")).unwrap();

      assert_eq!(fs::read_to_string(build.cwd().join("fix.patch")).unwrap(), "diff");
      assert!(build.cwd().join("extra/nested/file").is_file());
    }

    #[test]
    fn absolute_path_is_rejected() {
      let fixture = Fixture::new();
      let build = fixture.prepared_build("1.0.0");

      let err = fetch_file(&build, Path::new("/etc/hostname")).unwrap_err();
      assert!(matches!(err, FetchError::AbsoluteFile(_)));
    }

    #[test]
    fn fetch_walks_the_version_entries() {
      let fixture = Fixture::with_manifest(|source_dir| {
        crate::util::testutil::test_manifest(|_| Ok(crate::package::Packages::new()))
          .with_source_dir(source_dir)
          .with_version(
            VersionArgs::new("1.0.0")
              .with_fetch(FetchSpec::file("a.patch"))
              .with_fetch(FetchSpec::file("b.patch")),
          )
      });
      fs::write(fixture.source_dir().join("a.patch"), "a").unwrap();
      fs::write(fixture.source_dir().join("b.patch"), "b").unwrap();
      let builds = fixture.manifest.builds(&fixture.config).unwrap();
      let build = &builds[0];
      fs::create_dir_all(build.cwd()).unwrap();

      let fetched = fetch(build).unwrap();

      assert_eq!(fetched, vec![build.cwd().join("a.patch"), build.cwd().join("b.patch")]);
    }
  }
}
