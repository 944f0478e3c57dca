//! Unpacking fetched tarballs in place.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

use crate::util::fs::merge_move;

#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("unsupported archive format: {0}")]
  UnsupportedFormat(PathBuf),

  #[error("failed to unpack {path}: {source}")]
  Unpack {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

/// Flat-extract every tarball (`*.tar.gz`, `*.tgz`, `*.tar`) found directly in `dir`, in name order.
pub fn extract_all(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
  let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
    .filter_map(Result::ok)
    .map(|entry| entry.path())
    .filter(|path| path.is_file() && is_tarball(path))
    .collect();
  archives.sort();

  for archive in &archives {
    flat_extract(archive, dir)?;
  }
  Ok(archives)
}

/// Extract `archive` into `dest`.
///
/// When everything in the archive sits under a single top-level directory,
/// that directory's content is hoisted into `dest` and the directory itself
/// disappears.
pub fn flat_extract(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
  info!(archive = %archive.display(), "extracting");

  let staging = tempfile::Builder::new().prefix(".extract-").tempdir_in(dest)?;
  let reader = open_archive(archive)?;
  Archive::new(reader)
    .unpack(staging.path())
    .map_err(|source| ExtractError::Unpack {
      path: archive.to_path_buf(),
      source,
    })?;

  let top_level: Vec<PathBuf> = fs::read_dir(staging.path())?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<Result<_, _>>()?;

  let root = match top_level.as_slice() {
    [single] if single.symlink_metadata()?.is_dir() => {
      debug!(dir = %single.display(), "hoisting single top-level directory");
      single.clone()
    }
    _ => staging.path().to_path_buf(),
  };

  for entry in fs::read_dir(&root)? {
    let entry = entry?;
    merge_move(&entry.path(), &dest.join(entry.file_name()))?;
  }

  info!(dest = %dest.display(), "extracted");
  Ok(())
}

fn is_tarball(path: &Path) -> bool {
  let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
  name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar")
}

fn open_archive(path: &Path) -> Result<Box<dyn Read>, ExtractError> {
  let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
  let file = BufReader::new(File::open(path)?);
  if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
    Ok(Box::new(GzDecoder::new(file)))
  } else if name.ends_with(".tar") {
    Ok(Box::new(file))
  } else {
    Err(ExtractError::UnsupportedFormat(path.to_path_buf()))
  }
}
