//! SHA-256 helpers for download verification.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a file, streamed from disk.
pub fn sha256_file(path: &Path) -> io::Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher)?;
  Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_bytes(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

  #[test]
  fn sha256_bytes_known_value() {
    assert_eq!(sha256_bytes(b"hello"), HELLO_SHA256);
  }

  #[test]
  fn sha256_file_matches_bytes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("hello");
    std::fs::write(&path, "hello").unwrap();

    assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
  }

  #[test]
  fn sha256_file_missing_is_error() {
    let temp = TempDir::new().unwrap();
    assert!(sha256_file(&temp.path().join("nope")).is_err());
  }
}
