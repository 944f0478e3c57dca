//! Shell-style path patterns: brace expansion followed by globbing.
//!
//! Patterns are always relative to a root directory (an install cache, a
//! build cache or a package's staging tree). A trailing `/` restricts matches
//! to directories, and `**` only crosses directory boundaries when recursion
//! is requested.
//!
//! ```text
//! "{,usr/}lib{,32,64}/*.so.*"  ->  lib/*.so.*, lib32/*.so.*, ..., usr/lib64/*.so.*
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PatternError {
  #[error("absolute pattern not allowed, expected a path relative to the staging tree: {0}")]
  Absolute(String),

  #[error("unbalanced brace in pattern: {0}")]
  UnbalancedBrace(String),

  #[error("invalid glob pattern {pattern}: {source}")]
  Glob {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  #[error("root directory is not valid UTF-8: {0}")]
  NonUtf8Root(PathBuf),
}

/// Expand shell braces (`a{b,c}d` -> `abd`, `acd`), nested groups included.
///
/// A group without a top-level comma (`{foo}`) is kept literally, like a
/// shell does. Alternatives are produced in left-to-right order.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, PatternError> {
  let mut out = Vec::new();
  expand_from(pattern, 0, &mut out)?;
  Ok(out)
}

fn expand_from(pattern: &str, from: usize, out: &mut Vec<String>) -> Result<(), PatternError> {
  let bytes = pattern.as_bytes();
  let mut i = from;

  while i < bytes.len() {
    if bytes[i] == b'{' {
      let close = matching_brace(bytes, i).ok_or_else(|| PatternError::UnbalancedBrace(pattern.to_string()))?;
      let alternatives = split_alternatives(&pattern[i + 1..close]);

      if alternatives.len() > 1 {
        let prefix = &pattern[..i];
        let suffix = &pattern[close + 1..];
        for alternative in alternatives {
          let candidate = format!("{prefix}{alternative}{suffix}");
          expand_from(&candidate, i, out)?;
        }
        return Ok(());
      }

      // Literal group: keep the braces, but still expand what is inside.
      i += 1;
      continue;
    }
    i += 1;
  }

  out.push(pattern.to_string());
  Ok(())
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
  let mut depth = 0usize;
  for (offset, byte) in bytes[open..].iter().enumerate() {
    match byte {
      b'{' => depth += 1,
      b'}' => {
        depth -= 1;
        if depth == 0 {
          return Some(open + offset);
        }
      }
      _ => {}
    }
  }
  None
}

fn split_alternatives(inner: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut start = 0;

  for (i, byte) in inner.bytes().enumerate() {
    match byte {
      b'{' => depth += 1,
      b'}' => depth = depth.saturating_sub(1),
      b',' if depth == 0 => {
        parts.push(&inner[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  parts.push(&inner[start..]);
  parts
}

/// Expand `pattern` below `root` and return the matching paths, relative to `root`.
///
/// Results keep the order of the brace alternatives (each alternative sorted
/// by the glob walker) without duplicates. Nothing matching is not an error.
pub fn glob_relative(root: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>, PatternError> {
  if Path::new(pattern).is_absolute() {
    return Err(PatternError::Absolute(pattern.to_string()));
  }

  let root_str = root.to_str().ok_or_else(|| PatternError::NonUtf8Root(root.to_path_buf()))?;
  let escaped_root = Pattern::escape(root_str);
  let options = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
  };

  let mut seen = HashSet::new();
  let mut matches = Vec::new();

  for expanded in expand_braces(pattern)? {
    if Path::new(&expanded).is_absolute() {
      return Err(PatternError::Absolute(expanded));
    }

    let dirs_only = expanded.ends_with('/');
    let trimmed = expanded.trim_end_matches('/');
    if trimmed.is_empty() {
      continue;
    }
    let trimmed = if recursive {
      trimmed.to_string()
    } else {
      trimmed.replace("**", "*")
    };

    let full = format!("{}/{}", escaped_root.trim_end_matches('/'), trimmed);
    let paths = glob::glob_with(&full, options).map_err(|source| PatternError::Glob {
      pattern: expanded.clone(),
      source,
    })?;

    for entry in paths {
      let path = match entry {
        Ok(path) => path,
        Err(err) => {
          debug!(error = %err, "skipping unreadable glob entry");
          continue;
        }
      };
      if dirs_only && !path.is_dir() {
        continue;
      }
      let Ok(relative) = path.strip_prefix(root) else {
        continue;
      };
      if relative.as_os_str().is_empty() {
        continue;
      }
      let relative = relative.to_path_buf();
      if seen.insert(relative.clone()) {
        matches.push(relative);
      }
    }
  }

  Ok(matches)
}
