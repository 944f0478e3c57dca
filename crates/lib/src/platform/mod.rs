pub mod arch;
pub mod paths;

use arch::Arch;

/// Returns the GNU target triplet for the host (e.g., "x86_64-linux-gnu").
///
/// Splitters use it to normalize `usr/<target>/...` trees. Returns `None`
/// if the architecture is not supported.
pub fn host_target() -> Option<String> {
  Arch::current().map(|arch| arch.target_triple())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn host_target_is_linux_gnu() {
    if let Some(target) = host_target() {
      assert!(target.ends_with("-linux-gnu"));
    }
  }
}
