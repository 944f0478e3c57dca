//! Names and file layout shared across the crate.

pub const APP_NAME: &str = "nbuild";

/// Extension of the final package archive (`<name>-<version>.nest`).
pub const ARCHIVE_EXT: &str = "nest";

pub const DATA_ARCHIVE: &str = "data.tar.gz";
pub const MANIFEST_FILE: &str = "manifest.toml";
pub const INSTRUCTIONS_FILE: &str = "instructions.sh";

/// Hidden file keeping an otherwise empty directory alive in an archive.
pub const KEEPER_FILE: &str = ".nestkeep";

/// Staged-install variable exported to the install step.
pub const DESTDIR_VAR: &str = "DESTDIR";

pub const DEFAULT_REPOSITORY: &str = "stable";

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const CACHE_DIR_ENV: &str = "NBUILD_CACHE_DIR";
pub const OUTPUT_DIR_ENV: &str = "NBUILD_OUTPUT_DIR";
pub const TARGET_ENV: &str = "NBUILD_TARGET";
