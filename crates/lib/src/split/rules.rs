//! Rule tables of the built-in splitters.
//!
//! Patterns may contain `@TARGET@` (the configured target triplet) and
//! `@NAME@` (the build's name). Descriptions may contain `@MAIN@`, the short
//! name of the main package.

use super::{Layout, PackageRule, Role, Rule};

const DOC_DESCRIPTION: &str = "Offline documentation of @MAIN@.";

const MAIN: PackageRule = PackageRule {
  role: Role::Main,
  suffix: "",
  category: None,
  description: None,
  depends_on_main: false,
};

const DOC: PackageRule = PackageRule {
  role: Role::Doc,
  suffix: "-doc",
  category: None,
  description: Some(DOC_DESCRIPTION),
  depends_on_main: false,
};

const DOC_DRAIN: Rule = Rule::Drain(Role::Doc, &["usr/share/doc/", "usr/share/info/"]);

/// `bin`, `sbin` and their `usr/local` forms into `usr/bin`.
macro_rules! normalize_binaries {
  ($role:expr) => {
    [
      Rule::Move($role, "{,usr/local/}{,s}bin/*", "usr/bin/"),
      Rule::Move($role, "usr/sbin/*", "usr/bin/"),
      Rule::Move($role, "usr/@TARGET@/sbin/*", "usr/@TARGET@/bin/"),
    ]
  };
}

/// `lib`, `lib64`, `lib32` and their `usr/local` forms into `usr/lib64` and `usr/lib32`.
macro_rules! normalize_libraries {
  ($role:expr) => {
    [
      Rule::Move($role, "{lib,usr/local/lib}{,64}/*", "usr/lib64/"),
      Rule::Move($role, "{lib,usr/local/lib}32/*", "usr/lib32/"),
      Rule::Move($role, "usr/@TARGET@/lib/*", "usr/@TARGET@/lib64/"),
    ]
  };
}

const MAIN_BINARIES: [Rule; 3] = normalize_binaries!(Role::Main);
const MAIN_LIBRARIES: [Rule; 3] = normalize_libraries!(Role::Main);
const DEV_LIBRARIES: [Rule; 3] = normalize_libraries!(Role::Dev);
const BINARY_BINARIES: [Rule; 3] = normalize_binaries!(Role::Binary);

pub(super) const DRAIN_ALL: Layout = Layout {
  packages: &[MAIN],
  rules: &[],
  catch_all: true,
};

pub(super) const DRAIN_ALL_WITH_DOC: Layout = Layout {
  packages: &[MAIN, DOC],
  rules: &[
    DOC_DRAIN,
    MAIN_BINARIES[0],
    MAIN_BINARIES[1],
    MAIN_BINARIES[2],
    MAIN_LIBRARIES[0],
    MAIN_LIBRARIES[1],
    MAIN_LIBRARIES[2],
  ],
  catch_all: true,
};

pub(super) const SYSTEM: Layout = Layout {
  packages: &[
    MAIN,
    PackageRule {
      role: Role::Dev,
      suffix: "-dev",
      category: None,
      description: Some("Headers and manuals to compile or write a software using the @MAIN@ package."),
      depends_on_main: true,
    },
    DOC,
  ],
  rules: &[
    Rule::Drain(
      Role::Main,
      &[
        "{,usr/{,local/}}{,s}bin/",
        "{,usr/{,local/}}lib{,32,64}/*.so.*",
        "{,usr/{,local/}}lib{,32,64}/pkgconfig/",
        "{,usr/{,local/}}lib{,32,64}/*.pc",
        "usr/@TARGET@/{,s}bin/",
        "usr/@TARGET@/lib{,32,64}/*.so.*",
        "usr/@TARGET@/lib{,32,64}/pkgconfig/",
        "usr/@TARGET@/lib{,32,64}/*.pc",
        "usr/share/bash-completion/",
        "usr/share/man/man{1,4,5,6,7,8,9}/",
        "usr/share/locale/",
        "usr/libexec/",
        "etc/",
      ],
    ),
    Rule::Drain(
      Role::Dev,
      &[
        "usr/include/",
        "{,usr/{,local/}}lib{,32,64}/*.{a,so}",
        "usr/lib{,32,64}/@TARGET@/*.so.*",
        "usr/share/man/man{2,3}/",
      ],
    ),
    DOC_DRAIN,
    MAIN_BINARIES[0],
    MAIN_BINARIES[1],
    MAIN_BINARIES[2],
    MAIN_LIBRARIES[0],
    MAIN_LIBRARIES[1],
    MAIN_LIBRARIES[2],
    DEV_LIBRARIES[0],
    DEV_LIBRARIES[1],
    DEV_LIBRARIES[2],
  ],
  catch_all: true,
};

pub(super) const LIBRARY: Layout = Layout {
  packages: &[
    MAIN,
    PackageRule {
      role: Role::Dev,
      suffix: "-dev",
      category: None,
      description: Some("Headers and manuals to compile or write a software using the @MAIN@ library."),
      depends_on_main: true,
    },
    PackageRule {
      role: Role::Binary,
      suffix: "",
      category: Some("sys-apps"),
      description: Some("Binary and utilities related to the @MAIN@ library."),
      depends_on_main: true,
    },
    DOC,
  ],
  rules: &[
    Rule::Drain(
      Role::Main,
      &[
        "{,usr/{,local/}}lib{,32,64}/*.so.*",
        "{,usr/{,local/}}lib{,32,64}/pkgconfig/",
        "{,usr/{,local/}}lib{,32,64}/*.pc",
        "usr/share/man/man{4,5,7,8}/",
        "usr/share/locale/",
        "usr/libexec/",
        "etc/",
      ],
    ),
    Rule::Drain(
      Role::Dev,
      &[
        "usr/include/",
        "{,usr/{,local/}}lib{,32,64}/*.{a,so}",
        "usr/share/man/man{2,3}/",
      ],
    ),
    Rule::Drain(
      Role::Binary,
      &[
        "{,usr/{,local/}}{,s}bin/*",
        "usr/share/man/man{1,6,9}/",
        "usr/share/bash-completion/",
      ],
    ),
    DOC_DRAIN,
    MAIN_LIBRARIES[0],
    MAIN_LIBRARIES[1],
    MAIN_LIBRARIES[2],
    DEV_LIBRARIES[0],
    DEV_LIBRARIES[1],
    DEV_LIBRARIES[2],
    BINARY_BINARIES[0],
    BINARY_BINARIES[1],
    BINARY_BINARIES[2],
  ],
  catch_all: true,
};

pub(super) const APPLICATION: Layout = Layout {
  packages: &[MAIN, DOC],
  rules: &[
    Rule::Drain(
      Role::Main,
      &[
        "{,usr/{,local/}}{,s}bin/*",
        "usr/libexec/",
        "usr/share/{locale,man,icons,applications}/",
        "usr/share/bash-completion/completions/",
        "usr/share/@NAME@/",
        "etc/",
      ],
    ),
    DOC_DRAIN,
    MAIN_BINARIES[0],
    MAIN_BINARIES[1],
    MAIN_BINARIES[2],
  ],
  catch_all: true,
};
