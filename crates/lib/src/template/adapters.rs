//! Steps driving common build systems.
//!
//! Each adapter formats one shell command and runs it through
//! [`Build::cmd`](crate::build::Build::cmd), so it inherits the working
//! directory and environment the pipeline set up. Everything installs under
//! the `/usr` prefix and relies on `DESTDIR` to stage into the install cache.

use std::collections::BTreeMap;

use super::{Step, Template};
use crate::build::cmd::shell_quote;
use crate::split::SplitKind;

/// Directory layout flags given to `./configure`.
pub const CONFIGURE_DIR_FLAGS: &[&str] = &[
  "--prefix=/usr",
  "--bindir=/usr/bin",
  "--sbindir=/usr/bin",
  "--libdir=/usr/lib64",
  "--libexecdir=/usr/libexec",
  "--includedir=/usr/include",
  "--datarootdir=/usr/share",
  "--datadir=/usr/share",
  "--infodir=/usr/share/info",
  "--mandir=/usr/share/man",
  "--sysconfdir=/etc",
  "--localstatedir=/var",
];

/// Optional features enabled whenever the software supports them.
pub const CONFIGURE_FEATURE_FLAGS: &[&str] = &[
  "--with-curses",
  "--with-cursesw",
  "--with-ncurses",
  "--with-ncursesw",
  "--with-pthreads",
  "--with-threads",
  "--with-readline",
  "--with-history",
];

/// Flags given to every `./configure` call, system flags or not.
pub const CONFIGURE_CORE_FLAGS: &[&str] = &[
  "--build=\"$TARGET\"",
  "--host=\"$HOST\"",
  "--enable-stack-protector=all",
  "--enable-stackguard-randomization",
  "--enable-shared",
  "--enable-static",
  "--with-shared",
  "--with-static",
  "--disable-werror",
  "--disable-option-checking",
];

const MESON_DIR_FLAGS: &[&str] = &[
  "--prefix=/usr",
  "--bindir=/usr/bin",
  "--sbindir=/usr/bin",
  "--libdir=/usr/lib64",
  "--libexecdir=/usr/lib64",
  "--includedir=/usr/include",
  "--datadir=/usr/share",
  "--mandir=/usr/share/man",
  "--sysconfdir=/etc",
  "--localstatedir=/var",
];

/// Options of a `./configure` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configure {
  /// Path to the script, `./configure` by default. Use `../configure` from a separate build folder.
  pub binary: String,
  /// Include [`CONFIGURE_DIR_FLAGS`] and [`CONFIGURE_FEATURE_FLAGS`].
  pub system_flags: bool,
  /// Appended last, so they override the system flags.
  pub flags: Vec<String>,
}

impl Default for Configure {
  fn default() -> Self {
    Self {
      binary: "./configure".to_string(),
      system_flags: true,
      flags: Vec::new(),
    }
  }
}

impl Configure {
  pub fn command(&self) -> String {
    let mut parts = vec![self.binary.clone()];
    parts.extend(CONFIGURE_CORE_FLAGS.iter().map(|f| f.to_string()));
    if self.system_flags {
      parts.extend(CONFIGURE_DIR_FLAGS.iter().map(|f| f.to_string()));
      parts.extend(CONFIGURE_FEATURE_FLAGS.iter().map(|f| f.to_string()));
    }
    parts.extend(self.flags.iter().map(|f| shell_quote(f)));
    parts.join(" ")
  }

  pub fn step(self) -> Step {
    Step::cmd(self.command())
  }
}

/// `./configure` with the system flags followed by `flags`.
pub fn configure<S: AsRef<str>>(flags: &[S]) -> Step {
  Configure {
    flags: flags.iter().map(|f| f.as_ref().to_string()).collect(),
    ..Configure::default()
  }
  .step()
}

fn join_args<S: AsRef<str>>(command: String, args: &[S]) -> String {
  args.iter().fold(command, |mut acc, arg| {
    acc.push(' ');
    acc.push_str(&shell_quote(arg.as_ref()));
    acc
  })
}

pub fn make_command<S: AsRef<str>>(folder: &str, targets: &[S]) -> String {
  join_args(format!("make -C {}", shell_quote(folder)), targets)
}

/// `make -C . <targets>`.
pub fn make<S: AsRef<str>>(targets: &[S]) -> Step {
  Step::cmd(make_command(".", targets))
}

/// `make install`, staged into `$DESTDIR`.
pub fn make_install() -> Step {
  Step::cmd(format!("{} DESTDIR=\"$DESTDIR\"", make_command(".", &["install"])))
}

pub fn cmake_command(folder: &str, cache_entries: &BTreeMap<String, String>) -> String {
  let mut command = "cmake -G 'Unix Makefiles'".to_string();
  for (key, value) in cache_entries {
    command.push(' ');
    command.push_str(&shell_quote(&format!("-D{key}={value}")));
  }
  command.push(' ');
  command.push_str(&shell_quote(folder));
  command
}

/// Generate Unix makefiles for the project in `folder`.
///
/// `CMAKE_INSTALL_PREFIX` defaults to `/usr` unless `cache_entries` sets it.
pub fn cmake(folder: &str, cache_entries: &BTreeMap<String, String>) -> Step {
  let mut entries = cache_entries.clone();
  entries
    .entry("CMAKE_INSTALL_PREFIX".to_string())
    .or_insert_with(|| "/usr".to_string());
  Step::cmd(cmake_command(folder, &entries))
}

/// `meson setup` from inside a build folder, with the sources one level up.
pub fn meson_command<S: AsRef<str>>(args: &[S]) -> String {
  let mut command = "meson setup".to_string();
  for flag in MESON_DIR_FLAGS {
    command.push(' ');
    command.push_str(flag);
  }
  command.push_str(" --backend=ninja --buildtype=release");
  join_args(command, args) + " . .."
}

pub fn meson<S: AsRef<str>>(args: &[S]) -> Step {
  Step::cmd(meson_command(args))
}

pub fn ninja_command<S: AsRef<str>>(folder: &str, args: &[S]) -> String {
  join_args(format!("ninja -C {}", shell_quote(folder)), args)
}

pub fn ninja<S: AsRef<str>>(args: &[S]) -> Step {
  Step::cmd(ninja_command(".", args))
}

pub fn ninja_test() -> Step {
  ninja(&["test"])
}

/// `ninja install`. Ninja reads `DESTDIR` from the environment.
pub fn ninja_install() -> Step {
  ninja(&["install"])
}

pub fn cargo_build() -> Step {
  Step::cmd("cargo build --release")
}

pub fn cargo_check() -> Step {
  Step::cmd("cargo check --release")
}

/// `cargo install` of the crate in the working directory, rooted in `$DESTDIR`.
pub fn cargo_install() -> Step {
  Step::cmd("cargo install --root=\"$DESTDIR\" --path=.")
}

impl Template {
  /// `./configure && make && make check && make install`, everything into one package.
  pub fn autotools<S: AsRef<str>>(configure_flags: &[S]) -> Self {
    Self::default()
      .with_configure(Some(configure(configure_flags)))
      .with_compile(Some(make::<&str>(&[])))
      .with_check(Some(make(&["check"])))
      .with_install(Some(make_install()))
      .with_split(Some(super::split_step(SplitKind::DrainAll)))
  }

  /// A plain Makefile project.
  pub fn make() -> Self {
    Self::default()
      .with_compile(Some(make::<&str>(&[])))
      .with_check(Some(make(&["check"])))
      .with_install(Some(make_install()))
  }

  pub fn cmake(cache_entries: &BTreeMap<String, String>) -> Self {
    Self::make().with_configure(Some(cmake(".", cache_entries)))
  }

  /// `meson setup` in `build/`, then ninja.
  pub fn meson<S: AsRef<str>>(args: &[S]) -> Self {
    Self::default()
      .with_build_folder("build")
      .with_configure(Some(meson(args)))
      .with_compile(Some(ninja::<&str>(&[])))
      .with_check(Some(ninja_test()))
      .with_install(Some(ninja_install()))
  }

  pub fn cargo() -> Self {
    Self::default()
      .with_compile(Some(cargo_build()))
      .with_check(Some(cargo_check()))
      .with_install(Some(cargo_install()))
  }
}
