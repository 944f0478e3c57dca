//! Splitting an install tree into packages.
//!
//! A splitter turns the content of a build's install cache into packages
//! keyed by short name. The built-in ones are declarative [`Layout`]s: the
//! packages to create, then an ordered list of drains and moves applied to
//! them. Once every rule ran, whatever is left in the install cache is
//! drained into the main package and the main package's moves run again.
//! Packages other than the main one are dropped when they end up empty.
//!
//! | kind                 | packages                                         |
//! |----------------------|--------------------------------------------------|
//! | `drain_all`          | `<name>`                                         |
//! | `drain_all_with_doc` | `<name>`, `<name>-doc`                           |
//! | `system`             | `<name>`, `<name>-dev`, `<name>-doc`             |
//! | `library`            | `<name>`, `<name>-dev`, `sys-apps/<name>`, `<name>-doc` |
//! | `application`        | `<name>`, `<name>-doc`                           |

mod rules;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use crate::build::{Build, BuildError};
use crate::package::{Package, PackageId, Packages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
  DrainAll,
  DrainAllWithDoc,
  System,
  Library,
  Application,
}

impl SplitKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::DrainAll => "drain_all",
      Self::DrainAllWithDoc => "drain_all_with_doc",
      Self::System => "system",
      Self::Library => "library",
      Self::Application => "application",
    }
  }

  fn layout(&self) -> &'static Layout {
    match self {
      Self::DrainAll => &rules::DRAIN_ALL,
      Self::DrainAllWithDoc => &rules::DRAIN_ALL_WITH_DOC,
      Self::System => &rules::SYSTEM,
      Self::Library => &rules::LIBRARY,
      Self::Application => &rules::APPLICATION,
    }
  }

  /// Split the build's install cache.
  pub fn split(&self, build: &mut Build<'_>) -> Result<Packages, BuildError> {
    let span = info_span!("split", kind = self.as_str());
    let _guard = span.enter();
    split_with(build, self.layout())
  }
}

impl fmt::Display for SplitKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for SplitKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "drain_all" => Ok(Self::DrainAll),
      "drain_all_with_doc" => Ok(Self::DrainAllWithDoc),
      "system" => Ok(Self::System),
      "library" => Ok(Self::Library),
      "application" => Ok(Self::Application),
      other => Err(format!("unknown splitter: {other}")),
    }
  }
}

/// What a package produced by a layout is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
  Main,
  Dev,
  Doc,
  Binary,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PackageRule {
  role: Role,
  /// Appended to the build's name.
  suffix: &'static str,
  /// Overrides the build's category.
  category: Option<&'static str>,
  /// Overrides the manifest's description.
  description: Option<&'static str>,
  depends_on_main: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Rule {
  /// Move matches from the install cache into the package.
  Drain(Role, &'static [&'static str]),
  /// Move matches inside the package.
  Move(Role, &'static str, &'static str),
}

#[derive(Debug)]
pub(crate) struct Layout {
  packages: &'static [PackageRule],
  rules: &'static [Rule],
  /// Drain the leftovers of the install cache into the main package.
  catch_all: bool,
}

struct Placeholders {
  target: String,
  name: String,
  main: String,
}

impl Placeholders {
  fn expand(&self, text: &str) -> String {
    text
      .replace("@TARGET@", &self.target)
      .replace("@NAME@", &self.name)
      .replace("@MAIN@", &self.main)
  }
}

fn split_with(build: &mut Build<'_>, layout: &Layout) -> Result<Packages, BuildError> {
  let main_id = PackageId::new(build, build.name());
  let placeholders = Placeholders {
    target: build.config().target.clone(),
    name: build.name().to_string(),
    main: main_id.short_name(),
  };

  let mut staged: Vec<(PackageRule, Package)> = Vec::with_capacity(layout.packages.len());
  for rule in layout.packages {
    let mut id = PackageId::new(build, &format!("{}{}", build.name(), rule.suffix));
    if let Some(category) = rule.category {
      id = id.with_category(category);
    }
    if staged.iter().any(|(_, p)| p.id().short_name() == id.short_name()) {
      let renamed = format!("{}-bin", build.name());
      warn!(package = %id, renamed = %renamed, "package name already taken, renaming");
      id = PackageId::new(build, &renamed).with_category(&id.category);
    }
    let description = rule.description.map(|d| placeholders.expand(d));
    let package = Package::create(build, id, description.as_deref())?;
    staged.push((*rule, package));
  }

  for rule in layout.rules {
    apply(&mut staged, rule, &placeholders)?;
  }

  if layout.catch_all {
    apply(&mut staged, &Rule::Drain(Role::Main, &["*"]), &placeholders)?;
    for rule in layout.rules {
      if matches!(rule, Rule::Move(Role::Main, ..)) {
        apply(&mut staged, rule, &placeholders)?;
      }
    }
  }

  let main_index = staged.iter().position(|(rule, _)| rule.role == Role::Main);
  let main = main_index.map(|i| staged[i].1.id().clone());

  let mut packages = Packages::new();
  for (rule, mut package) in staged {
    if rule.role != Role::Main && package.is_empty() {
      debug!(package = %package.id(), "nothing to put in package, skipping");
      continue;
    }
    if rule.depends_on_main
      && let Some(main) = &main
    {
      package.add_dependency(&main.full_name(), &format!("={}", main.version));
    }
    packages.insert(package.id().short_name(), package);
  }
  Ok(packages)
}

fn apply(staged: &mut [(PackageRule, Package)], rule: &Rule, placeholders: &Placeholders) -> Result<(), BuildError> {
  let role = match rule {
    Rule::Drain(role, _) | Rule::Move(role, ..) => *role,
  };
  let Some((_, package)) = staged.iter_mut().find(|(r, _)| r.role == role) else {
    return Ok(());
  };

  match rule {
    Rule::Drain(_, patterns) => {
      let patterns: Vec<String> = patterns.iter().map(|p| placeholders.expand(p)).collect();
      let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
      package.drain(&patterns)?;
    }
    Rule::Move(_, src, dst) => {
      package.move_files(&placeholders.expand(src), &placeholders.expand(dst))?;
    }
  }
  Ok(())
}
