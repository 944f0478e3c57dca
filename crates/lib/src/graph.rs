//! Dependency graph of the packages produced by a build.
//!
//! Nothing prevents packages from depending on each other in a loop. Cycles
//! are found with Tarjan's algorithm and reported; resolving them is left to
//! whoever installs the packages.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::warn;

use crate::package::Packages;

/// Dependency cycles among `packages`, as lists of full names.
///
/// Only edges between packages of the set are considered. Each cycle is
/// sorted, and cycles are sorted by their first member.
pub fn dependency_cycles(packages: &Packages) -> Vec<Vec<String>> {
  let mut graph: DiGraph<String, ()> = DiGraph::new();
  let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

  for package in packages.values() {
    let name = package.id().full_name();
    let idx = graph.add_node(name.clone());
    nodes.insert(name, idx);
  }

  for package in packages.values() {
    let from = nodes[&package.id().full_name()];
    for dependency in package.dependencies().keys() {
      if let Some(&to) = nodes.get(dependency) {
        graph.add_edge(from, to, ());
      }
    }
  }

  let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
    .into_iter()
    .filter(|component| component.len() > 1 || graph.contains_edge(component[0], component[0]))
    .map(|component| {
      let mut names: Vec<String> = component.into_iter().map(|idx| graph[idx].clone()).collect();
      names.sort();
      names
    })
    .collect();
  cycles.sort();
  cycles
}

/// Log a warning for each dependency cycle among `packages`.
pub fn warn_cycles(packages: &Packages) -> Vec<Vec<String>> {
  let cycles = dependency_cycles(packages);
  for cycle in &cycles {
    warn!(packages = %cycle.join(" -> "), "dependency cycle");
  }
  cycles
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::package::Package;
  use crate::util::testutil::Fixture;
  use tracing_test::traced_test;

  fn packages(build: &crate::build::Build<'_>, names: &[&str]) -> Packages {
    names
      .iter()
      .map(|name| {
        let package = Package::new(build, name).unwrap();
        (package.id().short_name(), package)
      })
      .collect()
  }

  #[test]
  fn acyclic_set_has_no_cycle() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut set = packages(&build, &["hello", "hello-dev"]);
    set
      .get_mut("sys-apps/hello-dev")
      .unwrap()
      .add_dependency("stable::sys-apps/hello", "=1.0.0");

    assert!(dependency_cycles(&set).is_empty());
  }

  #[test]
  #[traced_test]
  fn mutual_dependencies_are_a_cycle() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut set = packages(&build, &["a", "b", "c"]);
    set.get_mut("sys-apps/a").unwrap().add_dependency("stable::sys-apps/b", "*");
    set.get_mut("sys-apps/b").unwrap().add_dependency("stable::sys-apps/a", "*");
    set.get_mut("sys-apps/c").unwrap().add_dependency("stable::sys-apps/a", "*");

    assert_eq!(
      warn_cycles(&set),
      vec![vec!["stable::sys-apps/a".to_string(), "stable::sys-apps/b".to_string()]]
    );
    assert!(logs_contain("dependency cycle"));
  }

  #[test]
  fn self_dependency_is_a_cycle() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut set = packages(&build, &["a"]);
    set.get_mut("sys-apps/a").unwrap().add_dependency("stable::sys-apps/a", "*");

    assert_eq!(dependency_cycles(&set), vec![vec!["stable::sys-apps/a".to_string()]]);
  }

  #[test]
  fn external_dependencies_are_ignored() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut set = packages(&build, &["a"]);
    set.get_mut("sys-apps/a").unwrap().add_dependency("stable::sys-libs/glibc", "*");

    assert!(dependency_cycles(&set).is_empty());
  }
}
