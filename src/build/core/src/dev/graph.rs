/* src/build/core/src/dev/graph.rs */

// Per-environment module dependency graph built from transform-time import scans.

use std::collections::{HashMap, VecDeque};
use std::path::{Component, Path, PathBuf};

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::config::Environment;
use crate::route::MODULE_EXTENSIONS;
use crate::virtual_module::VirtualModule;

#[derive(Debug, Clone, Default)]
pub struct ModuleNode {
  pub importers: IndexSet<String>,
  pub imports: IndexSet<String>,
  /// Set by invalidation, cleared when the module is transformed again.
  pub stale: bool,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
  nodes: HashMap<String, ModuleNode>,
}

impl ModuleGraph {
  pub fn contains(&self, id: &str) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn get(&self, id: &str) -> Option<&ModuleNode> {
    self.nodes.get(id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn is_stale(&self, id: &str) -> bool {
    self.nodes.get(id).is_some_and(|n| n.stale)
  }

  /// Clear the stale flag of a known node.
  pub fn mark_fresh(&mut self, id: &str) {
    if let Some(node) = self.nodes.get_mut(id) {
      node.stale = false;
    }
  }

  /// Replace the import edges of `id` with `imports`; marks `id` fresh.
  pub fn set_imports(&mut self, id: &str, imports: impl IntoIterator<Item = String>) {
    let next: IndexSet<String> = imports.into_iter().filter(|dep| dep != id).collect();
    let node = self.nodes.entry(id.to_string()).or_default();
    node.stale = false;
    let previous = std::mem::replace(&mut node.imports, next.clone());
    for dep in previous.difference(&next) {
      if let Some(dep_node) = self.nodes.get_mut(dep) {
        dep_node.importers.shift_remove(id);
      }
    }
    for dep in next {
      self.nodes.entry(dep).or_default().importers.insert(id.to_string());
    }
  }

  /// Mark `id` and every transitive importer stale. Returns them in BFS order, `id` first.
  pub fn invalidate(&mut self, id: &str) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut queue: VecDeque<String> = VecDeque::from([id.to_string()]);
    while let Some(current) = queue.pop_front() {
      let Some(node) = self.nodes.get_mut(&current) else {
        continue;
      };
      if !seen.insert(current.clone()) {
        continue;
      }
      node.stale = true;
      queue.extend(node.importers.iter().cloned());
    }
    seen.into_iter().collect()
  }

  /// Invalidate dependents of `id`, then drop it and its edges.
  pub fn remove(&mut self, id: &str) -> Vec<String> {
    let invalidated = self.invalidate(id);
    if let Some(node) = self.nodes.remove(id) {
      for dep in &node.imports {
        if let Some(dep_node) = self.nodes.get_mut(dep) {
          dep_node.importers.shift_remove(id);
        }
      }
      for importer in &node.importers {
        if let Some(importer_node) = self.nodes.get_mut(importer) {
          importer_node.imports.shift_remove(id);
        }
      }
    }
    invalidated
  }
}

/// Graphs for the environments whose module instances live in the dev server process.
#[derive(Debug, Default)]
pub struct ModuleGraphs {
  server: Mutex<ModuleGraph>,
  ssr: Mutex<ModuleGraph>,
}

impl ModuleGraphs {
  pub const TRACKED: [Environment; 2] = [Environment::Server, Environment::Ssr];

  pub fn get(&self, env: Environment) -> Option<&Mutex<ModuleGraph>> {
    match env {
      Environment::Server => Some(&self.server),
      Environment::Ssr => Some(&self.ssr),
      Environment::Client => None,
    }
  }

  /// Record the resolved imports of `importer` as seen by `env`.
  pub fn record(&self, env: Environment, importer: &Path, specifiers: &[String]) {
    let Some(graph) = self.get(env) else {
      return;
    };
    let deps: Vec<String> = specifiers.iter().filter_map(|s| resolve_import(importer, s)).collect();
    graph.lock().set_imports(&module_key(importer), deps);
  }

  /// A module was reloaded without a transform (virtual modules).
  pub fn mark_fresh(&self, module: &str) {
    for env in Self::TRACKED {
      self.graph(env).lock().mark_fresh(module);
    }
  }

  /// Invalidate `module` in every tracked graph; returns affected ids per environment.
  pub fn invalidate(&self, module: &str) -> Vec<(Environment, Vec<String>)> {
    Self::TRACKED.into_iter().map(|env| (env, self.graph(env).lock().invalidate(module))).collect()
  }

  /// Invalidate dependents of `module` and drop it from every tracked graph.
  pub fn remove(&self, module: &str) -> Vec<(Environment, Vec<String>)> {
    Self::TRACKED.into_iter().map(|env| (env, self.graph(env).lock().remove(module))).collect()
  }

  fn graph(&self, env: Environment) -> &Mutex<ModuleGraph> {
    match env {
      Environment::Ssr => &self.ssr,
      _ => &self.server,
    }
  }
}

pub(crate) fn module_key(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Best-effort resolution of an import specifier to a graph key.
///
/// Virtual ids map to their internal id; relative and absolute specifiers to a
/// normalized path, trying module extensions and `index.*` with blocking
/// file checks. Bare package specifiers are not tracked.
pub fn resolve_import(importer: &Path, specifier: &str) -> Option<String> {
  if let Some(module) = VirtualModule::parse(specifier) {
    return Some(module.internal_id());
  }
  let specifier = specifier.split(['?', '#']).next().unwrap_or(specifier);
  let base = if specifier.starts_with("./") || specifier.starts_with("../") {
    importer.parent()?.join(specifier)
  } else if specifier.starts_with('/') {
    PathBuf::from(specifier)
  } else {
    return None;
  };
  let base = normalize(&base);
  Some(module_key(&existing_module(&base).unwrap_or(base)))
}

fn existing_module(base: &Path) -> Option<PathBuf> {
  if base.is_file() {
    return Some(base.to_path_buf());
  }
  let file_name = base.file_name()?.to_string_lossy().into_owned();
  MODULE_EXTENSIONS
    .iter()
    .map(|ext| base.with_file_name(format!("{file_name}.{ext}")))
    .chain(MODULE_EXTENSIONS.iter().map(|ext| base.join(format!("index.{ext}"))))
    .find(|candidate| candidate.is_file())
}

/// Lexical `.` / `..` folding.
pub(crate) fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
  }

  #[test]
  fn invalidation_walks_importers_transitively() {
    let mut graph = ModuleGraph::default();
    graph.set_imports("entry", ids(&["route"]));
    graph.set_imports("route", ids(&["util"]));
    graph.set_imports("other", ids(&["leaf"]));
    let hit = graph.invalidate("util");
    assert_eq!(hit, ids(&["util", "route", "entry"]));
    assert!(graph.is_stale("entry"));
    assert!(!graph.is_stale("other"));
  }

  #[test]
  fn cycles_are_visited_once() {
    let mut graph = ModuleGraph::default();
    graph.set_imports("a", ids(&["b"]));
    graph.set_imports("b", ids(&["a"]));
    assert_eq!(graph.invalidate("a"), ids(&["a", "b"]));
  }

  #[test]
  fn reimport_drops_stale_edges() {
    let mut graph = ModuleGraph::default();
    graph.set_imports("route", ids(&["old"]));
    graph.set_imports("route", ids(&["new"]));
    assert!(graph.get("old").unwrap().importers.is_empty());
    assert_eq!(graph.invalidate("old"), ids(&["old"]));
    assert_eq!(graph.invalidate("new"), ids(&["new", "route"]));
  }

  #[test]
  fn transform_marks_fresh() {
    let mut graph = ModuleGraph::default();
    graph.set_imports("a", ids(&["b"]));
    graph.invalidate("b");
    assert!(graph.is_stale("a"));
    graph.set_imports("a", ids(&["b"]));
    assert!(!graph.is_stale("a"));
  }

  #[test]
  fn reload_clears_stale_flag() {
    let mut graph = ModuleGraph::default();
    graph.set_imports("a", ids(&["v"]));
    graph.invalidate("v");
    graph.mark_fresh("v");
    assert!(!graph.is_stale("v"));
    assert!(graph.is_stale("a"));
    graph.mark_fresh("missing");
    assert!(!graph.contains("missing"));
  }

  #[test]
  fn remove_detaches_node() {
    let mut graph = ModuleGraph::default();
    graph.set_imports("a", ids(&["b"]));
    graph.set_imports("b", ids(&["c"]));
    let hit = graph.remove("b");
    assert_eq!(hit, ids(&["b", "a"]));
    assert!(!graph.contains("b"));
    assert!(graph.get("a").unwrap().imports.is_empty());
    assert!(graph.get("c").unwrap().importers.is_empty());
  }

  #[test]
  fn unknown_module_invalidates_nothing() {
    let mut graph = ModuleGraph::default();
    assert!(graph.invalidate("missing").is_empty());
  }

  #[test]
  fn resolves_relative_and_virtual_specifiers() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app/lib")).unwrap();
    fs::write(dir.path().join("app/util.ts"), "").unwrap();
    fs::write(dir.path().join("app/lib/index.tsx"), "").unwrap();
    let importer = dir.path().join("app/routes/../root.tsx");

    assert_eq!(
      resolve_import(&importer, "./util").unwrap(),
      module_key(&dir.path().join("app/util.ts"))
    );
    assert_eq!(
      resolve_import(&importer, "./lib?raw").unwrap(),
      module_key(&dir.path().join("app/lib/index.tsx"))
    );
    assert_eq!(resolve_import(&importer, "virtual:tandem/manifest").unwrap(), "\0virtual:tandem/manifest");
    assert_eq!(resolve_import(&importer, "react"), None);
  }

  #[test]
  fn client_environment_is_not_tracked() {
    let graphs = ModuleGraphs::default();
    graphs.record(Environment::Client, Path::new("/p/a.ts"), &ids(&["/p/b.ts"]));
    assert!(graphs.get(Environment::Client).is_none());
    assert!(graphs.get(Environment::Server).unwrap().lock().is_empty());
  }
}
