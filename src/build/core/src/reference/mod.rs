/* src/build/core/src/reference/mod.rs */

// Cross-boundary reference tracking: per-kind module sets, identifiers, dispatch tables.

mod transform;

pub use transform::rewrite_boundary;

use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::config::{BuildConfig, to_slash};
use crate::hash::content_hash;
use crate::scan::Boundary;

/// Hex length of hashed production identifiers.
const HASHED_ID_LEN: usize = 12;

/// Client and server reference sets for one build.
///
/// Sets are insertion-ordered and mutually exclusive: adding a module to one
/// kind removes it from the other.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSets {
  client: IndexSet<PathBuf>,
  server: IndexSet<PathBuf>,
}

impl ReferenceSets {
  /// Track `module` under `kind`. Returns true when the set grew.
  pub fn insert(&mut self, kind: Boundary, module: &Path) -> bool {
    let (target, other) = match kind {
      Boundary::Client => (&mut self.client, &mut self.server),
      Boundary::Server => (&mut self.server, &mut self.client),
    };
    if other.shift_remove(module) {
      tracing::warn!(module = %module.display(), kind = kind.as_str(), "module changed boundary kind");
    }
    target.insert(module.to_path_buf())
  }

  pub fn get(&self, kind: Boundary) -> &IndexSet<PathBuf> {
    match kind {
      Boundary::Client => &self.client,
      Boundary::Server => &self.server,
    }
  }

  pub fn client(&self) -> &IndexSet<PathBuf> {
    &self.client
  }

  pub fn server(&self) -> &IndexSet<PathBuf> {
    &self.server
  }

  pub fn contains(&self, kind: Boundary, module: &Path) -> bool {
    self.get(kind).contains(module)
  }

  /// Drop `module` from both sets (file removed in dev).
  pub fn remove(&mut self, module: &Path) -> bool {
    let a = self.client.shift_remove(module);
    let b = self.server.shift_remove(module);
    a || b
  }

  pub fn clear(&mut self) {
    self.client.clear();
    self.server.clear();
  }
}

/// Stable identifier for `module`, a pure function of its path and the build settings.
///
/// Development ids are URL-like so the dev server can import them directly:
/// `/app/x.tsx` inside the root, `/@fs/abs/x.tsx` outside. Production ids are
/// relative to the root, or a truncated SHA-256 of that when `hash_identifiers`
/// is set.
pub fn identifier(config: &BuildConfig, module: &Path) -> String {
  if config.mode.is_dev() {
    return match module.strip_prefix(&config.root_dir) {
      Ok(rel) => format!("/{}", to_slash(rel)),
      Err(_) => format!("/@fs/{}", to_slash(module)),
    };
  }
  let rel = pathdiff::diff_paths(module, &config.root_dir).unwrap_or_else(|| module.to_path_buf());
  let rel = to_slash(&rel);
  if config.hash_identifiers { content_hash(rel.as_bytes(), HASHED_ID_LEN) } else { rel }
}

/// Reverse of [`identifier`] over the currently tracked modules of `kind`.
pub fn module_for_identifier(
  config: &BuildConfig,
  sets: &ReferenceSets,
  kind: Boundary,
  id: &str,
) -> Option<PathBuf> {
  sets.get(kind).iter().find(|m| identifier(config, m) == id).cloned()
}

/// Dispatch module source: default export mapping identifier to a lazy import thunk.
pub fn dispatch_table<'a>(config: &BuildConfig, modules: impl IntoIterator<Item = &'a PathBuf>) -> String {
  let mut out = String::from("export default {\n");
  for module in modules {
    let id = json_str(&identifier(config, module));
    let path = json_str(&to_import_path(module));
    out.push_str(&format!("  {id}: () => import({path}),\n"));
  }
  out.push_str("};\n");
  out
}

/// `/`-separated absolute path usable as an import specifier.
pub(crate) fn to_import_path(module: &Path) -> String {
  let slashed = to_slash(module);
  if module.has_root() && !slashed.starts_with('/') { format!("/{slashed}") } else { slashed }
}

pub(crate) fn json_str(value: &str) -> String {
  serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BuildMode;

  fn config(mode: BuildMode) -> BuildConfig {
    BuildConfig::new("/proj", mode)
  }

  #[test]
  fn dev_identifier_inside_root() {
    let c = config(BuildMode::Development);
    assert_eq!(identifier(&c, Path::new("/proj/app/button.tsx")), "/app/button.tsx");
  }

  #[test]
  fn dev_identifier_outside_root() {
    let c = config(BuildMode::Development);
    assert_eq!(
      identifier(&c, Path::new("/opt/shared/widget.tsx")),
      "/@fs/opt/shared/widget.tsx"
    );
  }

  #[test]
  fn prod_identifier_is_relative() {
    let c = config(BuildMode::Production);
    assert_eq!(identifier(&c, Path::new("/proj/app/button.tsx")), "app/button.tsx");
    assert_eq!(identifier(&c, Path::new("/opt/lib/x.ts")), "../opt/lib/x.ts");
  }

  #[test]
  fn hashed_identifier_is_stable() {
    let mut c = config(BuildMode::Production);
    c.hash_identifiers = true;
    let a = identifier(&c, Path::new("/proj/app/button.tsx"));
    let b = identifier(&c, Path::new("/proj/app/button.tsx"));
    assert_eq!(a, b);
    assert_eq!(a.len(), 12);
    assert_eq!(a, content_hash(b"app/button.tsx", 12));
  }

  #[test]
  fn sets_are_exclusive_and_ordered() {
    let mut sets = ReferenceSets::default();
    assert!(sets.insert(Boundary::Client, Path::new("/p/b.tsx")));
    assert!(sets.insert(Boundary::Client, Path::new("/p/a.tsx")));
    assert!(!sets.insert(Boundary::Client, Path::new("/p/b.tsx")));
    let order: Vec<_> = sets.client().iter().map(|p| p.to_string_lossy().to_string()).collect();
    assert_eq!(order, vec!["/p/b.tsx", "/p/a.tsx"]);

    assert!(sets.insert(Boundary::Server, Path::new("/p/a.tsx")));
    assert!(!sets.contains(Boundary::Client, Path::new("/p/a.tsx")));
    assert_eq!(sets.client().len(), 1);
    assert_eq!(sets.server().len(), 1);
  }

  #[test]
  fn dispatch_table_maps_ids_to_imports() {
    let c = config(BuildMode::Production);
    let modules = vec![PathBuf::from("/proj/app/a.ts"), PathBuf::from("/proj/app/b.ts")];
    let src = dispatch_table(&c, &modules);
    assert_eq!(
      src,
      "export default {\n  \"app/a.ts\": () => import(\"/proj/app/a.ts\"),\n  \"app/b.ts\": () => import(\"/proj/app/b.ts\"),\n};\n"
    );
  }

  #[test]
  fn empty_dispatch_table() {
    let c = config(BuildMode::Development);
    assert_eq!(dispatch_table(&c, &Vec::new()), "export default {\n};\n");
  }

  #[test]
  fn reverse_lookup() {
    let c = config(BuildMode::Development);
    let mut sets = ReferenceSets::default();
    sets.insert(Boundary::Server, Path::new("/proj/app/actions.ts"));
    assert_eq!(
      module_for_identifier(&c, &sets, Boundary::Server, "/app/actions.ts"),
      Some(PathBuf::from("/proj/app/actions.ts"))
    );
    assert_eq!(module_for_identifier(&c, &sets, Boundary::Client, "/app/actions.ts"), None);
  }
}
