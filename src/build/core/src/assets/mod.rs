/* src/build/core/src/assets/mod.rs */

// Chunk-graph walk over the bundler's per-module manifest.

mod manifest;

pub use manifest::{
  HmrInfo, Manifest, RouteManifestEntry, build_dev_manifest, build_manifest, manifest_file_name,
  write_manifest_file,
};
pub(crate) use manifest::dev_route_entry;

use std::collections::HashSet;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;
use crate::error::{BuildError, Result};

/// One bundler output chunk (Vite manifest entry shape).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
  pub file: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub src: Option<String>,
  #[serde(default)]
  pub is_entry: bool,
  /// Keys of statically imported chunks.
  #[serde(default)]
  pub imports: Vec<String>,
  #[serde(default)]
  pub dynamic_imports: Vec<String>,
  /// Output-relative stylesheet files.
  #[serde(default)]
  pub css: Vec<String>,
}

/// Flat `{key -> Chunk}` map; keys are project-relative source paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkManifest(pub IndexMap<String, Chunk>);

impl ChunkManifest {
  pub fn from_json(content: &str) -> serde_json::Result<Self> {
    serde_json::from_str(content)
  }

  pub async fn read(path: &Path) -> Result<Self> {
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| BuildError::io("read chunk manifest", path, e))?;
    Self::from_json(&content).map_err(|e| {
      BuildError::configuration(format!("invalid chunk manifest {}: {e}", path.display()))
    })
  }

  pub fn get(&self, key: &str) -> Result<&Chunk> {
    self.0.get(key).ok_or_else(|| BuildError::missing_key("chunk manifest", key, self.0.keys()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Resolved script and style URLs for one entry module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAssets {
  pub module: String,
  pub imports: Vec<String>,
  pub css: Vec<String>,
}

/// Chunk keys reachable from `roots`, preorder, each visited once.
fn reachable<'a>(chunks: &'a ChunkManifest, roots: &[&'a str]) -> Result<Vec<&'a Chunk>> {
  let mut visited: HashSet<&str> = HashSet::new();
  let mut order = Vec::new();
  let mut stack: Vec<&str> = roots.iter().rev().copied().collect();
  while let Some(key) = stack.pop() {
    if !visited.insert(key) {
      continue;
    }
    let chunk = chunks.get(key)?;
    order.push(chunk);
    stack.extend(chunk.imports.iter().rev().map(String::as_str));
  }
  Ok(order)
}

/// Resolve `entry` (plus `prepend` chunks, walked first) to public URLs.
///
/// Imports and stylesheets keep first-seen order across a preorder walk.
pub fn resolve_assets(
  config: &BuildConfig,
  chunks: &ChunkManifest,
  entry: &Path,
  prepend: &[&Path],
) -> Result<EntryAssets> {
  let prepend: Vec<String> = prepend.iter().map(|p| config.relative_key(p)).collect();
  resolve_keys(config, chunks, &config.relative_key(entry), &prepend)
}

/// [`resolve_assets`] over chunk-manifest keys.
pub fn resolve_keys(
  config: &BuildConfig,
  chunks: &ChunkManifest,
  entry_key: &str,
  prepend: &[String],
) -> Result<EntryAssets> {
  let entry_chunk = chunks.get(entry_key)?;
  let mut roots: Vec<&str> = prepend.iter().map(String::as_str).collect();
  roots.push(entry_key);
  let walked = reachable(chunks, &roots)?;

  let public = &config.public_path;
  let import_keys: IndexSet<&str> =
    walked.iter().flat_map(|c| c.imports.iter().map(String::as_str)).collect();
  let imports = import_keys
    .into_iter()
    .map(|key| chunks.get(key).map(|c| format!("{public}{}", c.file)))
    .collect::<Result<Vec<_>>>()?;
  let css_files: IndexSet<&str> = walked.iter().flat_map(|c| c.css.iter().map(String::as_str)).collect();
  let css = css_files.into_iter().map(|href| format!("{public}{href}")).collect();

  Ok(EntryAssets { module: format!("{public}{}", entry_chunk.file), imports, css })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BuildMode;

  fn chunk(file: &str, imports: &[&str], css: &[&str]) -> Chunk {
    Chunk {
      file: file.to_string(),
      imports: imports.iter().map(ToString::to_string).collect(),
      css: css.iter().map(ToString::to_string).collect(),
      ..Chunk::default()
    }
  }

  fn manifest(entries: &[(&str, Chunk)]) -> ChunkManifest {
    ChunkManifest(entries.iter().map(|(k, c)| (k.to_string(), c.clone())).collect())
  }

  fn config() -> BuildConfig {
    let mut c = BuildConfig::new("/proj", BuildMode::Production);
    c.public_path = "/static/".to_string();
    c
  }

  #[test]
  fn first_seen_order_without_duplicates() {
    let chunks = manifest(&[
      ("app/a.tsx", chunk("assets/a.js", &["b", "c"], &["assets/a.css"])),
      ("b", chunk("assets/b.js", &["c"], &["assets/shared.css"])),
      ("c", chunk("assets/c.js", &[], &["assets/shared.css", "assets/c.css"])),
    ]);
    let r = resolve_assets(&config(), &chunks, Path::new("/proj/app/a.tsx"), &[]).unwrap();
    assert_eq!(r.module, "/static/assets/a.js");
    assert_eq!(r.imports, vec!["/static/assets/b.js", "/static/assets/c.js"]);
    assert_eq!(r.css, vec!["/static/assets/a.css", "/static/assets/shared.css", "/static/assets/c.css"]);
  }

  #[test]
  fn prepended_chunks_come_first() {
    let chunks = manifest(&[
      ("app/entry.client.tsx", chunk("assets/entry.js", &["runtime"], &[])),
      ("runtime", chunk("assets/runtime.js", &[], &[])),
      ("app/root.tsx", chunk("assets/root.js", &["runtime", "ui"], &["assets/root.css"])),
      ("ui", chunk("assets/ui.js", &[], &[])),
    ]);
    let r = resolve_assets(
      &config(),
      &chunks,
      Path::new("/proj/app/root.tsx"),
      &[Path::new("/proj/app/entry.client.tsx")],
    )
    .unwrap();
    assert_eq!(r.module, "/static/assets/root.js");
    assert_eq!(r.imports, vec!["/static/assets/runtime.js", "/static/assets/ui.js"]);
  }

  #[test]
  fn cycles_terminate() {
    let chunks = manifest(&[
      ("app/a.tsx", chunk("a.js", &["b"], &[])),
      ("b", chunk("b.js", &["app/a.tsx"], &[])),
    ]);
    let r = resolve_assets(&config(), &chunks, Path::new("/proj/app/a.tsx"), &[]).unwrap();
    assert_eq!(r.imports, vec!["/static/b.js", "/static/a.js"]);
  }

  #[test]
  fn missing_entry_lists_known_keys() {
    let chunks = manifest(&[("app/a.tsx", chunk("a.js", &[], &[]))]);
    let err = resolve_assets(&config(), &chunks, Path::new("/proj/app/missing.tsx"), &[]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("app/missing.tsx"));
    assert!(msg.contains("known entries: app/a.tsx"));
  }

  #[test]
  fn parses_vite_manifest() {
    let json = r#"{
      "app/root.tsx": {"file": "assets/root-1a2b.js", "src": "app/root.tsx", "isEntry": true,
                       "imports": ["_shared.js"], "dynamicImports": ["app/lazy.tsx"], "css": ["assets/root.css"]},
      "_shared.js": {"file": "assets/shared-9f.js"}
    }"#;
    let m = ChunkManifest::from_json(json).unwrap();
    assert_eq!(m.len(), 2);
    let root = m.get("app/root.tsx").unwrap();
    assert!(root.is_entry);
    assert_eq!(root.dynamic_imports, vec!["app/lazy.tsx"]);
    assert!(m.get("_shared.js").unwrap().css.is_empty());
  }
}
