/* src/build/core/src/assets/manifest.rs */

// Versioned route/asset manifest consumed by the browser runtime and the server shell.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{ChunkManifest, EntryAssets, resolve_keys};
use crate::config::{BuildConfig, Environment};
use crate::error::{BuildError, Result};
use crate::hash::content_hash;
use crate::route::{Route, RouteCapabilities, RouteTable};
use crate::virtual_module::VirtualModule;

const VERSION_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteManifestEntry {
  #[serde(flatten)]
  pub route: Route,
  #[serde(flatten)]
  pub capabilities: RouteCapabilities,
  pub module: String,
  pub imports: Vec<String>,
  pub css: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrInfo {
  pub runtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
  pub version: String,
  pub url: String,
  pub entry: EntryAssets,
  pub routes: IndexMap<String, RouteManifestEntry>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hmr: Option<HmrInfo>,
}

#[derive(Serialize)]
struct VersionInput<'a> {
  entry: &'a EntryAssets,
  routes: &'a IndexMap<String, RouteManifestEntry>,
}

impl Manifest {
  fn assemble(
    config: &BuildConfig,
    entry: EntryAssets,
    routes: IndexMap<String, RouteManifestEntry>,
    hmr: Option<HmrInfo>,
  ) -> Result<Self> {
    let mut manifest = Self { version: String::new(), url: String::new(), entry, routes, hmr };
    manifest.rehash(config)?;
    Ok(manifest)
  }

  /// Recompute `version` and `url` from the current entry and routes.
  pub fn rehash(&mut self, config: &BuildConfig) -> Result<()> {
    let input = serde_json::to_vec(&VersionInput { entry: &self.entry, routes: &self.routes })
      .map_err(|e| BuildError::configuration(format!("failed to serialize manifest: {e}")))?;
    self.version = content_hash(&input, VERSION_LEN);
    self.url = format!("{}assets/{}", config.public_path, manifest_file_name(&self.version));
    Ok(())
  }

  pub fn to_json(&self) -> Result<String> {
    serde_json::to_string(self)
      .map_err(|e| BuildError::configuration(format!("failed to serialize manifest: {e}")))
  }
}

pub fn manifest_file_name(version: &str) -> String {
  format!("manifest-{version}.js")
}

/// Chunk-manifest key of the browser entry: the app's client entry, else the virtual one.
fn client_entry_key(config: &BuildConfig, table: &RouteTable) -> String {
  match &table.entries.client {
    Some(path) => config.relative_key(path),
    None => VirtualModule::BrowserEntry.public_id(),
  }
}

/// Production manifest from the client chunk graph.
pub fn build_manifest(config: &BuildConfig, table: &RouteTable, chunks: &ChunkManifest) -> Result<Manifest> {
  let entry_key = client_entry_key(config, table);
  let entry = resolve_keys(config, chunks, &entry_key, &[])?;

  let mut routes = IndexMap::new();
  for record in table.iter() {
    let key = config.relative_key(&record.source);
    // the root route carries the client entry's assets
    let prepend = if record.route.parent_id.is_none() { vec![entry_key.clone()] } else { Vec::new() };
    let assets = resolve_keys(config, chunks, &key, &prepend)?;
    routes.insert(
      record.route.id.clone(),
      RouteManifestEntry {
        route: record.route.clone(),
        capabilities: record.capabilities,
        module: assets.module,
        imports: assets.imports,
        css: assets.css,
      },
    );
  }
  Manifest::assemble(config, entry, routes, None)
}

/// Development manifest: source URLs served by the dev bundler, no chunk graph.
pub fn build_dev_manifest(config: &BuildConfig, table: &RouteTable) -> Result<Manifest> {
  let public = &config.public_path;
  let entry_module = match &table.entries.client {
    Some(path) => format!("{public}{}", config.relative_key(path)),
    None => format!("{public}{}", VirtualModule::BrowserEntry.dev_url_path()),
  };
  let entry = EntryAssets { module: entry_module, imports: Vec::new(), css: Vec::new() };

  let routes = table
    .iter()
    .map(|record| (record.route.id.clone(), dev_route_entry(config, record)))
    .collect();
  let hmr = HmrInfo { runtime: format!("{public}{}", VirtualModule::HmrRuntime.dev_url_path()) };
  Manifest::assemble(config, entry, routes, Some(hmr))
}

pub(crate) fn dev_route_entry(config: &BuildConfig, record: &crate::route::RouteRecord) -> RouteManifestEntry {
  RouteManifestEntry {
    route: record.route.clone(),
    capabilities: record.capabilities,
    module: format!("{}{}", config.public_path, config.relative_key(&record.source)),
    imports: Vec::new(),
    css: Vec::new(),
  }
}

/// Write `window.__tandemManifest=<json>;` under the browser assets directory.
pub async fn write_manifest_file(config: &BuildConfig, manifest: &Manifest) -> Result<PathBuf> {
  let dir = config.env_out_dir(Environment::Client).join("assets");
  tokio::fs::create_dir_all(&dir)
    .await
    .map_err(|e| BuildError::io("create directory", &dir, e))?;
  let path = dir.join(manifest_file_name(&manifest.version));
  let content = format!("window.__tandemManifest={};", manifest.to_json()?);
  tokio::fs::write(&path, content)
    .await
    .map_err(|e| BuildError::io("write manifest", &path, e))?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use crate::assets::Chunk;
  use crate::config::BuildMode;
  use crate::route::build_route_table;
  use crate::scan::OxcExportLister;

  fn chunk(file: &str, imports: &[&str], css: &[&str]) -> Chunk {
    Chunk {
      file: file.to_string(),
      imports: imports.iter().map(ToString::to_string).collect(),
      css: css.iter().map(ToString::to_string).collect(),
      ..Chunk::default()
    }
  }

  async fn fixture(mode: BuildMode) -> (tempfile::TempDir, BuildConfig, RouteTable) {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("app");
    fs::create_dir_all(app.join("routes")).unwrap();
    fs::write(app.join("root.tsx"), "export default function Root() {}\n").unwrap();
    fs::write(app.join("entry.client.tsx"), "import './x';\n").unwrap();
    fs::write(
      app.join("routes/_index.tsx"),
      "export async function loader() {}\nexport default function Home() {}\n",
    )
    .unwrap();
    let config = BuildConfig::new(dir.path(), mode);
    let table = build_route_table(&config, &OxcExportLister).await.unwrap();
    (dir, config, table)
  }

  fn chunks() -> ChunkManifest {
    ChunkManifest(
      [
        ("app/entry.client.tsx", chunk("assets/entry.js", &["_rt.js"], &[])),
        ("_rt.js", chunk("assets/rt.js", &[], &[])),
        ("app/root.tsx", chunk("assets/root.js", &["_rt.js"], &["assets/root.css"])),
        ("app/routes/_index.tsx", chunk("assets/index.js", &["_rt.js"], &[])),
      ]
      .into_iter()
      .map(|(k, c)| (k.to_string(), c))
      .collect(),
    )
  }

  #[tokio::test]
  async fn production_manifest_is_versioned() {
    let (_dir, config, table) = fixture(BuildMode::Production).await;
    let manifest = build_manifest(&config, &table, &chunks()).unwrap();
    assert_eq!(manifest.version.len(), 8);
    assert_eq!(manifest.url, format!("/assets/manifest-{}.js", manifest.version));
    assert_eq!(manifest.entry.module, "/assets/entry.js");
    assert!(manifest.hmr.is_none());

    let root = &manifest.routes["root"];
    assert_eq!(root.module, "/assets/root.js");
    assert_eq!(root.imports, vec!["/assets/rt.js"]);
    assert_eq!(root.css, vec!["/assets/root.css"]);

    let index = &manifest.routes["routes/_index"];
    assert!(index.capabilities.has_loader);
    assert!(index.route.index);
  }

  #[tokio::test]
  async fn version_tracks_content() {
    let (_dir, config, table) = fixture(BuildMode::Production).await;
    let a = build_manifest(&config, &table, &chunks()).unwrap();
    let b = build_manifest(&config, &table, &chunks()).unwrap();
    assert_eq!(a.version, b.version);

    let mut changed = chunks();
    changed.0.get_mut("app/root.tsx").unwrap().file = "assets/root-2.js".to_string();
    let c = build_manifest(&config, &table, &changed).unwrap();
    assert_ne!(a.version, c.version);
  }

  #[tokio::test]
  async fn serializes_camel_case_flat_entries() {
    let (_dir, config, table) = fixture(BuildMode::Production).await;
    let manifest = build_manifest(&config, &table, &chunks()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
    let index = &json["routes"]["routes/_index"];
    assert_eq!(index["parentId"], "root");
    assert_eq!(index["hasLoader"], true);
    assert_eq!(index["hasClientAction"], false);
    assert_eq!(index["module"], "/assets/index.js");
  }

  #[tokio::test]
  async fn dev_manifest_points_at_sources() {
    let (_dir, config, table) = fixture(BuildMode::Development).await;
    let manifest = build_dev_manifest(&config, &table).unwrap();
    assert_eq!(manifest.entry.module, "/app/entry.client.tsx");
    assert_eq!(manifest.routes["routes/_index"].module, "/app/routes/_index.tsx");
    assert_eq!(
      manifest.hmr.unwrap().runtime,
      "/@id/__x00__virtual:tandem/hmr-runtime"
    );
  }

  #[tokio::test]
  async fn writes_manifest_file() {
    let (_dir, config, table) = fixture(BuildMode::Production).await;
    let manifest = build_manifest(&config, &table, &chunks()).unwrap();
    let path = write_manifest_file(&config, &manifest).await.unwrap();
    assert!(path.ends_with(format!("build/browser/assets/manifest-{}.js", manifest.version)));
    let content = fs::read_to_string(path).unwrap();
    assert!(content.starts_with("window.__tandemManifest={"));
    assert!(content.ends_with("};"));
  }
}
