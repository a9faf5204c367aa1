/* src/build/core/src/route/mod.rs */

// Route table: file-route discovery, tree assembly, export capability flags.

mod convention;


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{BuildConfig, to_slash};
use crate::error::{BuildError, Result};
use crate::scan::ExportLister;

use convention::{parent_prefix_len, segments_to_path, split_segments};

pub const ROOT_ROUTE_ID: &str = "root";

/// Entry lookup order for `root.*`, `entry.*` and folder route modules.
pub const MODULE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "mts"];

/// Exports a route module may declare.
pub const ROUTE_EXPORTS: &[&str] = &[
  "loader",
  "action",
  "clientLoader",
  "clientAction",
  "default",
  "ErrorBoundary",
  "HydrateFallback",
  "handle",
  "headers",
  "links",
  "meta",
  "shouldRevalidate",
  "Layout",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default)]
  pub index: bool,
  #[serde(default)]
  pub case_sensitive: bool,
  /// Source file relative to the app directory.
  pub file: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCapabilities {
  pub has_loader: bool,
  pub has_action: bool,
  pub has_client_loader: bool,
  pub has_client_action: bool,
  pub has_error_boundary: bool,
}

impl RouteCapabilities {
  pub fn from_exports<S: AsRef<str>>(exports: &[S]) -> Self {
    let has = |name: &str| exports.iter().any(|e| e.as_ref() == name);
    Self {
      has_loader: has("loader"),
      has_action: has("action"),
      has_client_loader: has("clientLoader"),
      has_client_action: has("clientAction"),
      has_error_boundary: has("ErrorBoundary"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RouteRecord {
  pub route: Route,
  /// Absolute path of the route module.
  pub source: PathBuf,
  pub capabilities: RouteCapabilities,
}

/// Runtime entry modules found in the app directory.
#[derive(Debug, Clone, Default)]
pub struct AppEntries {
  pub client: Option<PathBuf>,
  pub server: Option<PathBuf>,
  pub prerender: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
  routes: IndexMap<String, RouteRecord>,
  pub entries: AppEntries,
}

impl RouteTable {
  pub fn get(&self, id: &str) -> Option<&RouteRecord> {
    self.routes.get(id)
  }

  pub fn root(&self) -> Option<&RouteRecord> {
    self.routes.get(ROOT_ROUTE_ID)
  }

  pub fn iter(&self) -> impl Iterator<Item = &RouteRecord> {
    self.routes.values()
  }

  pub fn ids(&self) -> impl Iterator<Item = &String> {
    self.routes.keys()
  }

  pub fn len(&self) -> usize {
    self.routes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }

  pub fn by_source(&self, path: &Path) -> Option<&RouteRecord> {
    self.routes.values().find(|r| r.source == path)
  }

  pub fn set_capabilities(&mut self, id: &str, capabilities: RouteCapabilities) -> bool {
    match self.routes.get_mut(id) {
      Some(record) => {
        record.capabilities = capabilities;
        true
      }
      None => false,
    }
  }
}

/// First existing `<dir>/<basename>.<ext>` in [`MODULE_EXTENSIONS`] order.
pub async fn find_entry(dir: &Path, basename: &str) -> Option<PathBuf> {
  for ext in MODULE_EXTENSIONS {
    let candidate = dir.join(format!("{basename}.{ext}"));
    if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
      return Some(candidate);
    }
  }
  None
}

fn is_module_file(path: &Path) -> bool {
  path.extension().and_then(|e| e.to_str()).is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

/// Scan a route module's exports into capability flags; warns on unknown exports.
pub async fn scan_capabilities(path: &Path, lister: &dyn ExportLister) -> Result<RouteCapabilities> {
  let source = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| BuildError::io("read route module", path, e))?;
  let exports = lister.list_exports(path, &source)?;
  for name in exports.iter().filter(|n| !ROUTE_EXPORTS.contains(&n.as_str())) {
    tracing::warn!(route = %path.display(), export = %name, "unknown route export");
  }
  Ok(RouteCapabilities::from_exports(&exports))
}

struct Candidate {
  name: String,
  source: PathBuf,
}

/// Route-name -> module for every route module in the routes folder, sorted by file name.
async fn collect_candidates(routes_dir: &Path) -> Result<Vec<Candidate>> {
  let mut entries = match tokio::fs::read_dir(routes_dir).await {
    Ok(rd) => rd,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(BuildError::io("read routes directory", routes_dir, e)),
  };
  let mut paths = Vec::new();
  while let Some(entry) =
    entries.next_entry().await.map_err(|e| BuildError::io("read routes directory", routes_dir, e))?
  {
    paths.push(entry.path());
  }
  paths.sort();

  let mut out = Vec::new();
  for path in paths {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
      continue;
    };
    if path.is_dir() {
      let module = match find_entry(&path, "route").await {
        Some(m) => Some(m),
        None => find_entry(&path, "index").await,
      };
      if let Some(source) = module {
        out.push(Candidate { name: file_name, source });
      }
    } else if is_module_file(&path) {
      let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
      out.push(Candidate { name: stem.to_string(), source: path.clone() });
    }
  }
  Ok(out)
}

fn route_id(app_dir: &Path, source: &Path) -> String {
  let rel = source.strip_prefix(app_dir).unwrap_or(source);
  to_slash(&rel.with_extension(""))
}

fn route_file(app_dir: &Path, source: &Path) -> String {
  to_slash(source.strip_prefix(app_dir).unwrap_or(source))
}

/// Build the route table for `config.app_dir`.
///
/// Output is independent of directory-listing order: candidates are sorted,
/// ids derive from file paths and parents from route names.
pub async fn build_route_table(config: &BuildConfig, lister: &dyn ExportLister) -> Result<RouteTable> {
  let app_dir = &config.app_dir;
  let root_source = find_entry(app_dir, "root").await.ok_or_else(|| {
    let tried: Vec<String> = MODULE_EXTENSIONS
      .iter()
      .map(|ext| format!("{}/root.{ext}", config.relative_key(app_dir)))
      .collect();
    BuildError::configuration(format!("missing root route module (tried {})", tried.join(", ")))
  })?;

  let mut table = RouteTable {
    routes: IndexMap::new(),
    entries: AppEntries {
      client: find_entry(app_dir, "entry.client").await,
      server: find_entry(app_dir, "entry.server").await,
      prerender: find_entry(app_dir, "entry.prerender").await,
    },
  };

  let root_caps = scan_capabilities(&root_source, lister).await?;
  table.routes.insert(
    ROOT_ROUTE_ID.to_string(),
    RouteRecord {
      route: Route {
        id: ROOT_ROUTE_ID.to_string(),
        parent_id: None,
        path: Some(String::new()),
        index: false,
        case_sensitive: false,
        file: route_file(app_dir, &root_source),
      },
      source: root_source,
      capabilities: root_caps,
    },
  );

  // name -> candidate; first in sorted order wins on collision
  let mut by_name: BTreeMap<String, Candidate> = BTreeMap::new();
  for candidate in collect_candidates(&config.routes_path()).await? {
    if let Some(existing) = by_name.get(&candidate.name) {
      tracing::warn!(
        route = %candidate.name,
        kept = %existing.source.display(),
        skipped = %candidate.source.display(),
        "conflicting route modules"
      );
      continue;
    }
    by_name.insert(candidate.name.clone(), candidate);
  }

  let ids: BTreeMap<&str, String> =
    by_name.iter().map(|(name, c)| (name.as_str(), route_id(app_dir, &c.source))).collect();

  let mut records = Vec::with_capacity(by_name.len());
  for (name, candidate) in &by_name {
    let segments = split_segments(name);
    let prefix = parent_prefix_len(&segments, |n| by_name.contains_key(n));
    let (parent_id, own) = match prefix {
      Some(k) => (ids[segments[..k].join(".").as_str()].clone(), &segments[k..]),
      None => (ROOT_ROUTE_ID.to_string(), &segments[..]),
    };
    let index = segments.last().is_some_and(|s| s == "_index");
    let capabilities = scan_capabilities(&candidate.source, lister).await?;
    records.push(RouteRecord {
      route: Route {
        id: ids[name.as_str()].clone(),
        parent_id: Some(parent_id),
        path: segments_to_path(own),
        index,
        case_sensitive: false,
        file: route_file(app_dir, &candidate.source),
      },
      source: candidate.source.clone(),
      capabilities,
    });
  }
  records.sort_by(|a, b| a.route.id.cmp(&b.route.id));
  for record in records {
    table.routes.insert(record.route.id.clone(), record);
  }

  tracing::debug!(routes = table.len(), "route table built");
  Ok(table)
}
