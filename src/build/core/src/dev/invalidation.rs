/* src/build/core/src/dev/invalidation.rs */

// Source-change handling: module graph invalidation, capability diffs, hot updates.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::graph::{ModuleGraphs, module_key};
use super::runtime::CacheReset;
use crate::assets::{RouteManifestEntry, build_dev_manifest, dev_route_entry};
use crate::config::Environment;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::route::{MODULE_EXTENSIONS, scan_capabilities};
use crate::scan::{Boundary, scan_module};
use crate::virtual_module::VirtualModules;

pub const HOT_UPDATE_TYPE: &str = "tandem:hmr";

/// Message broadcast to connected browsers after a file change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotUpdate {
  #[serde(rename = "type")]
  pub kind: &'static str,
  pub env: Environment,
  /// Project-relative path of the changed file.
  pub file: String,
  /// Republished route entry when its capabilities changed.
  pub route: Option<RouteManifestEntry>,
  pub reload: bool,
}

pub struct InvalidationManager {
  ctx: Arc<BuildContext>,
  virtuals: Arc<VirtualModules>,
  graphs: Arc<ModuleGraphs>,
  caches: Vec<Arc<dyn CacheReset>>,
}

enum RouteChange {
  None,
  Capabilities(RouteManifestEntry),
  Table,
}

impl InvalidationManager {
  pub fn new(ctx: Arc<BuildContext>, virtuals: Arc<VirtualModules>, graphs: Arc<ModuleGraphs>) -> Self {
    Self { ctx, virtuals, graphs, caches: Vec::new() }
  }

  /// Register caches cleared after every change.
  pub fn with_cache(mut self, cache: Arc<dyn CacheReset>) -> Self {
    self.caches.push(cache);
    self
  }

  /// Process one changed (or removed) file.
  ///
  /// Never fails: errors are logged and yield `None`. Caches are cleared either way.
  pub async fn handle_change(&self, path: &Path) -> Option<HotUpdate> {
    let result = self.apply(path).await;
    for cache in &self.caches {
      cache.clear();
    }
    match result {
      Ok(update) => Some(update),
      Err(e) => {
        tracing::warn!(file = %path.display(), error = %e, "dev invalidation failed");
        None
      }
    }
  }

  async fn apply(&self, path: &Path) -> Result<HotUpdate> {
    let key = module_key(path);
    let exists = tokio::fs::metadata(path).await.is_ok();

    let (affected, references_changed) = if exists {
      (self.graphs.invalidate(&key), self.sync_reference(path).await?)
    } else {
      let removed = self.ctx.remove_reference(path);
      (self.graphs.remove(&key), removed)
    };
    let env = affected
      .iter()
      .find(|(_, ids)| !ids.is_empty())
      .map_or(Environment::Client, |(env, _)| *env);
    tracing::debug!(file = %path.display(), %env, exists, "module invalidated");

    let change = self.route_change(path, exists).await?;
    let route_touched = !matches!(change, RouteChange::None);
    let route = match change {
      RouteChange::None => None,
      RouteChange::Capabilities(entry) => Some(entry),
      RouteChange::Table => {
        let table = self.ctx.refresh_routes().await?;
        self.ctx.publish_manifest(build_dev_manifest(self.ctx.config(), &table)?);
        None
      }
    };
    if references_changed || route_touched {
      self.invalidate_virtuals();
    }

    Ok(HotUpdate {
      kind: HOT_UPDATE_TYPE,
      env,
      file: self.ctx.config().relative_key(path),
      reload: route.is_none(),
      route,
    })
  }

  async fn route_change(&self, path: &Path, exists: bool) -> Result<RouteChange> {
    let table = self.ctx.routes();
    let known = table.by_source(path).cloned();
    let Some(record) = known else {
      let candidate = exists && self.is_route_candidate(path);
      return Ok(if candidate { RouteChange::Table } else { RouteChange::None });
    };
    if !exists {
      return Ok(RouteChange::Table);
    }

    let capabilities = scan_capabilities(path, self.ctx.lister()).await?;
    let published = self
      .ctx
      .manifest()
      .and_then(|m| m.routes.get(&record.route.id).map(|e| e.capabilities));
    if published == Some(capabilities) {
      return Ok(RouteChange::None);
    }
    tracing::info!(route = %record.route.id, "route capabilities changed");
    self.ctx.set_route_capabilities(&record.route.id, capabilities);
    let mut updated = record;
    updated.capabilities = capabilities;
    let entry = dev_route_entry(self.ctx.config(), &updated);
    self.ctx.republish_route(entry.clone())?;
    Ok(RouteChange::Capabilities(entry))
  }

  /// Move `path` to the set matching its current boundary marker, or out of both.
  /// Returns true when membership changed.
  async fn sync_reference(&self, path: &Path) -> Result<bool> {
    if !is_module(path) {
      return Ok(false);
    }
    let source = tokio::fs::read_to_string(path).await.map_err(|e| BuildError::io("read", path, e))?;
    let marker = scan_module(path, &source)?.boundary;
    let tracked = self.ctx.reference_kind(path);
    if marker == tracked {
      return Ok(false);
    }
    match marker {
      Some(kind) => {
        self.ctx.register_reference(kind, path);
      }
      None => {
        self.ctx.remove_reference(path);
      }
    }
    tracing::info!(
      file = %path.display(),
      from = tracked.map_or("none", Boundary::as_str),
      to = marker.map_or("none", Boundary::as_str),
      "reference membership changed"
    );
    Ok(true)
  }

  /// A module directly inside the routes folder, or a route folder's `route.*` / `index.*`.
  fn is_route_candidate(&self, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(self.ctx.config().routes_path()) else {
      return false;
    };
    let is_module = is_module(path);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    match rel.components().count() {
      1 => is_module,
      2 => is_module && (stem == "route" || stem == "index"),
      _ => false,
    }
  }

  fn invalidate_virtuals(&self) {
    for id in self.virtuals.invalidate_all() {
      self.graphs.invalidate(&id);
    }
  }
}

fn is_module(path: &Path) -> bool {
  path.extension().and_then(|e| e.to_str()).is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use crate::config::{BuildConfig, BuildMode};
  use crate::dev::DevSession;
  use crate::virtual_module::VirtualModule;

  const LOADER_ONLY: &str = "export async function loader() {}\nexport default function Page() {}\n";
  const LOADER_AND_ACTION: &str =
    "export async function loader() {}\nexport async function action() {}\nexport default function Page() {}\n";

  async fn session() -> (tempfile::TempDir, DevSession) {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("app");
    fs::create_dir_all(app.join("routes")).unwrap();
    fs::write(app.join("root.tsx"), "export default function Root() {}\n").unwrap();
    fs::write(app.join("routes/page.tsx"), LOADER_ONLY).unwrap();
    let session = DevSession::start(BuildConfig::new(dir.path(), BuildMode::Development)).await.unwrap();
    (dir, session)
  }

  #[tokio::test]
  async fn capability_change_republishes_route() {
    let (dir, session) = session().await;
    let page = dir.path().join("app/routes/page.tsx");
    let before = session.context().manifest().unwrap();
    assert!(!before.routes["routes/page"].capabilities.has_action);
    let generation = session.virtual_modules().generation();

    fs::write(&page, LOADER_AND_ACTION).unwrap();
    let update = session.handle_change(&page).await.unwrap();

    assert_eq!(update.kind, "tandem:hmr");
    assert_eq!(update.file, "app/routes/page.tsx");
    assert!(!update.reload);
    let route = update.route.unwrap();
    assert!(route.capabilities.has_action);
    assert!(route.capabilities.has_loader);

    assert!(session.virtual_modules().generation() > generation);
    let after = session.context().manifest().unwrap();
    assert!(after.routes["routes/page"].capabilities.has_action);
    assert_ne!(after.version, before.version);
    assert!(session.context().routes().get("routes/page").unwrap().capabilities.has_action);
  }

  #[tokio::test]
  async fn unchanged_capabilities_request_reload() {
    let (dir, session) = session().await;
    let page = dir.path().join("app/routes/page.tsx");
    fs::write(&page, format!("{LOADER_ONLY}// edit\n")).unwrap();
    let generation = session.virtual_modules().generation();
    let update = session.handle_change(&page).await.unwrap();
    assert!(update.reload);
    assert_eq!(update.route, None);
    assert_eq!(session.virtual_modules().generation(), generation);
  }

  #[tokio::test]
  async fn parse_errors_are_logged_not_raised() {
    let (dir, session) = session().await;
    let page = dir.path().join("app/routes/page.tsx");
    fs::write(&page, "export const = ;").unwrap();
    assert_eq!(session.handle_change(&page).await, None);
  }

  #[tokio::test]
  async fn new_route_file_rescans_table() {
    let (dir, session) = session().await;
    let about = dir.path().join("app/routes/about.tsx");
    fs::write(&about, "export default function About() {}\n").unwrap();
    let update = session.handle_change(&about).await.unwrap();
    assert!(update.reload);
    assert!(session.context().routes().get("routes/about").is_some());
    assert!(session.context().manifest().unwrap().routes.contains_key("routes/about"));
  }

  #[tokio::test]
  async fn removed_route_file_rescans_table() {
    let (dir, session) = session().await;
    let page = dir.path().join("app/routes/page.tsx");
    fs::remove_file(&page).unwrap();
    let update = session.handle_change(&page).await.unwrap();
    assert!(update.reload);
    assert!(session.context().routes().get("routes/page").is_none());
  }

  #[tokio::test]
  async fn change_is_scoped_to_graph_environment() {
    let (dir, session) = session().await;
    let util = dir.path().join("app/util.ts");
    fs::write(&util, "export const x = 1;\n").unwrap();
    let host = session.host();
    host
      .transform(Environment::Ssr, &dir.path().join("app/root.tsx").to_string_lossy(), "import \"./util\";\nexport default 1;\n")
      .unwrap();
    let update = session.handle_change(&util).await.unwrap();
    assert_eq!(update.env, Environment::Ssr);
  }

  #[tokio::test]
  async fn caches_clear_on_every_change() {
    let (dir, session) = session().await;
    let button = dir.path().join("app/button.tsx");
    fs::write(&button, "\"use client\";\nexport function Button() {}\n").unwrap();
    session.context().register_reference(Boundary::Client, &button);
    session.runtime().load_export(Boundary::Client, "/app/button.tsx", "Button").await.unwrap();
    assert_eq!(session.runtime().cached(Boundary::Client), 1);

    session.handle_change(&button).await.unwrap();
    assert_eq!(session.runtime().cached(Boundary::Client), 0);
  }

  const BUTTON: &str = "\"use client\";\nexport function Button() {}\n";
  const PLAIN_BUTTON: &str = "export function Button() {}\n";
  const ROOT_WITH_REFS: &str = "import refs from \"virtual:tandem/client-references\";\nexport default refs;\n";

  /// Session whose ssr root imports the client dispatch module, loaded once.
  async fn session_with_dispatch(button: &str) -> (tempfile::TempDir, DevSession, String) {
    let (dir, session) = session().await;
    fs::write(dir.path().join("app/button.tsx"), button).unwrap();
    let host = session.host();
    let root = dir.path().join("app/root.tsx");
    host.transform(Environment::Ssr, &root.to_string_lossy(), ROOT_WITH_REFS).unwrap();
    let dispatch = VirtualModule::ClientReferences.internal_id();
    host.load(&dispatch).unwrap();
    (dir, session, dispatch)
  }

  fn ssr_stale(session: &DevSession, id: &str) -> bool {
    session.module_graphs().get(Environment::Ssr).unwrap().lock().is_stale(id)
  }

  fn dispatch_source(session: &DevSession, id: &str) -> String {
    session.virtual_modules().load(id).unwrap().unwrap()
  }

  #[tokio::test]
  async fn added_marker_joins_reference_set() {
    let (dir, session, dispatch) = session_with_dispatch(PLAIN_BUTTON).await;
    let button = dir.path().join("app/button.tsx");
    assert!(!ssr_stale(&session, &dispatch));
    let generation = session.virtual_modules().generation();

    fs::write(&button, BUTTON).unwrap();
    let update = session.handle_change(&button).await.unwrap();

    assert!(update.reload);
    assert_eq!(session.context().reference_kind(&button), Some(Boundary::Client));
    assert!(session.virtual_modules().generation() > generation);
    assert!(ssr_stale(&session, &dispatch));
    assert!(dispatch_source(&session, &dispatch).contains("\"/app/button.tsx\": () => import("));
  }

  #[tokio::test]
  async fn removed_marker_leaves_reference_set() {
    let (dir, session, dispatch) = session_with_dispatch(BUTTON).await;
    let button = dir.path().join("app/button.tsx");
    session.host().transform(Environment::Server, &button.to_string_lossy(), BUTTON).unwrap();
    assert_eq!(session.context().reference_kind(&button), Some(Boundary::Client));
    session.host().load(&dispatch).unwrap();
    assert!(!ssr_stale(&session, &dispatch));
    let generation = session.virtual_modules().generation();

    fs::write(&button, PLAIN_BUTTON).unwrap();
    session.handle_change(&button).await.unwrap();

    assert_eq!(session.context().reference_kind(&button), None);
    assert!(session.virtual_modules().generation() > generation);
    assert!(ssr_stale(&session, &dispatch));
    assert!(!dispatch_source(&session, &dispatch).contains("/app/button.tsx"));
  }

  #[tokio::test]
  async fn switched_marker_moves_between_sets() {
    let (dir, session, _) = session_with_dispatch(BUTTON).await;
    let button = dir.path().join("app/button.tsx");
    session.context().register_reference(Boundary::Client, &button);

    fs::write(&button, "\"use server\";\nexport async function save() {}\n").unwrap();
    session.handle_change(&button).await.unwrap();

    assert_eq!(session.context().reference_kind(&button), Some(Boundary::Server));
    assert_eq!(session.context().reference_count(Boundary::Client), 0);
  }

  #[tokio::test]
  async fn unchanged_marker_keeps_virtuals() {
    let (dir, session, dispatch) = session_with_dispatch(BUTTON).await;
    let button = dir.path().join("app/button.tsx");
    session.context().register_reference(Boundary::Client, &button);
    let generation = session.virtual_modules().generation();

    fs::write(&button, format!("{BUTTON}// edit\n")).unwrap();
    session.handle_change(&button).await.unwrap();

    assert_eq!(session.virtual_modules().generation(), generation);
    assert!(!ssr_stale(&session, &dispatch));
  }
}
