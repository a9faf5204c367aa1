/* src/build/core/src/context.rs */

// Shared state for one build or dev-server lifetime. Locks are never held across `.await`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::assets::{Manifest, RouteManifestEntry};
use crate::config::BuildConfig;
use crate::error::Result;
use crate::route::{RouteCapabilities, RouteTable, build_route_table};
use crate::reference::ReferenceSets;
use crate::scan::{Boundary, ExportLister, OxcExportLister};

pub struct BuildContext {
  config: BuildConfig,
  lister: Arc<dyn ExportLister>,
  routes: RwLock<Arc<RouteTable>>,
  references: Mutex<ReferenceSets>,
  manifest: RwLock<Option<Arc<Manifest>>>,
}

impl BuildContext {
  pub fn new(config: BuildConfig) -> Self {
    Self::with_lister(config, Arc::new(OxcExportLister))
  }

  pub fn with_lister(config: BuildConfig, lister: Arc<dyn ExportLister>) -> Self {
    Self {
      config,
      lister,
      routes: RwLock::new(Arc::new(RouteTable::default())),
      references: Mutex::new(ReferenceSets::default()),
      manifest: RwLock::new(None),
    }
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn lister(&self) -> &dyn ExportLister {
    self.lister.as_ref()
  }

  // -- routes

  pub fn routes(&self) -> Arc<RouteTable> {
    self.routes.read().clone()
  }

  /// Rescan the app directory and replace the route table.
  pub async fn refresh_routes(&self) -> Result<Arc<RouteTable>> {
    let table = Arc::new(build_route_table(&self.config, self.lister.as_ref()).await?);
    *self.routes.write() = table.clone();
    Ok(table)
  }

  pub fn set_route_capabilities(&self, id: &str, capabilities: RouteCapabilities) -> bool {
    let mut guard = self.routes.write();
    let mut table = RouteTable::clone(&guard);
    if !table.set_capabilities(id, capabilities) {
      return false;
    }
    *guard = Arc::new(table);
    true
  }

  // -- references

  /// Track a boundary module. Returns true when the set grew.
  pub fn register_reference(&self, kind: Boundary, module: &Path) -> bool {
    self.references.lock().insert(kind, module)
  }

  pub fn reference_count(&self, kind: Boundary) -> usize {
    self.references.lock().get(kind).len()
  }

  /// Snapshot of both reference sets.
  pub fn references(&self) -> ReferenceSets {
    self.references.lock().clone()
  }

  /// Set `module` is currently tracked in, if any.
  pub fn reference_kind(&self, module: &Path) -> Option<Boundary> {
    let refs = self.references.lock();
    [Boundary::Client, Boundary::Server].into_iter().find(|kind| refs.contains(*kind, module))
  }

  pub fn remove_reference(&self, module: &Path) -> bool {
    self.references.lock().remove(module)
  }

  pub fn clear_references(&self) {
    self.references.lock().clear();
  }

  // -- manifest

  pub fn manifest(&self) -> Option<Arc<Manifest>> {
    self.manifest.read().clone()
  }

  pub fn publish_manifest(&self, manifest: Manifest) -> Arc<Manifest> {
    let manifest = Arc::new(manifest);
    *self.manifest.write() = Some(manifest.clone());
    manifest
  }

  /// Replace one route entry of the published manifest and re-version it.
  pub fn republish_route(&self, entry: RouteManifestEntry) -> Result<Option<Arc<Manifest>>> {
    let mut guard = self.manifest.write();
    let Some(current) = guard.as_ref() else {
      return Ok(None);
    };
    let mut next = Manifest::clone(current);
    next.routes.insert(entry.route.id.clone(), entry);
    next.rehash(&self.config)?;
    let next = Arc::new(next);
    *guard = Some(next.clone());
    Ok(Some(next))
  }
}

impl std::fmt::Debug for BuildContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildContext")
      .field("root", &self.config.root_dir)
      .field("mode", &self.config.mode)
      .field("routes", &self.routes.read().len())
      .finish_non_exhaustive()
  }
}
