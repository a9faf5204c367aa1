/* src/build/core/src/dev/runtime.rs */

// Single-flight module caches for cross-boundary reference resolution in dev.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;

use crate::context::BuildContext;
use crate::reference::module_for_identifier;
use crate::scan::Boundary;

/// A loaded reference module and its export names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
  pub id: String,
  pub path: PathBuf,
  pub exports: Vec<String>,
}

/// Resolved `(module, export)` pair handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRef {
  pub module: Arc<LoadedModule>,
  pub name: String,
}

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
  #[error("module \"{0}\" was never preloaded")]
  ModuleNotFound(String),

  #[error("module \"{0}\" is still loading")]
  ModuleNotReady(String),

  /// Stored import failure, returned on every later require.
  #[error("failed to load module \"{module_id}\": {reason:#}")]
  Rejected { module_id: String, reason: Arc<anyhow::Error> },

  #[error("module \"{module_id}\" has no export \"{name}\"")]
  ExportNotFound { module_id: String, name: String },
}

#[async_trait]
pub trait ModuleLoader: Send + Sync + 'static {
  async fn load_module(&self, kind: Boundary, id: &str) -> anyhow::Result<LoadedModule>;
}

pub type ModuleFuture = Shared<BoxFuture<'static, Result<Arc<LoadedModule>, Arc<anyhow::Error>>>>;

/// Anything holding caches the invalidation manager must drop.
pub trait CacheReset: Send + Sync {
  fn clear(&self);
}

pub struct ReferenceRuntime<L> {
  loader: Arc<L>,
  client: Mutex<HashMap<String, ModuleFuture>>,
  server: Mutex<HashMap<String, ModuleFuture>>,
}

impl<L: ModuleLoader> ReferenceRuntime<L> {
  pub fn new(loader: L) -> Self {
    Self { loader: Arc::new(loader), client: Mutex::default(), server: Mutex::default() }
  }

  fn cache(&self, kind: Boundary) -> &Mutex<HashMap<String, ModuleFuture>> {
    match kind {
      Boundary::Client => &self.client,
      Boundary::Server => &self.server,
    }
  }

  /// Cached import of `id`, starting one if none exists.
  ///
  /// Concurrent callers get clones of the same shared future; the import runs
  /// once, when the first clone is polled.
  pub fn preload_module(&self, kind: Boundary, id: &str) -> ModuleFuture {
    let mut cache = self.cache(kind).lock();
    if let Some(existing) = cache.get(id) {
      return existing.clone();
    }
    let loader = self.loader.clone();
    let module_id = id.to_string();
    let future = async move {
      loader.load_module(kind, &module_id).await.map(Arc::new).map_err(Arc::new)
    }
    .boxed()
    .shared();
    cache.insert(id.to_string(), future.clone());
    future
  }

  /// Synchronous lookup of a settled import.
  pub fn require_module(&self, kind: Boundary, id: &str, export: &str) -> Result<ExportRef, RuntimeError> {
    let cache = self.cache(kind).lock();
    let entry = cache.get(id).ok_or_else(|| RuntimeError::ModuleNotFound(id.to_string()))?;
    match entry.peek() {
      None => Err(RuntimeError::ModuleNotReady(id.to_string())),
      Some(Err(reason)) => {
        Err(RuntimeError::Rejected { module_id: id.to_string(), reason: reason.clone() })
      }
      Some(Ok(module)) if module.exports.iter().any(|e| e == export) => {
        Ok(ExportRef { module: module.clone(), name: export.to_string() })
      }
      Some(Ok(_)) => {
        Err(RuntimeError::ExportNotFound { module_id: id.to_string(), name: export.to_string() })
      }
    }
  }

  /// Preload, wait for settlement, then require.
  pub async fn load_export(&self, kind: Boundary, id: &str, export: &str) -> Result<ExportRef, RuntimeError> {
    // settlement is observed through `require_module`
    let _ = self.preload_module(kind, id).await;
    self.require_module(kind, id, export)
  }

  pub fn cached(&self, kind: Boundary) -> usize {
    self.cache(kind).lock().len()
  }
}

impl<L: ModuleLoader> CacheReset for ReferenceRuntime<L> {
  fn clear(&self) {
    self.client.lock().clear();
    self.server.lock().clear();
  }
}

/// Loads tracked reference modules from disk and lists their exports.
pub struct FsModuleLoader {
  ctx: Arc<BuildContext>,
}

impl FsModuleLoader {
  pub fn new(ctx: Arc<BuildContext>) -> Self {
    Self { ctx }
  }
}

#[async_trait]
impl ModuleLoader for FsModuleLoader {
  async fn load_module(&self, kind: Boundary, id: &str) -> anyhow::Result<LoadedModule> {
    let refs = self.ctx.references();
    let path = module_for_identifier(self.ctx.config(), &refs, kind, id)
      .ok_or_else(|| anyhow::anyhow!("no {} reference with identifier \"{id}\"", kind.as_str()))?;
    let source = tokio::fs::read_to_string(&path)
      .await
      .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let exports = self.ctx.lister().list_exports(&path, &source)?;
    Ok(LoadedModule { id: id.to_string(), path, exports })
  }
}
