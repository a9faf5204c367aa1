/* src/build/core/src/dev/mod.rs */

// Dev-server state: live manifest, module graphs, invalidation and the reference runtime.

mod graph;
mod invalidation;
mod runtime;

pub use graph::{ModuleGraph, ModuleGraphs, ModuleNode, resolve_import};
pub use invalidation::{HOT_UPDATE_TYPE, HotUpdate, InvalidationManager};
pub use runtime::{
  CacheReset, ExportRef, FsModuleLoader, LoadedModule, ModuleFuture, ModuleLoader, ReferenceRuntime,
  RuntimeError,
};

use std::path::Path;
use std::sync::Arc;

use crate::assets::{Manifest, build_dev_manifest};
use crate::config::BuildConfig;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::plugin::PluginHost;
use crate::virtual_module::VirtualModules;

/// Everything one `dev` run shares between the plugin host, watcher and endpoints.
pub struct DevSession<L = FsModuleLoader> {
  ctx: Arc<BuildContext>,
  virtuals: Arc<VirtualModules>,
  graphs: Arc<ModuleGraphs>,
  runtime: Arc<ReferenceRuntime<L>>,
  invalidation: InvalidationManager,
}

impl DevSession<FsModuleLoader> {
  /// Scan routes, publish the dev manifest and wire the filesystem loader.
  pub async fn start(config: BuildConfig) -> Result<Self> {
    let ctx = Arc::new(BuildContext::new(config));
    let loader = FsModuleLoader::new(ctx.clone());
    Self::with_context(ctx, loader).await
  }
}

impl<L: ModuleLoader> DevSession<L> {
  pub async fn with_context(ctx: Arc<BuildContext>, loader: L) -> Result<Self> {
    let config = ctx.config();
    config.validate()?;
    if !config.mode.is_dev() {
      return Err(BuildError::configuration("dev session requires development mode"));
    }
    let table = ctx.refresh_routes().await?;
    let manifest = ctx.publish_manifest(build_dev_manifest(config, &table)?);
    tracing::info!(routes = table.len(), version = %manifest.version, "dev session started");

    let virtuals = Arc::new(VirtualModules::new(ctx.clone()));
    let graphs = Arc::new(ModuleGraphs::default());
    let runtime = Arc::new(ReferenceRuntime::new(loader));
    let invalidation = InvalidationManager::new(ctx.clone(), virtuals.clone(), graphs.clone())
      .with_cache(runtime.clone());
    Ok(Self { ctx, virtuals, graphs, runtime, invalidation })
  }

  pub fn context(&self) -> &Arc<BuildContext> {
    &self.ctx
  }

  pub fn virtual_modules(&self) -> &Arc<VirtualModules> {
    &self.virtuals
  }

  pub fn module_graphs(&self) -> &Arc<ModuleGraphs> {
    &self.graphs
  }

  pub fn runtime(&self) -> &Arc<ReferenceRuntime<L>> {
    &self.runtime
  }

  /// Plugin host that records transform-time imports into the dev graphs.
  pub fn host(&self) -> PluginHost {
    PluginHost::new(self.ctx.clone(), self.virtuals.clone()).with_module_graphs(self.graphs.clone())
  }

  pub fn manifest(&self) -> Option<Arc<Manifest>> {
    self.ctx.manifest()
  }

  pub async fn handle_change(&self, path: &Path) -> Option<HotUpdate> {
    self.invalidation.handle_change(path).await
  }
}
