/* src/build/core/src/plugin.rs */

// Hook surface an external bundler calls per module: resolve, load, transform.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Environment;
use crate::context::BuildContext;
use crate::dev::ModuleGraphs;
use crate::error::Result;
use crate::reference::rewrite_boundary;
use crate::route::MODULE_EXTENSIONS;
use crate::scan::{Boundary, scan_module};
use crate::virtual_module::{INTERNAL_MARKER, VirtualModule, VirtualModules};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformOutput {
  /// Replacement source; `None` keeps the bundler's input.
  pub code: Option<String>,
  pub boundary: Option<Boundary>,
}

#[derive(Debug, Clone)]
pub struct PluginHost {
  ctx: Arc<BuildContext>,
  virtuals: Arc<VirtualModules>,
  graphs: Option<Arc<ModuleGraphs>>,
}

impl PluginHost {
  pub fn new(ctx: Arc<BuildContext>, virtuals: Arc<VirtualModules>) -> Self {
    Self { ctx, virtuals, graphs: None }
  }

  /// Record transform-time imports into `graphs` (dev server).
  pub fn with_module_graphs(mut self, graphs: Arc<ModuleGraphs>) -> Self {
    self.graphs = Some(graphs);
    self
  }

  pub fn context(&self) -> &Arc<BuildContext> {
    &self.ctx
  }

  pub fn virtual_modules(&self) -> &Arc<VirtualModules> {
    &self.virtuals
  }

  /// Claim virtual ids; everything else is left to the bundler's resolver.
  pub fn resolve_id(&self, id: &str, importer: Option<&str>) -> Option<String> {
    let resolved = self.virtuals.resolve(id)?;
    tracing::trace!(id, importer, "resolved virtual id");
    Some(resolved)
  }

  pub fn load(&self, id: &str) -> Result<Option<String>> {
    let code = self.virtuals.load(id)?;
    if let (Some(_), Some(graphs)) = (&code, &self.graphs) {
      graphs.mark_fresh(id);
    }
    Ok(code)
  }

  /// Scan a module, track boundary references, rewrite boundary exports.
  ///
  /// With module graphs attached, relative imports are resolved against the
  /// file system synchronously; async callers run this on the blocking pool.
  pub fn transform(&self, env: Environment, id: &str, code: &str) -> Result<TransformOutput> {
    if id.starts_with(INTERNAL_MARKER) {
      return Ok(TransformOutput::default());
    }
    let file = id.split('?').next().unwrap_or(id);
    let path = Path::new(file);
    if !is_script(path) {
      return Ok(TransformOutput::default());
    }

    let scan = scan_module(path, code)?;
    if let Some(graphs) = &self.graphs {
      graphs.record(env, path, &scan.imports);
    }
    let tracked = match (scan.boundary, env) {
      (Some(Boundary::Client), Environment::Server) => Some(Boundary::Client),
      (Some(Boundary::Server), _) => Some(Boundary::Server),
      _ => None,
    };
    if let Some(kind) = tracked {
      if self.ctx.register_reference(kind, path) {
        tracing::debug!(module = file, %env, kind = kind.as_str(), "reference discovered");
        if let Some(graphs) = &self.graphs {
          graphs.invalidate(&VirtualModule::dispatch(kind).internal_id());
        }
      }
    }

    let rewritten = rewrite_boundary(self.ctx.config(), env, path, code, &scan)?;
    if rewritten.is_some() {
      tracing::debug!(module = file, %env, "boundary module rewritten");
    }
    Ok(TransformOutput { code: rewritten, boundary: scan.boundary })
  }
}

fn is_script(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| ext == "cjs" || MODULE_EXTENSIONS.contains(&ext))
}
