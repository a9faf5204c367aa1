/* src/build/core/src/orchestrator.rs */

// Fixed-point build loop across the client, ssr and server environments.


use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::{Manifest, build_dev_manifest, build_manifest, write_manifest_file};
use crate::bundler::{BundleOutput, BundleRequest, Bundler};
use crate::config::Environment;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::plugin::PluginHost;
use crate::reference::{ReferenceSets, to_import_path};
use crate::scan::Boundary;
use crate::virtual_module::{VirtualModule, VirtualModules};

/// Builds performed per environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvBuildCounts {
  pub client: usize,
  pub ssr: usize,
  pub server: usize,
}

impl EnvBuildCounts {
  fn bump(&mut self, env: Environment) {
    match env {
      Environment::Client => self.client += 1,
      Environment::Ssr => self.ssr += 1,
      Environment::Server => self.server += 1,
    }
  }

  pub fn get(&self, env: Environment) -> usize {
    match env {
      Environment::Client => self.client,
      Environment::Ssr => self.ssr,
      Environment::Server => self.server,
    }
  }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
  pub passes: usize,
  pub builds: EnvBuildCounts,
  pub manifest: Arc<Manifest>,
  /// Written manifest file; `None` in development mode.
  pub manifest_path: Option<PathBuf>,
  pub references: ReferenceSets,
}

pub struct Orchestrator<B> {
  ctx: Arc<BuildContext>,
  virtuals: Arc<VirtualModules>,
  bundler: B,
}

impl<B: Bundler> Orchestrator<B> {
  pub fn new(ctx: Arc<BuildContext>, bundler: B) -> Self {
    let virtuals = Arc::new(VirtualModules::new(ctx.clone()));
    Self { ctx, virtuals, bundler }
  }

  pub fn context(&self) -> &Arc<BuildContext> {
    &self.ctx
  }

  pub fn host(&self) -> PluginHost {
    PluginHost::new(self.ctx.clone(), self.virtuals.clone())
  }

  /// Run passes until neither reference set grows, then write the manifest.
  ///
  /// A pass rebuilds `client` and `ssr` when the client set grew since the
  /// last client build started, and `server` likewise for the server set.
  /// Every environment builds in the first pass. In development the dev
  /// manifest is published before the first pass and no chunk output is needed.
  pub async fn run(&self) -> Result<BuildReport> {
    let config = self.ctx.config();
    config.validate()?;
    let routes = self.ctx.refresh_routes().await?;
    self.ctx.clear_references();

    let mut builds = EnvBuildCounts::default();
    let mut client_mark: Option<usize> = None;
    let mut server_mark: Option<usize> = None;
    // the dev browser entry imports the manifest module
    let mut manifest: Option<Arc<Manifest>> = if config.mode.is_dev() {
      Some(self.ctx.publish_manifest(build_dev_manifest(config, &routes)?))
    } else {
      None
    };
    let mut passes = 0;

    loop {
      let client_due = client_mark.is_none_or(|n| self.ctx.reference_count(Boundary::Client) > n);
      let server_due = server_mark.is_none_or(|n| self.ctx.reference_count(Boundary::Server) > n);
      if !client_due && !server_due {
        break;
      }
      if passes >= config.max_passes {
        return Err(BuildError::DidNotConverge {
          passes,
          client: self.ctx.reference_count(Boundary::Client),
          server: self.ctx.reference_count(Boundary::Server),
        });
      }
      passes += 1;
      tracing::info!(pass = passes, client = client_due, server = server_due, "build pass");

      if client_due {
        client_mark = Some(self.ctx.reference_count(Boundary::Client));
        let output = self.build_env(Environment::Client).await?;
        builds.bump(Environment::Client);
        if !config.mode.is_dev() {
          let chunks = output.chunks.ok_or_else(|| {
            BuildError::Bundler(anyhow::anyhow!("client build did not report a chunk manifest"))
          })?;
          let next = build_manifest(config, &self.ctx.routes(), &chunks)?;
          tracing::debug!(version = %next.version, "manifest published");
          manifest = Some(self.ctx.publish_manifest(next));
        }

        self.build_env(Environment::Ssr).await?;
        builds.bump(Environment::Ssr);
      }
      if server_due {
        server_mark = Some(self.ctx.reference_count(Boundary::Server));
        self.build_env(Environment::Server).await?;
        builds.bump(Environment::Server);
      }
    }

    let manifest = manifest.ok_or_else(|| BuildError::configuration("no client build ran"))?;
    let manifest_path = if config.mode.is_dev() {
      None
    } else {
      Some(write_manifest_file(config, &manifest).await?)
    };
    tracing::info!(passes, version = %manifest.version, "build converged");
    Ok(BuildReport { passes, builds, manifest, manifest_path, references: self.ctx.references() })
  }

  async fn build_env(&self, env: Environment) -> Result<BundleOutput> {
    let request = self.request(env);
    tracing::info!(%env, inputs = request.inputs.len(), "bundling");
    self.bundler.bundle(request).await.map_err(BuildError::Bundler)
  }

  fn request(&self, env: Environment) -> BundleRequest {
    let config = self.ctx.config();
    let entry = match env {
      Environment::Client => VirtualModule::BrowserEntry,
      Environment::Ssr => VirtualModule::PrerenderEntry,
      Environment::Server => VirtualModule::ServerEntry,
    }
    .public_id();
    let mut inputs = vec![entry.clone()];
    if env == Environment::Client {
      let routes = self.ctx.routes();
      inputs.extend(routes.entries.client.iter().map(|p| to_import_path(p)));
      inputs.extend(routes.iter().map(|r| to_import_path(&r.source)));
      inputs.extend(self.ctx.references().client().iter().map(|p| to_import_path(p)));
    }
    BundleRequest {
      env,
      mode: config.mode,
      entry,
      inputs,
      out_dir: config.env_out_dir(env),
      host: self.host(),
    }
  }
}
