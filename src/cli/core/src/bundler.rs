/* src/cli/core/src/bundler.rs */

// Runs the configured bundler command once per environment build.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tandem_build::assets::ChunkManifest;
use tandem_build::{BundleOutput, BundleRequest, Bundler, Environment};

use crate::plugin_server::PluginServer;
use crate::shell::run_command;

/// Chunk manifest location relative to an environment's output dir.
pub const CHUNK_MANIFEST: &str = ".tandem/manifest.json";

pub struct CommandBundler {
  base_dir: PathBuf,
  command: String,
}

impl CommandBundler {
  pub fn new(base_dir: impl Into<PathBuf>, command: impl Into<String>) -> Self {
    Self { base_dir: base_dir.into(), command: command.into() }
  }
}

#[async_trait]
impl Bundler for CommandBundler {
  async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput> {
    tokio::fs::create_dir_all(&request.out_dir)
      .await
      .with_context(|| format!("failed to create {}", request.out_dir.display()))?;

    let server = PluginServer::start(request.host.clone()).await?;
    let plugin_url = server.url();
    let inputs = serde_json::to_string(&request.inputs).context("failed to encode bundle inputs")?;
    let out_dir = request.out_dir.to_string_lossy().to_string();
    let env = [
      ("TANDEM_ENV", request.env.as_str()),
      ("TANDEM_MODE", request.mode.as_str()),
      ("TANDEM_ENTRY", request.entry.as_str()),
      ("TANDEM_INPUTS", inputs.as_str()),
      ("TANDEM_OUT_DIR", out_dir.as_str()),
      ("TANDEM_PLUGIN_URL", plugin_url.as_str()),
    ];
    let label = format!("{} bundler", request.env);
    let result = run_command(&self.base_dir, &self.command, &label, &env).await;
    server.stop().await?;
    result?;

    let manifest_path = request.out_dir.join(CHUNK_MANIFEST);
    let chunks = if tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
      Some(ChunkManifest::read(&manifest_path).await?)
    } else if request.env == Environment::Client {
      anyhow::bail!("bundler did not write {} for the client build", manifest_path.display());
    } else {
      None
    };
    Ok(BundleOutput { chunks })
  }
}
