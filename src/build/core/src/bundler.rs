/* src/build/core/src/bundler.rs */

// Interface to the external module bundler.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::assets::ChunkManifest;
use crate::config::{BuildMode, Environment};
use crate::plugin::PluginHost;

/// One environment build.
#[derive(Debug, Clone)]
pub struct BundleRequest {
  pub env: Environment,
  pub mode: BuildMode,
  /// Primary entry: the environment's virtual entry id.
  pub entry: String,
  /// Every input module, `entry` first. The client build also lists each
  /// route module and tracked client reference so they get their own chunks.
  pub inputs: Vec<String>,
  pub out_dir: PathBuf,
  /// Hooks the bundler must call for every module it resolves, loads and transforms.
  pub host: PluginHost,
}

#[derive(Debug, Clone, Default)]
pub struct BundleOutput {
  /// Per-module chunk graph; required from the client build.
  pub chunks: Option<ChunkManifest>,
}

#[async_trait]
pub trait Bundler: Send + Sync {
  async fn bundle(&self, request: BundleRequest) -> anyhow::Result<BundleOutput>;
}
