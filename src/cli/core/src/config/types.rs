/* src/cli/core/src/config/types.rs */

use std::path::Path;

use anyhow::{Result, bail};
use serde::Deserialize;
use tandem_build::config::DEFAULT_MAX_PASSES;
use tandem_build::{BuildConfig, BuildMode, RuntimeModules};

#[derive(Debug, Clone, Deserialize)]
pub struct TandemConfig {
  pub project: ProjectConfig,
  #[serde(default)]
  pub app: AppSection,
  #[serde(default)]
  pub build: BuildSection,
  #[serde(default)]
  pub runtime: RuntimeSection,
  #[serde(default)]
  pub dev: DevSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  #[serde(default = "default_app_dir")]
  pub dir: String,
  #[serde(default = "default_routes_dir")]
  pub routes_dir: String,
}

impl Default for AppSection {
  fn default() -> Self {
    Self { dir: default_app_dir(), routes_dir: default_routes_dir() }
  }
}

fn default_app_dir() -> String {
  "app".to_string()
}

fn default_routes_dir() -> String {
  "routes".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
  #[serde(default = "default_out_dir")]
  pub out_dir: String,
  #[serde(default = "default_public_path")]
  pub public_path: String,
  pub bundler_command: Option<String>,
  #[serde(default = "default_max_passes")]
  pub max_passes: usize,
  #[serde(default)]
  pub hash_identifiers: bool,
}

impl Default for BuildSection {
  fn default() -> Self {
    Self {
      out_dir: default_out_dir(),
      public_path: default_public_path(),
      bundler_command: None,
      max_passes: default_max_passes(),
      hash_identifiers: false,
    }
  }
}

fn default_out_dir() -> String {
  "build".to_string()
}

fn default_public_path() -> String {
  "/".to_string()
}

fn default_max_passes() -> usize {
  DEFAULT_MAX_PASSES
}

/// Overrides for the runtime module specifiers; unset keys keep the library defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSection {
  pub server: Option<String>,
  pub client: Option<String>,
  pub prerender: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevSection {
  #[serde(default = "default_dev_port")]
  pub port: u16,
  #[serde(default = "default_dev_host")]
  pub host: String,
}

impl Default for DevSection {
  fn default() -> Self {
    Self { port: default_dev_port(), host: default_dev_host() }
  }
}

fn default_dev_port() -> u16 {
  5173
}

fn default_dev_host() -> String {
  "127.0.0.1".to_string()
}

impl TandemConfig {
  pub fn validate(&self) -> Result<()> {
    if self.project.name.trim().is_empty() {
      bail!("project.name must not be empty");
    }
    let public = &self.build.public_path;
    if !public.starts_with('/') || !public.ends_with('/') {
      bail!("build.public_path must start and end with \"/\" (got \"{public}\")");
    }
    if self.build.max_passes == 0 {
      bail!("build.max_passes must be at least 1");
    }
    if self.build.bundler_command.as_deref().is_some_and(|c| c.trim().is_empty()) {
      bail!("build.bundler_command must not be empty");
    }
    Ok(())
  }

  pub fn bundler_command(&self) -> Result<&str> {
    match self.build.bundler_command.as_deref() {
      Some(cmd) => Ok(cmd),
      None => bail!("build.bundler_command is required (e.g. \"node tandem-bundle.mjs\")"),
    }
  }

  /// Library settings for a project rooted at `base_dir`.
  pub fn to_build_config(&self, base_dir: &Path, mode: BuildMode) -> BuildConfig {
    let defaults = RuntimeModules::default();
    let mut config = BuildConfig::new(base_dir, mode);
    config.app_dir = base_dir.join(&self.app.dir);
    config.routes_dir.clone_from(&self.app.routes_dir);
    config.out_dir = base_dir.join(&self.build.out_dir);
    config.public_path.clone_from(&self.build.public_path);
    config.max_passes = self.build.max_passes;
    config.hash_identifiers = self.build.hash_identifiers;
    config.runtime = RuntimeModules {
      server: self.runtime.server.clone().unwrap_or(defaults.server),
      client: self.runtime.client.clone().unwrap_or(defaults.client),
      prerender: self.runtime.prerender.clone().unwrap_or(defaults.prerender),
    };
    config
  }
}
