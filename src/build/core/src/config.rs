/* src/build/core/src/config.rs */

// Static settings for one build or dev-server lifetime.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

pub const DEFAULT_MAX_PASSES: usize = 10;

/// The three bundler environments driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  /// Browser bundle.
  Client,
  /// Pre-render bundle; consumes the client chunk graph.
  Ssr,
  /// Server-components bundle.
  Server,
}

impl Environment {
  pub const ALL: [Environment; 3] = [Self::Client, Self::Ssr, Self::Server];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Client => "client",
      Self::Ssr => "ssr",
      Self::Server => "server",
    }
  }

  /// Output subdirectory under the build's out dir.
  pub fn out_subdir(self) -> &'static str {
    match self {
      Self::Client => "browser",
      Self::Ssr => "prerender",
      Self::Server => "server",
    }
  }

  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "client" => Some(Self::Client),
      "ssr" => Some(Self::Ssr),
      "server" => Some(Self::Server),
      _ => None,
    }
  }
}

impl fmt::Display for Environment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  Development,
  Production,
}

impl BuildMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Development => "development",
      Self::Production => "production",
    }
  }

  pub fn is_dev(self) -> bool {
    matches!(self, Self::Development)
  }
}

/// Module specifiers of the rendering runtime the generated code imports from.
#[derive(Debug, Clone)]
pub struct RuntimeModules {
  /// Provides `registerClientReference` / `registerServerReference` and the server entry.
  pub server: String,
  /// Provides `createServerReference` / `callServer` and the client entry.
  pub client: String,
  /// Default pre-render entry when the app has no `entry.prerender.*`.
  pub prerender: String,
}

impl Default for RuntimeModules {
  fn default() -> Self {
    Self {
      server: "@tandem/runtime/server".to_string(),
      client: "@tandem/runtime/client".to_string(),
      prerender: "@tandem/runtime/prerender".to_string(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Absolute project root; also the working directory for production identifiers.
  pub root_dir: PathBuf,
  /// Absolute app directory holding `root.*`, entries and the routes folder.
  pub app_dir: PathBuf,
  /// Routes folder, relative to `app_dir`.
  pub routes_dir: String,
  /// Absolute build output directory.
  pub out_dir: PathBuf,
  pub public_path: String,
  pub mode: BuildMode,
  pub max_passes: usize,
  pub hash_identifiers: bool,
  pub runtime: RuntimeModules,
}

impl BuildConfig {
  /// Defaults for a project rooted at `root_dir` (`app/`, `build/`, public path `/`).
  pub fn new(root_dir: impl Into<PathBuf>, mode: BuildMode) -> Self {
    let root_dir = root_dir.into();
    Self {
      app_dir: root_dir.join("app"),
      out_dir: root_dir.join("build"),
      root_dir,
      routes_dir: "routes".to_string(),
      public_path: "/".to_string(),
      mode,
      max_passes: DEFAULT_MAX_PASSES,
      hash_identifiers: false,
      runtime: RuntimeModules::default(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !self.public_path.starts_with('/') || !self.public_path.ends_with('/') {
      return Err(BuildError::configuration(format!(
        "public_path must start and end with \"/\" (got \"{}\")",
        self.public_path
      )));
    }
    if self.max_passes == 0 {
      return Err(BuildError::configuration("max_passes must be at least 1"));
    }
    if !self.app_dir.starts_with(&self.root_dir) {
      return Err(BuildError::configuration(format!(
        "app directory {} is outside the project root {}",
        self.app_dir.display(),
        self.root_dir.display()
      )));
    }
    Ok(())
  }

  pub fn routes_path(&self) -> PathBuf {
    self.app_dir.join(&self.routes_dir)
  }

  pub fn env_out_dir(&self, env: Environment) -> PathBuf {
    self.out_dir.join(env.out_subdir())
  }

  /// Project-relative, `/`-separated form of `path` (used as chunk-manifest key).
  pub fn relative_key(&self, path: &Path) -> String {
    let rel = path.strip_prefix(&self.root_dir).unwrap_or(path);
    to_slash(rel)
  }
}

pub(crate) fn to_slash(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .filter(|s| s != "/" && s != "\\")
    .collect::<Vec<_>>()
    .join("/")
}
