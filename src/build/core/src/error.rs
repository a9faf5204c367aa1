/* src/build/core/src/error.rs */

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BuildError {
  /// Missing root entry, missing manifest key, invalid settings.
  #[error("{message}")]
  Configuration { message: String },

  /// Boundary rewrite or parse failure for a single module.
  #[error("failed to transform {module}: {message}")]
  Transform { module: String, message: String },

  #[error(
    "build did not converge after {passes} passes \
     ({client} client references, {server} server references)"
  )]
  DidNotConverge { passes: usize, client: usize, server: usize },

  /// Failure reported by the external bundler, surfaced as-is.
  #[error(transparent)]
  Bundler(anyhow::Error),

  #[error("failed to {action} {}", path.display())]
  Io {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl BuildError {
  pub fn configuration(message: impl Into<String>) -> Self {
    Self::Configuration { message: message.into() }
  }

  pub fn transform(module: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Transform { module: module.into(), message: message.into() }
  }

  /// Missing key in a lookup table; lists every known key as a diagnostic aid.
  pub fn missing_key<'a>(
    what: &str,
    key: &str,
    known: impl IntoIterator<Item = &'a String>,
  ) -> Self {
    let known: Vec<&str> = known.into_iter().map(String::as_str).collect();
    let list = if known.is_empty() { "(none)".to_string() } else { known.join(", ") };
    Self::configuration(format!("no {what} entry for \"{key}\"\nknown entries: {list}"))
  }

  pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io { action, path: path.into(), source }
  }
}
