/* src/cli/core/src/config/tests/parsing.rs */

use std::path::{Path, PathBuf};

use tandem_build::BuildMode;

use super::*;

#[test]
fn parse_minimal_config() {
  let toml_str = r#"
[project]
name = "my-app"
"#;
  let config: TandemConfig = toml::from_str(toml_str).unwrap();
  assert_eq!(config.project.name, "my-app");
  assert_eq!(config.app.dir, "app");
  assert_eq!(config.app.routes_dir, "routes");
  assert_eq!(config.build.out_dir, "build");
  assert_eq!(config.build.public_path, "/");
  assert_eq!(config.build.max_passes, 10);
  assert!(!config.build.hash_identifiers);
  assert!(config.build.bundler_command.is_none());
  assert_eq!(config.dev.port, 5173);
  assert_eq!(config.dev.host, "127.0.0.1");
  assert!(config.validate().is_ok());
}

#[test]
fn parse_full_config() {
  let toml_str = r#"
[project]
name = "full-app"

[app]
dir = "src/app"
routes_dir = "pages"

[build]
out_dir = "dist"
public_path = "/static/"
bundler_command = "node scripts/bundle.mjs"
max_passes = 4
hash_identifiers = true

[runtime]
server = "my-runtime/server"

[dev]
port = 4000
host = "0.0.0.0"
"#;
  let config: TandemConfig = toml::from_str(toml_str).unwrap();
  assert_eq!(config.bundler_command().unwrap(), "node scripts/bundle.mjs");
  assert_eq!(config.dev.port, 4000);

  let build = config.to_build_config(Path::new("/proj"), BuildMode::Production);
  assert_eq!(build.app_dir, PathBuf::from("/proj/src/app"));
  assert_eq!(build.routes_path(), PathBuf::from("/proj/src/app/pages"));
  assert_eq!(build.out_dir, PathBuf::from("/proj/dist"));
  assert_eq!(build.public_path, "/static/");
  assert_eq!(build.max_passes, 4);
  assert!(build.hash_identifiers);
  assert_eq!(build.runtime.server, "my-runtime/server");
  assert_eq!(build.runtime.client, "@tandem/runtime/client");
}

#[test]
fn missing_bundler_command_is_reported() {
  let config: TandemConfig = toml::from_str("[project]\nname = \"x\"\n").unwrap();
  let err = config.bundler_command().unwrap_err();
  assert!(err.to_string().contains("build.bundler_command"));
}

#[test]
fn rejects_bad_public_path() {
  let toml_str = r#"
[project]
name = "x"

[build]
public_path = "assets"
"#;
  let config: TandemConfig = toml::from_str(toml_str).unwrap();
  assert!(config.validate().is_err());
}

#[test]
fn rejects_zero_passes() {
  let toml_str = "[project]\nname = \"x\"\n\n[build]\nmax_passes = 0\n";
  let config: TandemConfig = toml::from_str(toml_str).unwrap();
  assert!(config.validate().unwrap_err().to_string().contains("max_passes"));
}

#[test]
fn project_section_is_required() {
  assert!(toml::from_str::<TandemConfig>("[build]\nout_dir = \"x\"\n").is_err());
}
