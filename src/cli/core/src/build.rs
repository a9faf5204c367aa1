/* src/cli/core/src/build.rs */

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tandem_build::{BuildContext, BuildMode, BuildReport, Environment, Orchestrator};

use crate::bundler::CommandBundler;
use crate::config::TandemConfig;
use crate::ui::{self, BOLD, DIM, GREEN, RESET};

/// Production build: fixed-point passes over the configured bundler, then the manifest file.
pub async fn run_build(config: &TandemConfig, base_dir: &Path) -> Result<BuildReport> {
  let started = Instant::now();
  ui::banner("build", &config.project.name);

  let build_config = config.to_build_config(base_dir, BuildMode::Production);
  let bundler = CommandBundler::new(base_dir, config.bundler_command()?);
  let ctx = Arc::new(BuildContext::new(build_config));
  let orchestrator = Orchestrator::new(ctx, bundler);

  ui::step(1, "building environments");
  let report = orchestrator.run().await.context("build failed")?;
  print_report(&report).await;

  ui::blank();
  ui::ok(&format!("{GREEN}build complete{RESET} {DIM}({}){RESET}", ui::format_duration(started.elapsed())));
  Ok(report)
}

async fn print_report(report: &BuildReport) {
  let noun = if report.passes == 1 { "pass" } else { "passes" };
  ui::detail_ok(&format!("converged after {BOLD}{}{RESET} {noun}", report.passes));
  for env in [Environment::Client, Environment::Ssr, Environment::Server] {
    ui::env_detail(env, &format!("{DIM}built {}x{RESET}", report.builds.get(env)));
  }
  ui::detail(&format!(
    "references {DIM}{} client, {} server{RESET}",
    report.references.client().len(),
    report.references.server().len()
  ));

  ui::step(2, "writing manifest");
  ui::detail(&format!("{} routes, version {}", report.manifest.routes.len(), report.manifest.version));
  if let Some(path) = &report.manifest_path {
    let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
    ui::detail_ok(&format!("{}  {DIM}{}{RESET}", path.display(), ui::format_size(size)));
  }
}
