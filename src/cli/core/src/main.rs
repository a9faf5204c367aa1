/* src/cli/core/src/main.rs */

mod build;
mod bundler;
mod config;
mod dev;
mod plugin_server;
mod routes;
mod shell;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::{TandemConfig, find_tandem_config, load_tandem_config};

#[derive(Parser)]
#[command(name = "tandem", about = "Tandem build orchestrator")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Production build of the client, prerender and server environments
  Build {
    /// Path to tandem.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
  /// Start the dev bundler with hot updates
  Dev {
    /// Path to tandem.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Dev server port (overrides [dev] port)
    #[arg(short, long)]
    port: Option<u16>,
  },
  /// Print the route table with each route's capabilities
  Routes {
    /// Path to tandem.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print JSON instead of the tree
    #[arg(long)]
    json: bool,
  },
}

/// Resolve config path (explicit or auto-detected) and parse it
fn resolve_config(explicit: Option<PathBuf>) -> Result<(PathBuf, TandemConfig)> {
  let path = match explicit {
    Some(p) => p,
    None => {
      let cwd = std::env::current_dir().context("failed to get cwd")?;
      find_tandem_config(&cwd)?
    }
  };
  let config = load_tandem_config(&path)?;
  Ok((path, config))
}

/// Absolute project root: the directory holding tandem.toml
fn base_dir(config_path: &Path) -> Result<PathBuf> {
  let dir = match config_path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  dir.canonicalize().with_context(|| format!("failed to resolve {}", dir.display()))
}

fn init_logging() {
  let filter = EnvFilter::try_from_env("TANDEM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
  init_logging();
  let cli = Cli::parse();

  match cli.command {
    Command::Build { config } => {
      let (config_path, tandem_config) = resolve_config(config)?;
      build::run_build(&tandem_config, &base_dir(&config_path)?).await?;
    }
    Command::Dev { config, port } => {
      let (config_path, tandem_config) = resolve_config(config)?;
      dev::run_dev(&tandem_config, &base_dir(&config_path)?, port).await?;
    }
    Command::Routes { config, json } => {
      let (config_path, tandem_config) = resolve_config(config)?;
      routes::run_routes(&tandem_config, &base_dir(&config_path)?, json).await?;
    }
  }

  Ok(())
}
