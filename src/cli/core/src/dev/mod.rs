/* src/cli/core/src/dev/mod.rs */

mod server;
mod watcher;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tandem_build::dev::{DevSession, HotUpdate};
use tandem_build::virtual_module::VirtualModule;
use tandem_build::{BuildMode, Environment};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use crate::config::TandemConfig;
use crate::shell::spawn_command;
use crate::ui::{self, CYAN, DIM, GREEN, RED, RESET, YELLOW};

use server::DevState;

const PORT_ATTEMPTS: u16 = 100;

/// Bind `preferred`, falling back to the next free port above it.
async fn bind_port(host: &str, preferred: u16) -> Result<TcpListener> {
  for offset in 0..PORT_ATTEMPTS {
    let Some(port) = preferred.checked_add(offset) else { break };
    if let Ok(listener) = TcpListener::bind((host, port)).await {
      return Ok(listener);
    }
  }
  bail!("no available port found in range {preferred}-{}", preferred.saturating_add(PORT_ATTEMPTS - 1));
}

fn print_update(update: &HotUpdate) {
  let (color, what) = match (&update.route, update.reload) {
    (Some(route), _) => (GREEN, format!("route {} updated", route.route.id)),
    (None, true) => (YELLOW, "full reload".to_string()),
    (None, false) => (CYAN, "hot update".to_string()),
  };
  ui::env_detail(update.env, &format!("{} {color}{what}{RESET}", update.file));
}

/// Dev mode: live manifest and plugin hooks over HTTP, bundler process, file watching.
pub async fn run_dev(config: &TandemConfig, base_dir: &Path, port: Option<u16>) -> Result<()> {
  ui::banner("dev", &config.project.name);
  let command = config.bundler_command()?;
  let build_config = config.to_build_config(base_dir, BuildMode::Development);
  let app_dir = build_config.app_dir.clone();
  let client_out = build_config.env_out_dir(Environment::Client);

  let session = Arc::new(DevSession::start(build_config).await.context("failed to start dev session")?);
  match session.manifest() {
    Some(manifest) => {
      ui::detail_ok(&format!("{} routes {DIM}(manifest {}){RESET}", manifest.routes.len(), manifest.version))
    }
    None => ui::warn("no dev manifest published yet"),
  }

  let (updates, _) = broadcast::channel::<HotUpdate>(64);
  let state = DevState { session: session.clone(), updates: updates.clone() };
  let listener = bind_port(&config.dev.host, port.unwrap_or(config.dev.port)).await?;
  let addr = listener.local_addr().context("failed to read dev server address")?;
  let app = server::router(state);
  let server_task = tokio::spawn(async move { axum::serve(listener, app).await });
  let plugin_url = format!("http://{addr}");
  ui::detail_ok(&format!("plugin server {CYAN}{plugin_url}{RESET}"));

  let (_watcher, mut changes) = watcher::watch(&app_dir)?;
  ui::detail(&format!("{DIM}watching {}{RESET}", app_dir.display()));

  let entry = VirtualModule::BrowserEntry.public_id();
  let out_dir = client_out.to_string_lossy().to_string();
  let env = [
    ("TANDEM_ENV", Environment::Client.as_str()),
    ("TANDEM_MODE", BuildMode::Development.as_str()),
    ("TANDEM_ENTRY", entry.as_str()),
    ("TANDEM_OUT_DIR", out_dir.as_str()),
    ("TANDEM_PLUGIN_URL", plugin_url.as_str()),
  ];
  let mut child = spawn_command(base_dir, command, "bundler", &env)?;
  ui::blank();

  loop {
    tokio::select! {
      _ = signal::ctrl_c() => {
        ui::blank();
        ui::detail(&format!("{DIM}shutting down...{RESET}"));
        break;
      }
      status = child.wait() => {
        match status {
          Ok(s) if s.success() => ui::detail(&format!("{DIM}bundler exited{RESET}")),
          Ok(s) => ui::detail(&format!("{RED}bundler exited with {s}{RESET}")),
          Err(e) => ui::detail(&format!("{RED}bundler error: {e}{RESET}")),
        }
        break;
      }
      Some(first) = changes.recv() => {
        for path in watcher::coalesce(first, &mut changes).await {
          if let Some(update) = session.handle_change(&path).await {
            print_update(&update);
            // no subscribers is fine
            let _ = updates.send(update);
          }
        }
      }
    }
  }

  server_task.abort();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn falls_back_to_next_free_port() {
    let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = taken.local_addr().unwrap().port();
    let listener = bind_port("127.0.0.1", port).await.unwrap();
    assert_ne!(listener.local_addr().unwrap().port(), port);
  }
}
