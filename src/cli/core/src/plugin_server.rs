/* src/cli/core/src/plugin_server.rs */

// JSON-over-HTTP bridge exposing the plugin hooks to an external bundler process.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tandem_build::{Boundary, BuildError, Environment, PluginHost};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const RESOLVE_PATH: &str = "/__tandem/resolve";
pub const LOAD_PATH: &str = "/__tandem/load";
pub const TRANSFORM_PATH: &str = "/__tandem/transform";

#[derive(Debug, Deserialize)]
struct ResolveBody {
  id: String,
  importer: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveReply {
  id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadBody {
  id: String,
}

#[derive(Debug, Serialize)]
struct LoadReply {
  code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransformBody {
  env: Environment,
  id: String,
  code: String,
}

#[derive(Debug, Serialize)]
struct TransformReply {
  code: Option<String>,
  boundary: Option<Boundary>,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
  error: String,
}

fn error_response(err: &BuildError) -> Response {
  let status = match err {
    BuildError::Transform { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  };
  (status, Json(ErrorReply { error: err.to_string() })).into_response()
}

async fn handle_resolve(State(host): State<PluginHost>, Json(body): Json<ResolveBody>) -> Json<ResolveReply> {
  Json(ResolveReply { id: host.resolve_id(&body.id, body.importer.as_deref()) })
}

async fn handle_load(State(host): State<PluginHost>, Json(body): Json<LoadBody>) -> Response {
  match host.load(&body.id) {
    Ok(code) => Json(LoadReply { code }).into_response(),
    Err(e) => error_response(&e),
  }
}

async fn handle_transform(State(host): State<PluginHost>, Json(body): Json<TransformBody>) -> Response {
  // parsing and import resolution block
  let task = tokio::task::spawn_blocking(move || {
    let result = host.transform(body.env, &body.id, &body.code);
    (body, result)
  });
  match task.await {
    Ok((_, Ok(out))) => Json(TransformReply { code: out.code, boundary: out.boundary }).into_response(),
    Ok((body, Err(e))) => {
      tracing::debug!(id = %body.id, env = %body.env, error = %e, "transform rejected");
      error_response(&e)
    }
    Err(e) => {
      tracing::error!(error = %e, "transform task failed");
      (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorReply { error: e.to_string() })).into_response()
    }
  }
}

/// Plugin hook routes bound to `host`.
pub fn router(host: PluginHost) -> Router {
  Router::new()
    .route(RESOLVE_PATH, post(handle_resolve))
    .route(LOAD_PATH, post(handle_load))
    .route(TRANSFORM_PATH, post(handle_transform))
    .with_state(host)
}

/// Ephemeral plugin server for one bundler invocation.
pub struct PluginServer {
  addr: SocketAddr,
  shutdown: Option<oneshot::Sender<()>>,
  task: JoinHandle<std::io::Result<()>>,
}

impl PluginServer {
  pub async fn start(host: PluginHost) -> Result<Self> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
      .await
      .context("failed to bind plugin server")?;
    let addr = listener.local_addr().context("failed to read plugin server address")?;
    let (tx, rx) = oneshot::channel::<()>();
    let app = router(host);
    let task = tokio::spawn(async move {
      axum::serve(listener, app)
        .with_graceful_shutdown(async {
          let _ = rx.await;
        })
        .await
    });
    tracing::debug!(%addr, "plugin server listening");
    Ok(Self { addr, shutdown: Some(tx), task })
  }

  pub fn url(&self) -> String {
    format!("http://{}", self.addr)
  }

  pub async fn stop(mut self) -> Result<()> {
    if let Some(tx) = self.shutdown.take() {
      let _ = tx.send(());
    }
    (&mut self.task).await.context("plugin server task panicked")?.context("plugin server failed")?;
    Ok(())
  }
}
