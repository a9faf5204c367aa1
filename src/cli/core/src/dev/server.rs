/* src/cli/core/src/dev/server.rs */

// Dev HTTP surface: plugin hooks, HMR socket, live manifest and reference lookups.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tandem_build::Boundary;
use tandem_build::dev::{DevSession, HotUpdate, RuntimeError};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::plugin_server;

pub const HMR_PATH: &str = "/__tandem/hmr";
pub const MANIFEST_PATH: &str = "/__tandem/manifest";
pub const REFERENCE_PATH: &str = "/__tandem/reference";

#[derive(Clone)]
pub(super) struct DevState {
  pub session: Arc<DevSession>,
  pub updates: broadcast::Sender<HotUpdate>,
}

#[derive(Debug, Deserialize)]
struct ReferenceQuery {
  kind: Boundary,
  id: String,
  name: String,
}

#[derive(Debug, Serialize)]
struct ReferenceReply {
  id: String,
  path: String,
  name: String,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
  error: String,
}

async fn handle_manifest(State(state): State<DevState>) -> Response {
  match state.session.manifest() {
    Some(manifest) => Json(manifest.as_ref().clone()).into_response(),
    None => (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorReply { error: "manifest not published".into() }))
      .into_response(),
  }
}

fn runtime_status(err: &RuntimeError) -> StatusCode {
  match err {
    RuntimeError::ModuleNotFound(_) | RuntimeError::ExportNotFound { .. } => StatusCode::NOT_FOUND,
    RuntimeError::ModuleNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
    RuntimeError::Rejected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

async fn handle_reference(State(state): State<DevState>, Query(query): Query<ReferenceQuery>) -> Response {
  match state.session.runtime().load_export(query.kind, &query.id, &query.name).await {
    Ok(export) => Json(ReferenceReply {
      id: export.module.id.clone(),
      path: export.module.path.to_string_lossy().to_string(),
      name: export.name,
    })
    .into_response(),
    Err(e) => {
      tracing::debug!(kind = query.kind.as_str(), id = %query.id, error = %e, "reference lookup failed");
      (runtime_status(&e), Json(ErrorReply { error: e.to_string() })).into_response()
    }
  }
}

async fn handle_hmr(State(state): State<DevState>, ws: WebSocketUpgrade) -> Response {
  let rx = state.updates.subscribe();
  ws.on_upgrade(move |socket| hmr_socket(socket, rx))
}

async fn hmr_socket(socket: WebSocket, mut rx: broadcast::Receiver<HotUpdate>) {
  let (mut sender, mut receiver) = socket.split();
  loop {
    tokio::select! {
      msg = receiver.next() => {
        match msg {
          Some(Ok(Message::Close(_)) | Err(_)) | None => break,
          _ => continue,
        }
      }
      update = rx.recv() => {
        let text = match update {
          Ok(update) => serde_json::to_string(&update).unwrap_or_default(),
          // missed updates cannot be replayed; ask the page to reload
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "hmr client lagged");
            serde_json::json!({ "type": tandem_build::dev::HOT_UPDATE_TYPE, "reload": true }).to_string()
          }
          Err(broadcast::error::RecvError::Closed) => break,
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
          break;
        }
      }
    }
  }
  let _ = sender.close().await;
}

pub(super) fn router(state: DevState) -> Router {
  let plugin = plugin_server::router(state.session.host());
  Router::new()
    .route(HMR_PATH, get(handle_hmr))
    .route(MANIFEST_PATH, get(handle_manifest))
    .route(REFERENCE_PATH, get(handle_reference))
    .with_state(state)
    .merge(plugin)
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::fs;

  use axum::body::Body;
  use axum::http::Request;
  use tandem_build::{BuildConfig, BuildMode};
  use tower::ServiceExt;

  use super::*;

  async fn state(dir: &std::path::Path) -> DevState {
    fs::create_dir_all(dir.join("app/routes")).unwrap();
    fs::write(dir.join("app/root.tsx"), "export default function Root() {}\n").unwrap();
    fs::write(dir.join("app/button.tsx"), "\"use client\";\nexport function Button() {}\n").unwrap();
    let session = DevSession::start(BuildConfig::new(dir, BuildMode::Development)).await.unwrap();
    let (updates, _) = broadcast::channel(16);
    DevState { session: Arc::new(session), updates }
  }

  async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn serves_live_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get_json(router(state(dir.path()).await), MANIFEST_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["routes"]["root"]["module"], "/app/root.tsx");
    assert_eq!(body["hmr"]["runtime"], "/@id/__x00__virtual:tandem/hmr-runtime");
  }

  #[tokio::test]
  async fn resolves_registered_references() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path()).await;
    let button = dir.path().join("app/button.tsx");
    state.session.context().register_reference(Boundary::Client, &button);

    let uri = format!("{REFERENCE_PATH}?kind=client&id=/app/button.tsx&name=Button");
    let (status, body) = get_json(router(state.clone()), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Button");

    let uri = format!("{REFERENCE_PATH}?kind=client&id=/app/button.tsx&name=Missing");
    let (status, _) = get_json(router(state.clone()), &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("{REFERENCE_PATH}?kind=server&id=/app/nope.ts&name=x");
    let (status, body) = get_json(router(state), &uri).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("no server reference"));
  }

  #[tokio::test]
  async fn plugin_routes_are_mounted() {
    let dir = tempfile::tempdir().unwrap();
    let req = Request::builder()
      .method("POST")
      .uri(plugin_server::LOAD_PATH)
      .header("content-type", "application/json")
      .body(Body::from(r#"{"id":"\u0000virtual:tandem/manifest"}"#))
      .unwrap();
    let res = router(state(dir.path()).await).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
  }
}
