/* src/cli/core/src/dev/watcher.rs */

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Events closer together than this are handled as one batch.
pub(super) const COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Recursive watcher over `dir`; changed paths arrive on the returned channel.
pub(super) fn watch(dir: &Path) -> Result<(RecommendedWatcher, mpsc::Receiver<PathBuf>)> {
  let (tx, rx) = mpsc::channel(256);
  let mut watcher = RecommendedWatcher::new(
    move |res: std::result::Result<notify::Event, notify::Error>| {
      let Ok(event) = res else { return };
      if matches!(event.kind, EventKind::Access(_)) {
        return;
      }
      for path in event.paths {
        let _ = tx.blocking_send(path);
      }
    },
    notify::Config::default(),
  )
  .context("failed to create file watcher")?;
  watcher
    .watch(dir, RecursiveMode::Recursive)
    .with_context(|| format!("failed to watch {}", dir.display()))?;
  Ok((watcher, rx))
}

/// Collect `first` plus everything arriving within the coalescing window.
///
/// Order of first arrival is kept and repeats are dropped.
pub(super) async fn coalesce(first: PathBuf, rx: &mut mpsc::Receiver<PathBuf>) -> Vec<PathBuf> {
  let mut batch = vec![first];
  loop {
    match tokio::time::timeout(COALESCE_WINDOW, rx.recv()).await {
      Ok(Some(path)) => {
        if !batch.contains(&path) {
          batch.push(path);
        }
      }
      Ok(None) | Err(_) => break,
    }
  }
  batch
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn coalesces_burst_in_arrival_order() {
    let (tx, mut rx) = mpsc::channel(8);
    for p in ["b.tsx", "a.tsx", "b.tsx", "c.tsx"] {
      tx.send(PathBuf::from(p)).await.unwrap();
    }
    let batch = coalesce(PathBuf::from("a.tsx"), &mut rx).await;
    assert_eq!(batch, vec![PathBuf::from("a.tsx"), PathBuf::from("b.tsx"), PathBuf::from("c.tsx")]);
  }

  #[tokio::test]
  async fn stops_at_quiet_window() {
    let (tx, mut rx) = mpsc::channel(8);
    tx.send(PathBuf::from("late.tsx")).await.unwrap();
    let sender = tokio::spawn(async move {
      tokio::time::sleep(COALESCE_WINDOW * 5).await;
      tx.send(PathBuf::from("later.tsx")).await.unwrap();
    });
    let batch = coalesce(PathBuf::from("first.tsx"), &mut rx).await;
    assert_eq!(batch, vec![PathBuf::from("first.tsx"), PathBuf::from("late.tsx")]);
    sender.await.unwrap();
    assert_eq!(rx.recv().await, Some(PathBuf::from("later.tsx")));
  }
}
