/* src/cli/core/src/shell.rs */

// Shell command helpers shared across build and dev.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::ui::{self, DIM, MAGENTA, RESET};

fn shell(command: &str, base_dir: &Path, env: &[(&str, &str)]) -> Command {
  let mut cmd = Command::new("sh");
  cmd.args(["-c", command]);
  cmd.current_dir(base_dir);
  for (k, v) in env {
    cmd.env(k, v);
  }
  cmd
}

/// Run a shell command to completion, bail on failure (shows both stdout and stderr on error).
pub(crate) async fn run_command(
  base_dir: &Path,
  command: &str,
  label: &str,
  env: &[(&str, &str)],
) -> Result<()> {
  ui::detail(&format!("{DIM}{command}{RESET}"));
  let output = shell(command, base_dir, env)
    .output()
    .await
    .with_context(|| format!("failed to run {label}"))?;
  if !output.status.success() {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut msg = format!("{label} exited with status {}", output.status);
    if !stderr.is_empty() {
      msg.push('\n');
      msg.push_str(&stderr);
    }
    if !stdout.is_empty() {
      msg.push('\n');
      msg.push_str(&stdout);
    }
    bail!("{msg}");
  }
  Ok(())
}

/// Spawn a long-running shell command whose output is streamed with a label prefix.
pub(crate) fn spawn_command(
  base_dir: &Path,
  command: &str,
  label: &'static str,
  env: &[(&str, &str)],
) -> Result<Child> {
  let mut cmd = shell(command, base_dir, env);
  cmd.stdout(Stdio::piped());
  cmd.stderr(Stdio::piped());
  cmd.kill_on_drop(true);
  let mut child = cmd.spawn().with_context(|| format!("failed to start {label}"))?;

  if let Some(stdout) = child.stdout.take() {
    tokio::spawn(async move {
      let mut lines = BufReader::new(stdout).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        println!("  {MAGENTA}{DIM}{label:>8}{RESET} {line}");
      }
    });
  }
  if let Some(stderr) = child.stderr.take() {
    tokio::spawn(async move {
      let mut lines = BufReader::new(stderr).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        eprintln!("  {MAGENTA}{DIM}{label:>8}{RESET} {line}");
      }
    });
  }
  Ok(child)
}
