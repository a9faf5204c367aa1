/* src/cli/core/src/ui.rs */

use std::time::Duration;

use tandem_build::Environment;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn env_color(env: Environment) -> &'static str {
  match env {
    Environment::Client => CYAN,
    Environment::Ssr => MAGENTA,
    Environment::Server => YELLOW,
  }
}

pub fn ok(msg: &str) {
  println!("  {GREEN}\u{2713}{RESET} {msg}");
}

pub fn warn(msg: &str) {
  println!("  {YELLOW}!{RESET} {msg}");
}

pub fn step(n: usize, msg: &str) {
  println!("  {BOLD}[{n}]{RESET} {msg}...");
}

pub fn detail(msg: &str) {
  println!("        {msg}");
}

pub fn detail_ok(msg: &str) {
  println!("        {GREEN}\u{2713}{RESET} {msg}");
}

/// Detail line tagged with a colored environment name.
pub fn env_detail(env: Environment, msg: &str) {
  let color = env_color(env);
  println!("        {color}{:<6}{RESET} {msg}", env.as_str());
}

pub fn banner(cmd: &str, project: &str) {
  println!();
  println!("  {BOLD}tandem{RESET} {cmd} {DIM}{project} v{VERSION}{RESET}");
  println!();
}

pub fn format_size(bytes: u64) -> String {
  if bytes >= 1_000_000 {
    format!("{:.1} MB", bytes as f64 / 1_000_000.0)
  } else if bytes >= 1_000 {
    format!("{:.1} kB", bytes as f64 / 1_000.0)
  } else {
    format!("{bytes} B")
  }
}

pub fn format_duration(elapsed: Duration) -> String {
  if elapsed.as_millis() < 1_000 {
    format!("{}ms", elapsed.as_millis())
  } else {
    format!("{:.1}s", elapsed.as_secs_f64())
  }
}

pub fn blank() {
  println!();
}
