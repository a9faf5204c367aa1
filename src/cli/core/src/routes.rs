/* src/cli/core/src/routes.rs */

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tandem_build::route::{Route, RouteCapabilities, RouteTable, build_route_table};
use tandem_build::scan::OxcExportLister;
use tandem_build::BuildMode;

use crate::config::TandemConfig;
use crate::ui::{self, BOLD, CYAN, DIM, RESET};

#[derive(Serialize)]
struct RouteRow<'a> {
  #[serde(flatten)]
  route: &'a Route,
  #[serde(flatten)]
  capabilities: &'a RouteCapabilities,
}

fn to_json(table: &RouteTable) -> Result<String> {
  let rows: Vec<RouteRow<'_>> =
    table.iter().map(|r| RouteRow { route: &r.route, capabilities: &r.capabilities }).collect();
  serde_json::to_string_pretty(&rows).context("failed to serialize route table")
}

fn capability_flags(caps: &RouteCapabilities) -> String {
  let flags = [
    (caps.has_loader, "loader"),
    (caps.has_action, "action"),
    (caps.has_client_loader, "clientLoader"),
    (caps.has_client_action, "clientAction"),
    (caps.has_error_boundary, "ErrorBoundary"),
  ];
  let set: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, name)| *name).collect();
  if set.is_empty() { "-".to_string() } else { set.join(", ") }
}

fn depth(table: &RouteTable, route: &Route) -> usize {
  let mut depth = 0;
  let mut parent = route.parent_id.as_deref();
  while let Some(id) = parent {
    depth += 1;
    parent = table.get(id).and_then(|r| r.route.parent_id.as_deref());
  }
  depth
}

/// Sibling routes that would answer the same URL.
fn path_conflicts(table: &RouteTable) -> Vec<(String, String)> {
  let routes: Vec<&Route> = table.iter().map(|r| &r.route).collect();
  let mut conflicts = Vec::new();
  for (i, a) in routes.iter().enumerate() {
    for b in &routes[i + 1..] {
      if a.parent_id.is_some() && a.parent_id == b.parent_id && a.path == b.path && a.index == b.index {
        conflicts.push((a.id.clone(), b.id.clone()));
      }
    }
  }
  conflicts
}

fn print_table(table: &RouteTable) {
  for record in table.iter() {
    let route = &record.route;
    let indent = "  ".repeat(depth(table, route));
    let path = match (&route.path, route.index) {
      (_, true) => "(index)".to_string(),
      (Some(p), false) => format!("/{p}"),
      (None, false) => String::new(),
    };
    ui::detail(&format!("{indent}{BOLD}{}{RESET} {CYAN}{path}{RESET}", route.id));
    ui::detail(&format!("{indent}  {DIM}{}  [{}]{RESET}", route.file, capability_flags(&record.capabilities)));
  }
}

/// Scan the routes folder and print the table (or its JSON form).
pub async fn run_routes(config: &TandemConfig, base_dir: &Path, json: bool) -> Result<()> {
  let build_config = config.to_build_config(base_dir, BuildMode::Production);
  let table = build_route_table(&build_config, &OxcExportLister).await.context("failed to scan routes")?;
  if json {
    println!("{}", to_json(&table)?);
    return Ok(());
  }
  ui::banner("routes", &config.project.name);
  print_table(&table);
  ui::blank();
  if table.len() <= 1 {
    ui::warn(&format!("no route modules under {}", build_config.routes_path().display()));
  }
  for (first, second) in path_conflicts(&table) {
    ui::warn(&format!("{first} and {second} match the same path"));
  }
  ui::ok(&format!("{} routes", table.len()));
  Ok(())
}
