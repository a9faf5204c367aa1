/* src/build/core/src/virtual_module.rs */

// Synthetic modules generated from in-memory build state on every load.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::reference::{dispatch_table, json_str, to_import_path};
use crate::route::RouteTable;
use crate::scan::Boundary;

pub const VIRTUAL_PREFIX: &str = "virtual:tandem/";

/// Marks resolved virtual ids so they never reach the filesystem resolver.
pub const INTERNAL_MARKER: char = '\0';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualModule {
  BrowserEntry,
  ServerEntry,
  PrerenderEntry,
  Manifest,
  ClientReferences,
  ServerReferences,
  HmrRuntime,
}

impl VirtualModule {
  pub const ALL: [VirtualModule; 7] = [
    Self::BrowserEntry,
    Self::ServerEntry,
    Self::PrerenderEntry,
    Self::Manifest,
    Self::ClientReferences,
    Self::ServerReferences,
    Self::HmrRuntime,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Self::BrowserEntry => "browser-entry",
      Self::ServerEntry => "server-entry",
      Self::PrerenderEntry => "prerender-entry",
      Self::Manifest => "manifest",
      Self::ClientReferences => "client-references",
      Self::ServerReferences => "server-references",
      Self::HmrRuntime => "hmr-runtime",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|m| m.name() == name)
  }

  /// Dispatch table module listing the `kind` reference set.
  pub fn dispatch(kind: Boundary) -> Self {
    match kind {
      Boundary::Client => Self::ClientReferences,
      Boundary::Server => Self::ServerReferences,
    }
  }

  /// `virtual:tandem/<name>`, the specifier user code and generated code import.
  pub fn public_id(self) -> String {
    format!("{VIRTUAL_PREFIX}{}", self.name())
  }

  /// `\0virtual:tandem/<name>`, returned from resolve.
  pub fn internal_id(self) -> String {
    format!("{INTERNAL_MARKER}{}", self.public_id())
  }

  /// Path (without public path) under which a dev bundler serves the internal id.
  pub fn dev_url_path(self) -> String {
    format!("@id/__x00__{}", self.public_id())
  }

  /// Parse either a public or an internal id.
  pub fn parse(id: &str) -> Option<Self> {
    let id = id.strip_prefix(INTERNAL_MARKER).unwrap_or(id);
    id.strip_prefix(VIRTUAL_PREFIX).and_then(Self::from_name)
  }
}

/// Resolves and loads [`VirtualModule`]s against a [`BuildContext`].
#[derive(Debug)]
pub struct VirtualModules {
  ctx: Arc<BuildContext>,
  generation: AtomicU64,
}

impl VirtualModules {
  pub fn new(ctx: Arc<BuildContext>) -> Self {
    Self { ctx, generation: AtomicU64::new(0) }
  }

  /// Internal id for a public or internal virtual id; `None` for anything else.
  pub fn resolve(&self, id: &str) -> Option<String> {
    VirtualModule::parse(id).map(VirtualModule::internal_id)
  }

  /// Generated source for an internal id; `None` when the id is not ours.
  pub fn load(&self, id: &str) -> Result<Option<String>> {
    if !id.starts_with(INTERNAL_MARKER) {
      return Ok(None);
    }
    let Some(module) = VirtualModule::parse(id) else {
      return Ok(None);
    };
    let code = self.generate(module)?;
    tracing::debug!(module = module.name(), bytes = code.len(), "virtual module loaded");
    Ok(Some(code))
  }

  /// Bump the generation and return every internal id for downstream eviction.
  pub fn invalidate_all(&self) -> Vec<String> {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!(generation, "virtual modules invalidated");
    VirtualModule::ALL.into_iter().map(VirtualModule::internal_id).collect()
  }

  pub fn generation(&self) -> u64 {
    self.generation.load(Ordering::SeqCst)
  }

  fn generate(&self, module: VirtualModule) -> Result<String> {
    let config = self.ctx.config();
    match module {
      VirtualModule::BrowserEntry => Ok(self.browser_entry()),
      VirtualModule::ServerEntry => {
        let routes = self.ctx.routes();
        let entry = entry_specifier(routes.entries.server.as_deref(), &config.runtime.server);
        let mut out = route_entry_module(&entry, &routes);
        let _ = writeln!(
          out,
          "export {{ default as serverReferences }} from {};",
          json_str(&VirtualModule::ServerReferences.public_id())
        );
        Ok(out)
      }
      VirtualModule::PrerenderEntry => {
        let routes = self.ctx.routes();
        let entry = entry_specifier(routes.entries.prerender.as_deref(), &config.runtime.prerender);
        let mut out = route_entry_module(&entry, &routes);
        let _ = writeln!(
          out,
          "export {{ default as clientReferences }} from {};",
          json_str(&VirtualModule::ClientReferences.public_id())
        );
        let _ = writeln!(
          out,
          "export {{ default as assets }} from {};",
          json_str(&VirtualModule::Manifest.public_id())
        );
        Ok(out)
      }
      VirtualModule::Manifest => {
        let manifest = self.ctx.manifest().ok_or_else(|| {
          BuildError::configuration("manifest requested before the client build published it")
        })?;
        Ok(format!("export default {};\n", manifest.to_json()?))
      }
      VirtualModule::ClientReferences => {
        Ok(dispatch_table(config, self.ctx.references().get(Boundary::Client)))
      }
      VirtualModule::ServerReferences => {
        Ok(dispatch_table(config, self.ctx.references().get(Boundary::Server)))
      }
      VirtualModule::HmrRuntime => Ok(hmr_runtime(&config.public_path)),
    }
  }

  fn browser_entry(&self) -> String {
    let config = self.ctx.config();
    let routes = self.ctx.routes();
    let entry = entry_specifier(routes.entries.client.as_deref(), &config.runtime.client);
    if !config.mode.is_dev() {
      return format!("import {};\n", json_str(&entry));
    }
    format!(
      "import {hmr};\nimport manifest from {manifest};\nwindow.__tandemManifest = manifest;\nimport({entry});\n",
      hmr = json_str(&VirtualModule::HmrRuntime.public_id()),
      manifest = json_str(&VirtualModule::Manifest.public_id()),
      entry = json_str(&entry),
    )
  }
}

fn entry_specifier(app_entry: Option<&Path>, fallback: &str) -> String {
  app_entry.map_or_else(|| fallback.to_string(), to_import_path)
}

/// Shared body of the server and prerender entries: route imports plus `routes`.
fn route_entry_module(entry: &str, table: &RouteTable) -> String {
  let mut out = format!("import * as entry from {};\n", json_str(entry));
  for (i, record) in table.iter().enumerate() {
    let _ = writeln!(out, "import * as route{i} from {};", json_str(&to_import_path(&record.source)));
  }
  out.push_str("export { entry };\nexport const routes = {\n");
  for (i, record) in table.iter().enumerate() {
    let route = &record.route;
    let parent = route.parent_id.as_deref().map_or_else(|| "undefined".to_string(), json_str);
    let path = route.path.as_deref().map_or_else(|| "undefined".to_string(), json_str);
    let _ = writeln!(
      out,
      "  {id}: {{ id: {id}, parentId: {parent}, path: {path}, index: {index}, caseSensitive: {cs}, module: route{i} }},",
      id = json_str(&route.id),
      index = route.index,
      cs = route.case_sensitive,
    );
  }
  out.push_str("};\n");
  out
}

fn hmr_runtime(public_path: &str) -> String {
  format!(
    r#"const url = new URL({endpoint}, location.href);
url.protocol = url.protocol === "https:" ? "wss:" : "ws:";
const socket = new WebSocket(url);
socket.addEventListener("message", (event) => {{
  const update = JSON.parse(event.data);
  if (update.type !== "tandem:hmr") return;
  if (update.reload || !update.route) {{
    location.reload();
    return;
  }}
  const manifest = window.__tandemManifest;
  if (manifest) manifest.routes[update.route.id] = update.route;
  window.dispatchEvent(new CustomEvent("tandem:hmr", {{ detail: update }}));
}});
socket.addEventListener("close", () => setTimeout(() => location.reload(), 1000));
"#,
    endpoint = json_str(&format!("{public_path}__tandem/hmr")),
  )
}
