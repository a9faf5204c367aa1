/* src/build/core/src/reference/transform.rs */

// Boundary rewrite: replace a marked module's exports with reference proxies.

use std::fmt::Write as _;
use std::path::Path;

use super::{identifier, json_str};
use crate::config::{BuildConfig, Environment};
use crate::error::{BuildError, Result};
use crate::scan::{Boundary, ModuleScan};

/// Rewrite a boundary module for `env`.
///
/// Returns `None` when the module passes through unchanged: no directive, or
/// a client module outside the server environment.
pub fn rewrite_boundary(
  config: &BuildConfig,
  env: Environment,
  path: &Path,
  source: &str,
  scan: &ModuleScan,
) -> Result<Option<String>> {
  let Some(boundary) = scan.boundary else {
    return Ok(None);
  };
  if let Some(star) = scan.star_exports.first() {
    return Err(BuildError::transform(
      path.to_string_lossy(),
      format!(
        "`export * from \"{star}\"` is not allowed in a \"{}\" module; list the exports explicitly",
        boundary.directive()
      ),
    ));
  }
  let id = identifier(config, path);
  let code = match (boundary, env) {
    (Boundary::Client, Environment::Server) => client_stub_module(config, &id, scan),
    (Boundary::Client, _) => return Ok(None),
    (Boundary::Server, Environment::Server) => server_registration_module(config, &id, path, source, scan),
    (Boundary::Server, _) => server_proxy_module(config, &id, scan),
  };
  Ok(Some(code))
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  chars.next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
    && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// `export { local as name }` clause, quoting names that are not identifiers.
fn export_clause(pairs: &[(String, String)]) -> String {
  let specs: Vec<String> = pairs
    .iter()
    .map(|(local, exported)| {
      if is_identifier(exported) { format!("{local} as {exported}") } else { format!("{local} as {}", json_str(exported)) }
    })
    .collect();
  format!("export {{ {} }};\n", specs.join(", "))
}

fn client_stub_module(config: &BuildConfig, id: &str, scan: &ModuleScan) -> String {
  let mut out = format!(
    "import {{ registerClientReference }} from {};\n",
    json_str(&config.runtime.server)
  );
  let mut pairs = Vec::new();
  for (i, export) in scan.exports.iter().enumerate() {
    let local = format!("$$client_ref_{i}");
    let message = json_str(&format!(
      "Attempted to call {}() from the server but it is on the client. \
       It can only be rendered as a component or passed to a client component.",
      export.exported
    ));
    let _ = writeln!(
      out,
      "const {local} = registerClientReference(function () {{ throw new Error({message}); }}, {}, {});",
      json_str(id),
      json_str(&export.exported)
    );
    pairs.push((local, export.exported.clone()));
  }
  if !pairs.is_empty() {
    out.push_str(&export_clause(&pairs));
  }
  out
}

fn server_proxy_module(config: &BuildConfig, id: &str, scan: &ModuleScan) -> String {
  let mut out = format!(
    "import {{ createServerReference, callServer }} from {};\n",
    json_str(&config.runtime.client)
  );
  let mut pairs = Vec::new();
  for (i, export) in scan.exports.iter().enumerate() {
    let local = format!("$$server_ref_{i}");
    let _ = writeln!(
      out,
      "const {local} = createServerReference({}, callServer);",
      json_str(&format!("{id}#{}", export.exported))
    );
    pairs.push((local, export.exported.clone()));
  }
  if !pairs.is_empty() {
    out.push_str(&export_clause(&pairs));
  }
  out
}

fn server_registration_module(
  config: &BuildConfig,
  id: &str,
  path: &Path,
  source: &str,
  scan: &ModuleScan,
) -> String {
  let mut out = String::with_capacity(source.len() + 256);
  out.push_str(source);
  if !source.ends_with('\n') {
    out.push('\n');
  }
  let _ = writeln!(
    out,
    "import {{ registerServerReference as $$register }} from {};",
    json_str(&config.runtime.server)
  );
  for export in &scan.exports {
    let Some(local) = &export.local else {
      tracing::warn!(
        module = %path.display(),
        export = %export.exported,
        "server export has no local binding; not registered"
      );
      continue;
    };
    let _ = writeln!(out, "$$register({local}, {}, {});", json_str(id), json_str(&export.exported));
  }
  out
}
