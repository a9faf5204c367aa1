/* src/build/core/src/scan.rs */

// Syntactic module scan: directive prologue, exported bindings, static imports.
// Parses only; nothing is resolved, type-checked or executed.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
  BindingPattern, Declaration, ExportDefaultDeclarationKind, ModuleExportName, Statement,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Module-level boundary marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
  Client,
  Server,
}

impl Boundary {
  pub fn directive(self) -> &'static str {
    match self {
      Self::Client => "use client",
      Self::Server => "use server",
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Client => "client",
      Self::Server => "server",
    }
  }
}

/// One exported name and, when it is a local binding, the local it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
  pub exported: String,
  pub local: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleScan {
  pub boundary: Option<Boundary>,
  pub exports: Vec<ExportBinding>,
  /// Sources of `export * from "..."` without a namespace name.
  pub star_exports: Vec<String>,
  /// Static import / re-export specifiers in source order.
  pub imports: Vec<String>,
}

impl ModuleScan {
  pub fn export_names(&self) -> Vec<String> {
    self.exports.iter().map(|e| e.exported.clone()).collect()
  }

  pub fn has_export(&self, name: &str) -> bool {
    self.exports.iter().any(|e| e.exported == name)
  }
}

/// Produces the top-level export names of a module from its source text.
pub trait ExportLister: Send + Sync {
  fn list_exports(&self, path: &Path, source: &str) -> Result<Vec<String>>;
}

/// Default lister backed by [`scan_module`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OxcExportLister;

impl ExportLister for OxcExportLister {
  fn list_exports(&self, path: &Path, source: &str) -> Result<Vec<String>> {
    Ok(scan_module(path, source)?.export_names())
  }
}

fn source_type_for(path: &Path) -> SourceType {
  SourceType::from_path(path)
    .unwrap_or_else(|_| SourceType::default().with_typescript(true).with_jsx(true))
    .with_module(true)
}

pub fn scan_module(path: &Path, source: &str) -> Result<ModuleScan> {
  let module = path.to_string_lossy();
  let allocator = Allocator::default();
  let ret = Parser::new(&allocator, source, source_type_for(path)).parse();
  if ret.panicked || !ret.errors.is_empty() {
    let message = ret
      .errors
      .first()
      .map_or_else(|| "parser aborted".to_string(), ToString::to_string);
    return Err(BuildError::transform(module, message));
  }
  let program = ret.program;

  let mut scan = ModuleScan::default();

  for directive in &program.directives {
    let marker = match directive.directive.as_str() {
      "use client" => Boundary::Client,
      "use server" => Boundary::Server,
      _ => continue,
    };
    match scan.boundary {
      Some(existing) if existing != marker => {
        return Err(BuildError::transform(
          module,
          "module declares both \"use client\" and \"use server\"",
        ));
      }
      _ => scan.boundary = Some(marker),
    }
  }

  for stmt in &program.body {
    match stmt {
      Statement::ImportDeclaration(decl) => {
        if !decl.import_kind.is_type() {
          scan.imports.push(decl.source.value.to_string());
        }
      }
      Statement::ExportNamedDeclaration(decl) => {
        if decl.export_kind.is_type() {
          continue;
        }
        if let Some(source) = &decl.source {
          scan.imports.push(source.value.to_string());
        }
        if let Some(declaration) = &decl.declaration {
          collect_declaration(declaration, &mut scan.exports);
        }
        for spec in &decl.specifiers {
          if spec.export_kind.is_type() {
            continue;
          }
          let local = if decl.source.is_some() { None } else { Some(export_name(&spec.local)) };
          scan.exports.push(ExportBinding { exported: export_name(&spec.exported), local });
        }
      }
      Statement::ExportDefaultDeclaration(decl) => {
        let local = match &decl.declaration {
          ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
            func.id.as_ref().map(|id| id.name.to_string())
          }
          ExportDefaultDeclarationKind::ClassDeclaration(class) => {
            class.id.as_ref().map(|id| id.name.to_string())
          }
          ExportDefaultDeclarationKind::Identifier(ident) => Some(ident.name.to_string()),
          _ => None,
        };
        scan.exports.push(ExportBinding { exported: "default".to_string(), local });
      }
      Statement::ExportAllDeclaration(decl) => {
        if decl.export_kind.is_type() {
          continue;
        }
        let source = decl.source.value.to_string();
        match &decl.exported {
          Some(name) => scan.exports.push(ExportBinding { exported: export_name(name), local: None }),
          None => scan.star_exports.push(source.clone()),
        }
        scan.imports.push(source);
      }
      _ => {}
    }
  }

  Ok(scan)
}

fn export_name(name: &ModuleExportName) -> String {
  match name {
    ModuleExportName::IdentifierName(id) => id.name.to_string(),
    ModuleExportName::IdentifierReference(id) => id.name.to_string(),
    ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
  }
}

fn collect_declaration(declaration: &Declaration, out: &mut Vec<ExportBinding>) {
  let mut push = |name: String| out.push(ExportBinding { exported: name.clone(), local: Some(name) });
  match declaration {
    Declaration::VariableDeclaration(var) => {
      let mut names = Vec::new();
      for decl in &var.declarations {
        collect_binding_pattern(&decl.id, &mut names);
      }
      for name in names {
        push(name);
      }
    }
    Declaration::FunctionDeclaration(func) => {
      if let Some(id) = &func.id {
        push(id.name.to_string());
      }
    }
    Declaration::ClassDeclaration(class) => {
      if let Some(id) = &class.id {
        push(id.name.to_string());
      }
    }
    Declaration::TSEnumDeclaration(decl) => push(decl.id.name.to_string()),
    // type aliases, interfaces and ambient declarations have no runtime value
    _ => {}
  }
}

fn collect_binding_pattern(pattern: &BindingPattern, names: &mut Vec<String>) {
  match pattern {
    BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
    BindingPattern::ObjectPattern(obj) => {
      for prop in &obj.properties {
        collect_binding_pattern(&prop.value, names);
      }
      if let Some(rest) = &obj.rest {
        collect_binding_pattern(&rest.argument, names);
      }
    }
    BindingPattern::ArrayPattern(arr) => {
      for pattern in arr.elements.iter().flatten() {
        collect_binding_pattern(pattern, names);
      }
      if let Some(rest) = &arr.rest {
        collect_binding_pattern(&rest.argument, names);
      }
    }
    BindingPattern::AssignmentPattern(assign) => collect_binding_pattern(&assign.left, names),
  }
}
