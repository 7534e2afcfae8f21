//! Sub-bundler driver: tree-shaking and import closure (§4.2)
//!
//! Walks the derivative program's top-level statements, keeps only the ones
//! reachable by free-variable reference from the required `__severed_css_<i>`
//! exports, and recurses into whatever the host resolver hands back for the
//! imports those surviving statements still need. The result is a closed
//! module-id → tree-shaken-source map, handed to the evaluator as a unit.
//!
//! Reachability here is a conservative over-approximation: "referenced
//! names" is every identifier reference anywhere in a kept statement's
//! subtree, not a scope-resolved free-variable set. A shadowed local that
//! happens to share a name with an unrelated top-level binding can keep that
//! binding alive unnecessarily; it can never cause a binding the evaluator
//! actually needs to be dropped. See DESIGN.md.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, BindingPatternKind, Class, Declaration, Function, IdentifierReference,
    ImportDeclaration, ImportDeclarationSpecifier, Statement, VariableDeclaration,
};
use oxc_ast_visit::Visit;
use oxc_parser::{Parser, ParserReturn};
use oxc_span::{GetSpan, SourceType};

use crate::error::{Result, SeveredError};
use tracing::{error, warn};

/// Host-supplied module resolution, mirroring the out-of-scope bundler
/// resolver the file coordinator is handed (§9, "reusing the host's
/// resolver inside the sub-bundler").
pub trait Resolver {
    /// Resolves `specifier` as imported from `importer`, returning a module
    /// id the sub-bundler can pass to `load`, or `None` if the host declines
    /// (treated as a non-fatal external import, left unresolved).
    fn resolve(&self, specifier: &str, importer: &str) -> Option<String>;

    /// Loads the source text for a previously resolved module id.
    fn load(&self, id: &str) -> Option<String>;
}

/// The closed set of tree-shaken module sources reachable from the entry,
/// standing in for "a single CommonJS-style script" (see DESIGN.md).
///
/// `edges` records, per importer id, which `(specifier, resolved id)` pairs
/// it walked into — the evaluator's linker (§4.3) needs this to know which
/// wrapped module a given import statement refers to; `bundle` itself only
/// needs the resolved id to recurse.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub entry: String,
    pub modules: IndexMap<String, String>,
    pub edges: HashMap<String, Vec<(String, String)>>,
}

const WILDCARD: &str = "*";

/// Builds the closed, tree-shaken module graph for `entry_source`, keeping
/// only what `required_exports` transitively needs.
pub fn bundle(entry_id: &str, entry_source: &str, required_exports: &[String], resolver: &dyn Resolver) -> Result<Bundle> {
    let mut modules = IndexMap::new();
    let mut edges = HashMap::new();
    let mut visited = HashSet::new();
    bundle_module(entry_id, entry_source, required_exports, resolver, &mut modules, &mut edges, &mut visited)?;
    Ok(Bundle {
        entry: entry_id.to_string(),
        modules,
        edges,
    })
}

fn bundle_module(
    id: &str,
    source: &str,
    required_exports: &[String],
    resolver: &dyn Resolver,
    modules: &mut IndexMap<String, String>,
    edges: &mut HashMap<String, Vec<(String, String)>>,
    visited: &mut HashSet<String>,
) -> Result<()> {
    if !visited.insert(id.to_string()) {
        return Ok(());
    }

    let allocator = Allocator::default();
    let ParserReturn { program, errors, panicked, .. } =
        Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();

    if panicked || !errors.is_empty() {
        error!(id, "derivative program failed to parse during bundling");
        return Err(SeveredError::Bundle {
            id: id.to_string(),
            message: "derivative program failed to parse".to_string(),
        });
    }

    let statements: Vec<&Statement<'_>> = program.body.iter().collect();
    let declared: Vec<Vec<String>> = statements.iter().map(|s| declared_top_level_names(s)).collect();
    let referenced: Vec<HashSet<String>> = statements.iter().map(|s| referenced_names(s)).collect();
    let imports: Vec<Option<(String, Vec<String>)>> = statements.iter().map(|s| import_info(s)).collect();

    let keep_all = required_exports.iter().any(|n| n == WILDCARD);
    let mut required: HashSet<String> = required_exports.iter().cloned().collect();
    let mut keep = vec![keep_all; statements.len()];

    if !keep_all {
        loop {
            let mut changed = false;
            for i in 0..statements.len() {
                if keep[i] {
                    continue;
                }
                if declared[i].iter().any(|name| required.contains(name)) {
                    keep[i] = true;
                    changed = true;
                    for name in &referenced[i] {
                        if required.insert(name.clone()) {
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    let mut kept_text = String::new();
    let mut needed_imports: Vec<(String, Vec<String>)> = Vec::new();
    for (i, stmt) in statements.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        let span = stmt.span();
        kept_text.push_str(&source[span.start as usize..span.end as usize]);
        kept_text.push('\n');
        if let Some((specifier, names)) = &imports[i] {
            needed_imports.push((specifier.clone(), names.clone()));
        }
    }

    modules.insert(id.to_string(), kept_text);

    for (specifier, imported_names) in needed_imports {
        if !is_internal_specifier(&specifier) {
            continue; // bare package specifier: left for the evaluator's own module loader
        }
        let Some(resolved_id) = resolver.resolve(&specifier, id) else {
            warn!(importer = id, specifier = specifier.as_str(), "resolver declined, leaving import unresolved");
            continue; // host declined to resolve; non-fatal (§7, "host resolver miss")
        };
        if resolved_id.ends_with(".css") {
            continue; // external asset, never walked
        }
        let child_source = resolver.load(&resolved_id).ok_or_else(|| {
            error!(importer = id, specifier = specifier.as_str(), resolved = resolved_id.as_str(), "resolver resolved an id it then refused to load");
            SeveredError::Resolve {
                specifier: specifier.clone(),
                importer: id.to_string(),
            }
        })?;
        edges
            .entry(id.to_string())
            .or_default()
            .push((specifier.clone(), resolved_id.clone()));
        bundle_module(&resolved_id, &child_source, &imported_names, resolver, modules, edges, visited)?;
    }

    Ok(())
}

pub(crate) fn is_internal_specifier(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/')
}

pub(crate) fn declared_top_level_names(stmt: &Statement<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match stmt {
        Statement::VariableDeclaration(decl) => collect_variable_declaration_names(decl, &mut names),
        Statement::FunctionDeclaration(func) => collect_function_name(func, &mut names),
        Statement::ClassDeclaration(class) => collect_class_name(class, &mut names),
        Statement::ImportDeclaration(decl) => collect_import_local_names(decl, &mut names),
        Statement::ExportNamedDeclaration(decl) => {
            if let Some(inner) = &decl.declaration {
                match inner {
                    Declaration::VariableDeclaration(d) => collect_variable_declaration_names(d, &mut names),
                    Declaration::FunctionDeclaration(f) => collect_function_name(f, &mut names),
                    Declaration::ClassDeclaration(c) => collect_class_name(c, &mut names),
                    _ => {}
                }
            }
        }
        // A default export is always reachable under the name `"default"`,
        // matching the import-specifier name `evaluator.rs` uses for a
        // default import and the local name it binds that module's
        // `.default` property to.
        Statement::ExportDefaultDeclaration(_) => names.push("default".to_string()),
        _ => {}
    }
    names
}

fn collect_variable_declaration_names(decl: &VariableDeclaration<'_>, out: &mut Vec<String>) {
    for declarator in &decl.declarations {
        collect_binding_names(&declarator.id, out);
    }
}

fn collect_function_name(func: &Function<'_>, out: &mut Vec<String>) {
    if let Some(id) = &func.id {
        out.push(id.name.to_string());
    }
}

fn collect_class_name(class: &Class<'_>, out: &mut Vec<String>) {
    if let Some(id) = &class.id {
        out.push(id.name.to_string());
    }
}

fn collect_import_local_names(decl: &ImportDeclaration<'_>, out: &mut Vec<String>) {
    let Some(specifiers) = &decl.specifiers else {
        return;
    };
    for specifier in specifiers.iter() {
        let name = match specifier {
            ImportDeclarationSpecifier::ImportSpecifier(s) => s.local.name.to_string(),
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => s.local.name.to_string(),
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => s.local.name.to_string(),
        };
        out.push(name);
    }
}

fn collect_binding_names(pattern: &BindingPattern<'_>, out: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => out.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, out);
            }
        }
        BindingPatternKind::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_names(elem, out);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, out);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => collect_binding_names(&assign.left, out),
    }
}

/// The exported names (or local names, for a default/namespace import) a
/// statement imports, plus its source specifier. `None` for non-import
/// statements.
pub(crate) fn import_info(stmt: &Statement<'_>) -> Option<(String, Vec<String>)> {
    let Statement::ImportDeclaration(decl) = stmt else {
        return None;
    };
    let source = decl.source.value.to_string();
    let mut names = Vec::new();
    if let Some(specifiers) = &decl.specifiers {
        for specifier in specifiers.iter() {
            match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => names.push(s.imported.name().to_string()),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(_) => names.push("default".to_string()),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => names.push(WILDCARD.to_string()),
            }
        }
    }
    Some((source, names))
}

#[derive(Default)]
struct ReferenceCollector {
    names: HashSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        self.names.insert(it.name.to_string());
    }
}

fn referenced_names(stmt: &Statement<'_>) -> HashSet<String> {
    let mut collector = ReferenceCollector::default();
    collector.visit_statement(stmt);
    collector.names
}
