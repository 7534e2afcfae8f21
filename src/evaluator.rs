//! Evaluator: links the sub-bundler's module graph into one script and
//! executes it in-process via an embedded ECMAScript engine (§4.3)
//!
//! The sub-bundler (§4.2) hands back a *graph* of tree-shaken module
//! sources, not a single script — real import/export linkage across that
//! graph is resolved here, at the last possible moment, because this is the
//! one place that actually runs an ECMAScript engine and can therefore ask
//! it to parse and hold real values. Linking rewrites every surviving
//! `import` statement into a plain `const` binding pulled out of an IIFE
//! that stands in for its module, in dependency order, so the whole graph
//! becomes the "single CommonJS-style script" the distilled spec describes
//! (see DESIGN.md for why the sub-bundler itself stops short of producing
//! that text directly).
//!
//! Bare package specifiers that survive tree-shaking are resolved lazily,
//! right here, by asking the same [`crate::shaker::Resolver`] the
//! sub-bundler used — mirroring §9's "reusing the host's resolver inside
//! the sub-bundler" note, extended to the evaluator's own module loading.

use std::collections::{HashMap, HashSet};

use boa_engine::{Context, Source};
use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclarationSpecifier, ModuleExportName, Statement};
use oxc_parser::{Parser, ParserReturn};
use oxc_span::{GetSpan, SourceType};

use tracing::error;

use crate::editor::TextEditor;
use crate::error::{Result, SeveredError};
use crate::options::SITE_EXPORT_PREFIX;
use crate::shaker::{self, Bundle, Resolver};

/// A dynamic site's evaluated CSS text, keyed by site index.
pub type EvaluatedValues = HashMap<usize, String>;

/// Links `bundle` and runs it, harvesting the export named
/// `__severed_css_<i>` for every `i` in `required_indices` as a string.
///
/// `id` is the original source file id; it is used only for error messages,
/// matching the failure-message grammar in §4.3/§7.
pub fn evaluate(id: &str, bundle: &Bundle, resolver: &dyn Resolver, required_indices: &[usize]) -> Result<EvaluatedValues> {
    let script = link(id, bundle, resolver, required_indices)?;

    let mut context = Context::default();
    let result = context.eval(Source::from_bytes(script.as_bytes())).map_err(|err| {
        error!(id, %err, "script evaluation failed");
        SeveredError::Eval {
            id: id.to_string(),
            message: err.to_string(),
        }
    })?;

    let object = result.as_object().ok_or_else(|| {
        error!(id, "evaluation did not produce the expected export object");
        SeveredError::Eval {
            id: id.to_string(),
            message: "evaluation did not produce the expected export object".to_string(),
        }
    })?;

    let mut values = EvaluatedValues::new();
    for &index in required_indices {
        let key = format!("{SITE_EXPORT_PREFIX}{index}");
        let value = object.get(key.as_str(), &mut context).map_err(|err| {
            error!(id, site_index = index, %err, "reading a site's export failed");
            SeveredError::Eval {
                id: id.to_string(),
                message: err.to_string(),
            }
        })?;
        let text = value.as_string().ok_or_else(|| {
            error!(id, site_index = index, "site export did not evaluate to a string");
            SeveredError::Type {
                id: id.to_string(),
                site_index: index,
            }
        })?;
        values.insert(index, text.to_std_string_escaped());
    }

    Ok(values)
}

/// Links `bundle`'s module graph into a single self-contained script text
/// ending in an object-literal expression collecting every surviving
/// `__severed_css_<i>` binding, so [`evaluate`]'s single `Context::eval`
/// call both runs the program and returns the values to harvest.
fn link(id: &str, bundle: &Bundle, resolver: &dyn Resolver, required_indices: &[usize]) -> Result<String> {
    let mut ctx = LinkCtx {
        modules: bundle.modules.clone(),
        edges: bundle.edges.clone(),
        resolver,
        var_names: HashMap::new(),
        in_progress: HashSet::new(),
        script: String::new(),
        next_var: 0,
    };

    ctx.emit_entry(&bundle.entry, id)?;

    let harvest = required_indices
        .iter()
        .map(|i| format!("{SITE_EXPORT_PREFIX}{i}: {SITE_EXPORT_PREFIX}{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    ctx.script.push_str(&format!("({{ {harvest} }});\n"));

    Ok(ctx.script)
}

struct LinkCtx<'a> {
    modules: IndexMap<String, String>,
    edges: HashMap<String, Vec<(String, String)>>,
    resolver: &'a dyn Resolver,
    /// Module id → the `__severed_mod_<n>` const it was wrapped into.
    var_names: HashMap<String, String>,
    /// Guards against infinite recursion on import cycles; a module whose
    /// wrapper is still being built resolves to a forward reference instead
    /// of being revisited (documented as implementation-defined in §9).
    in_progress: HashSet<String>,
    script: String,
    next_var: usize,
}

impl<'a> LinkCtx<'a> {
    /// Emits every non-entry module this one needs as wrapped IIFEs, then
    /// the entry's own body directly at top level (so its bindings end up
    /// as plain script globals). [`link`] appends the final harvesting
    /// expression afterwards, once it knows which indices the caller needs.
    fn emit_entry(&mut self, entry_id: &str, file_id: &str) -> Result<()> {
        let source = self.module_source(entry_id, file_id)?;
        let (body, _exports) = self.process_module(entry_id, &source, file_id)?;
        self.script.push_str(&body);
        self.script.push('\n');
        Ok(())
    }

    fn module_source(&self, module_id: &str, file_id: &str) -> Result<String> {
        self.modules.get(module_id).cloned().ok_or_else(|| {
            error!(id = file_id, module_id, "no source recorded for module during linking");
            SeveredError::Bundle {
                id: file_id.to_string(),
                message: format!("no source recorded for module `{module_id}`"),
            }
        })
    }

    /// Ensures `module_id` is wrapped and returns the const name bound to
    /// its exports object, emitting the wrapper first if this is the first
    /// reference.
    fn emit_wrapped(&mut self, module_id: &str, file_id: &str) -> Result<String> {
        if let Some(existing) = self.var_names.get(module_id) {
            return Ok(existing.clone());
        }
        if !self.in_progress.insert(module_id.to_string()) {
            // Cyclic import: hand back the name before the wrapper exists.
            let var_name = format!("__severed_mod_{}", self.next_var);
            self.next_var += 1;
            self.var_names.insert(module_id.to_string(), var_name.clone());
            return Ok(var_name);
        }

        let source = self.module_source(module_id, file_id)?;
        let (body, exports) = self.process_module(module_id, &source, file_id)?;

        // A cyclic import may have already assigned this module a name
        // while `process_module` was still running (one of its own
        // children imported it back).
        let var_name = match self.var_names.get(module_id) {
            Some(existing) => existing.clone(),
            None => {
                let name = format!("__severed_mod_{}", self.next_var);
                self.next_var += 1;
                name
            }
        };

        let object_literal = exports
            .iter()
            .map(|(exported, local)| format!("{exported}: {local}"))
            .collect::<Vec<_>>()
            .join(", ");

        self.script.push_str(&format!(
            "const {var_name} = (function() {{\n{body}\nreturn {{ {object_literal} }};\n}})();\n"
        ));
        self.var_names.insert(module_id.to_string(), var_name.clone());
        self.in_progress.remove(module_id);
        Ok(var_name)
    }

    /// Resolves a bare specifier lazily against `resolver`, merging whatever
    /// it loads into the local module graph so it can be wrapped the same
    /// way as a shaker-walked one. Returns `None` if the host declines,
    /// which the caller turns into a throwing stub (§7, "host resolver
    /// miss").
    fn resolve_external(&mut self, specifier: &str, importer_id: &str, imported_names: &[String]) -> Option<String> {
        let resolved_id = self.resolver.resolve(specifier, importer_id)?;
        if resolved_id.ends_with(".css") {
            return None;
        }
        if !self.modules.contains_key(&resolved_id) {
            let source = self.resolver.load(&resolved_id)?;
            let names: Vec<String> = if imported_names.is_empty() {
                vec!["*".to_string()]
            } else {
                imported_names.to_vec()
            };
            let extra = shaker::bundle(&resolved_id, &source, &names, self.resolver).ok()?;
            for (id, text) in extra.modules {
                self.modules.entry(id).or_insert(text);
            }
            for (importer, list) in extra.edges {
                self.edges.entry(importer).or_default().extend(list);
            }
        }
        Some(resolved_id)
    }

    /// Rewrites `source`'s import statements into local const bindings and
    /// strips its export wrappers, returning the processed body text plus
    /// the `(exported name, local name)` pairs this module makes available
    /// to whatever imports it.
    fn process_module(&mut self, module_id: &str, source: &str, file_id: &str) -> Result<(String, Vec<(String, String)>)> {
        let allocator = Allocator::default();
        let ParserReturn { program, errors, panicked, .. } =
            Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();
        if panicked || !errors.is_empty() {
            error!(id = file_id, module_id, "module failed to parse during linking");
            return Err(SeveredError::Bundle {
                id: file_id.to_string(),
                message: format!("module `{module_id}` failed to parse during linking"),
            });
        }

        let module_edges: HashMap<String, String> = self
            .edges
            .get(module_id)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default();

        let mut editor = TextEditor::new(source);
        let mut exports: Vec<(String, String)> = Vec::new();
        let mut synthetic = 0usize;

        for stmt in program.body.iter() {
            let span = stmt.span();
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    let specifier = decl.source.value.to_string();
                    let imported_names: Vec<String> = decl
                        .specifiers
                        .as_ref()
                        .map(|specs| {
                            specs
                                .iter()
                                .map(|s| match s {
                                    ImportDeclarationSpecifier::ImportSpecifier(s) => s.imported.name().to_string(),
                                    ImportDeclarationSpecifier::ImportDefaultSpecifier(_) => "default".to_string(),
                                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => "*".to_string(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();

                    let resolved = module_edges.get(&specifier).cloned().or_else(|| {
                        if shaker::is_internal_specifier(&specifier) {
                            None
                        } else {
                            self.resolve_external(&specifier, module_id, &imported_names)
                        }
                    });

                    let replacement = match resolved {
                        Some(resolved_id) => {
                            let var_name = self.emit_wrapped(&resolved_id, file_id)?;
                            import_replacement(decl, &var_name)
                        }
                        None => format!(
                            "const {{}} = (function() {{ throw new Error(\"could not resolve module '{specifier}'\"); }})();\n"
                        ),
                    };
                    editor.replace(span.start..span.end, replacement);
                }
                Statement::ExportNamedDeclaration(decl) => {
                    if let Some(inner) = &decl.declaration {
                        let names = shaker::declared_top_level_names(stmt);
                        for name in names {
                            exports.push((name.clone(), name));
                        }
                        editor.replace(span.start..inner.span().start, String::new());
                    } else {
                        for specifier in decl.specifiers.iter() {
                            let local = module_export_name_text(&specifier.local);
                            let exported = module_export_name_text(&specifier.exported);
                            exports.push((exported, local));
                        }
                        editor.replace(span.start..span.end, String::new());
                    }
                }
                Statement::ExportDefaultDeclaration(decl) => {
                    let payload_start = decl.declaration.span().start;
                    editor.replace(span.start..payload_start, String::new());
                    if let Some(name) = default_declaration_name(stmt) {
                        exports.push(("default".to_string(), name));
                    } else {
                        let synthetic_name = format!("__severed_default_{synthetic}");
                        synthetic += 1;
                        editor.insert(payload_start, format!("const {synthetic_name} = "));
                        editor.insert(span.end, "\n");
                        exports.push(("default".to_string(), synthetic_name));
                    }
                }
                Statement::ExportAllDeclaration(_) => {
                    // Transitive re-export forwarding is not exercised by the
                    // reference implementation; dropped here too (§9).
                    editor.replace(span.start..span.end, String::new());
                }
                _ => {}
            }
        }

        Ok((editor.apply(), exports))
    }
}

fn module_export_name_text(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

/// The bound local name of an `export default <declaration>` payload, when
/// the declaration is a named function or class; `None` for an expression
/// or an anonymous function/class, which need a synthetic binding instead.
fn default_declaration_name(stmt: &Statement<'_>) -> Option<String> {
    let Statement::ExportDefaultDeclaration(decl) = stmt else {
        return None;
    };
    use oxc_ast::ast::ExportDefaultDeclarationKind;
    match &decl.declaration {
        ExportDefaultDeclarationKind::FunctionDeclaration(f) => f.id.as_ref().map(|id| id.name.to_string()),
        ExportDefaultDeclarationKind::ClassDeclaration(c) => c.id.as_ref().map(|id| id.name.to_string()),
        _ => None,
    }
}

fn import_replacement(decl: &oxc_ast::ast::ImportDeclaration<'_>, module_var: &str) -> String {
    let Some(specifiers) = &decl.specifiers else {
        return String::new();
    };

    let mut lines = Vec::new();
    let mut named: Vec<String> = Vec::new();

    for specifier in specifiers.iter() {
        match specifier {
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                lines.push(format!("const {} = {}.default;", s.local.name, module_var));
            }
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                lines.push(format!("const {} = {};", s.local.name, module_var));
            }
            ImportDeclarationSpecifier::ImportSpecifier(s) => {
                let imported = s.imported.name();
                let local = s.local.name;
                if imported == local {
                    named.push(imported.to_string());
                } else {
                    named.push(format!("{imported}: {local}"));
                }
            }
        }
    }

    if !named.is_empty() {
        lines.push(format!("const {{ {} }} = {};", named.join(", "), module_var));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaker::{self, Resolver as _};

    struct NoopResolver;
    impl Resolver for NoopResolver {
        fn resolve(&self, _specifier: &str, _importer: &str) -> Option<String> {
            None
        }
        fn load(&self, _id: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn evaluates_simple_template() {
        let source = "const color = 'purple';\nexport const __severed_css_0 = `background: ${color}`;\n";
        let bundle = shaker::bundle("entry.js", source, &["__severed_css_0".to_string()], &NoopResolver).unwrap();
        let values = evaluate("entry.js", &bundle, &NoopResolver, &[0]).unwrap();
        assert_eq!(values[&0], "background: purple");
    }

    #[test]
    fn evaluates_function_call_result() {
        let source = "function helper() { return 'red'; }\nexport const __severed_css_0 = `color: ${helper()};`;\n";
        let bundle = shaker::bundle("entry.js", source, &["__severed_css_0".to_string()], &NoopResolver).unwrap();
        let values = evaluate("entry.js", &bundle, &NoopResolver, &[0]).unwrap();
        assert_eq!(values[&0], "color: red;");
    }

    #[test]
    fn undefined_identifier_surfaces_as_eval_error() {
        let source = "export const __severed_css_0 = `color: ${undeclaredThing}`;\n";
        let bundle = shaker::bundle("entry.js", source, &["__severed_css_0".to_string()], &NoopResolver).unwrap();
        let err = evaluate("entry.js", &bundle, &NoopResolver, &[0]).unwrap_err();
        assert!(matches!(err, SeveredError::Eval { .. }));
    }

    #[test]
    fn non_string_export_is_a_type_error() {
        let source = "export const __severed_css_0 = 42;\n";
        let bundle = shaker::bundle("entry.js", source, &["__severed_css_0".to_string()], &NoopResolver).unwrap();
        let err = evaluate("entry.js", &bundle, &NoopResolver, &[0]).unwrap_err();
        assert!(matches!(err, SeveredError::Type { site_index: 0, .. }));
    }

    #[test]
    fn multiple_sites_evaluate_independently() {
        let source = "export const __severed_css_0 = `a`;\nexport const __severed_css_1 = `b`;\n";
        let bundle = shaker::bundle(
            "entry.js",
            source,
            &["__severed_css_0".to_string(), "__severed_css_1".to_string()],
            &NoopResolver,
        )
        .unwrap();
        let values = evaluate("entry.js", &bundle, &NoopResolver, &[0, 1]).unwrap();
        assert_eq!(values[&0], "a");
        assert_eq!(values[&1], "b");
    }
}
