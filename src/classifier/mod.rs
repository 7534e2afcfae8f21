//! AST walk: site discovery and derivative-program construction (§4.1)
//!
//! `classify` is the only place that touches the oxc AST. It parses once,
//! walks the program with [`Collector`] to record every `css`…`` occurrence
//! and every call expression, then reduces that into [`ClassifyOutput`]:
//! owned, allocator-independent data the rest of the pipeline works with.
//! The derivative program text itself is assembled lazily, since files with
//! no dynamic sites never need it (§4.2's static fast path).

mod derivative;

use std::collections::HashMap;
use std::ops::Range;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    CallExpression, Expression, ExportDefaultDeclarationKind, Program, Statement,
    TaggedTemplateExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{Parser, ParserReturn};
use oxc_span::{GetSpan, SourceType};
use tracing::error;

use crate::editor::{Edit, TextEditor};
use crate::error::{Result, SeveredError};
use crate::options::SENTINEL_LITERAL;
use crate::site::{ExtractionSite, SiteKind, SiteList};

/// The tag name that marks a template literal as a CSS extraction site.
const CSS_TAG: &str = "css";

/// Parses `source_text` and collects every extraction site plus everything
/// needed to build the derivative program on demand.
pub fn classify<'a>(id: &str, source_text: &'a str, source_type: SourceType) -> Result<ClassifyOutput<'a>> {
    let allocator = Allocator::default();
    let ParserReturn { program, errors, panicked, .. } =
        Parser::new(&allocator, source_text, source_type).parse();

    if panicked || !errors.is_empty() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        error!(id, %message, "parse failed");
        return Err(SeveredError::Parse {
            id: id.to_string(),
            message,
        });
    }

    let mut collector = Collector::default();
    collector.visit_program(&program);

    let mut sites = SiteList::default();
    let mut quasi_ranges = Vec::with_capacity(collector.sites.len());
    let mut hoist_points = Vec::with_capacity(collector.sites.len());

    for (index, found) in collector.sites.into_iter().enumerate() {
        let hoist_point = enclosing_top_level_start(&program, found.full_range.start);
        sites.sites.push(ExtractionSite {
            range: found.full_range,
            index,
            kind: found.kind,
            class_name: None,
        });
        quasi_ranges.push(found.quasi_range);
        hoist_points.push(hoist_point);
    }

    let prefix_edits = program
        .body
        .iter()
        .map(statement_prefix_edit)
        .collect::<Vec<_>>();

    Ok(ClassifyOutput {
        source_text,
        sites,
        quasi_ranges,
        hoist_points,
        prefix_edits,
        call_points: collector.call_points,
    })
}

/// Owned result of [`classify`]: sites plus the raw ingredients for
/// [`ClassifyOutput::build_derivative_program`].
pub struct ClassifyOutput<'a> {
    source_text: &'a str,
    pub sites: SiteList,
    quasi_ranges: Vec<Range<u32>>,
    hoist_points: Vec<u32>,
    prefix_edits: Vec<Edit>,
    call_points: Vec<u32>,
}

impl<'a> ClassifyOutput<'a> {
    /// Assembles the derivative program (§4.1, §4.2): every site's
    /// tag-plus-template overwritten with the sentinel literal, a hoisted
    /// `export const __severed_css_<i> = ...;` binding per site inserted
    /// before its enclosing top-level statement, exports stripped per the
    /// rules below, and every call expression pure-annotated.
    ///
    /// Callers should only pay for this when `sites.any_dynamic()`; a
    /// file with only static sites never needs a derivative program.
    pub fn build_derivative_program(&self) -> String {
        let mut hoisted_by_point: HashMap<u32, String> = HashMap::new();
        for ((site, quasi_range), &hoist_point) in self
            .sites
            .sites
            .iter()
            .zip(self.quasi_ranges.iter())
            .zip(self.hoist_points.iter())
        {
            let initializer =
                derivative::slice_with_pure_annotations(self.source_text, quasi_range.clone(), &self.call_points);
            let decl = format!("export const {} = {};\n", site.export_name(), initializer);
            hoisted_by_point.entry(hoist_point).or_default().push_str(&decl);
        }

        let mut editor = TextEditor::new(self.source_text);

        for edit in &self.prefix_edits {
            let hoisted = hoisted_by_point.get(&edit.range.start).cloned().unwrap_or_default();
            let replacement = format!("{hoisted}{}", edit.replacement);
            if edit.range.start != edit.range.end || !replacement.is_empty() {
                editor.replace(edit.range.clone(), replacement);
            }
        }

        for site in self.sites.sites.iter() {
            editor.replace(site.range.clone(), SENTINEL_LITERAL);
        }

        for &call_start in &self.call_points {
            let inside_site = self
                .sites
                .sites
                .iter()
                .any(|s| s.range.start <= call_start && call_start < s.range.end);
            if !inside_site {
                editor.insert(call_start, "/* @__PURE__ */");
            }
        }

        editor.apply()
    }
}

/// A `css`…`` occurrence as discovered during the walk, before it is
/// assigned its source-order index.
struct FoundSite {
    full_range: Range<u32>,
    quasi_range: Range<u32>,
    kind: SiteKind,
}

#[derive(Default)]
struct Collector {
    sites: Vec<FoundSite>,
    call_points: Vec<u32>,
}

impl<'a> Visit<'a> for Collector {
    fn visit_tagged_template_expression(&mut self, it: &TaggedTemplateExpression<'a>) {
        if is_css_tag(&it.tag) {
            let quasi_range = it.quasi.span.start..it.quasi.span.end;
            let kind = if it.quasi.expressions.is_empty() {
                let raw = it
                    .quasi
                    .quasis
                    .first()
                    .map(|q| q.value.raw.to_string())
                    .unwrap_or_default();
                SiteKind::Static(raw)
            } else {
                SiteKind::Dynamic
            };
            self.sites.push(FoundSite {
                full_range: it.span.start..it.span.end,
                quasi_range,
                kind,
            });
        }
        walk::walk_tagged_template_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        self.call_points.push(it.span.start);
        walk::walk_call_expression(self, it);
    }
}

fn is_css_tag(tag: &Expression<'_>) -> bool {
    matches!(tag, Expression::Identifier(ident) if ident.name == CSS_TAG)
}

/// Start offset of the `program.body` entry that contains `offset`.
fn enclosing_top_level_start(program: &Program<'_>, offset: u32) -> u32 {
    program
        .body
        .iter()
        .map(|stmt| stmt.span())
        .filter(|span| span.start <= offset)
        .map(|span| span.start)
        .last()
        .unwrap_or(offset)
}

/// The text-range edit that strips a top-level statement's `export`
/// wrapper, keeping its declaration (§4.1's four export-handling rules):
///
/// - `export const x = ...;` / `export function f() {}` / `export class C {}`
///   → strip the `export` keyword, keep the declaration.
/// - `export default <declaration-or-expression>;` → strip `export default`,
///   keep the payload.
/// - `export { a, b };` (no attached declaration) → remove entirely.
/// - `export * from './x';` / `export * as ns from './x';` → remove entirely.
///
/// Non-export statements get a zero-width edit at their own start, which
/// only matters as an anchor for hoisted declarations.
fn statement_prefix_edit(stmt: &Statement<'_>) -> Edit {
    match stmt {
        Statement::ExportNamedDeclaration(decl) => match &decl.declaration {
            Some(inner) => Edit {
                range: decl.span.start..inner.span().start,
                replacement: String::new(),
            },
            None => Edit {
                range: decl.span.start..decl.span.end,
                replacement: String::new(),
            },
        },
        Statement::ExportDefaultDeclaration(decl) => Edit {
            range: decl.span.start..export_default_payload_start(&decl.declaration),
            replacement: String::new(),
        },
        Statement::ExportAllDeclaration(decl) => Edit {
            range: decl.span.start..decl.span.end,
            replacement: String::new(),
        },
        other => {
            let start = other.span().start;
            Edit {
                range: start..start,
                replacement: String::new(),
            }
        }
    }
}

fn export_default_payload_start(kind: &ExportDefaultDeclarationKind<'_>) -> u32 {
    kind.span().start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_module(source: &str) -> ClassifyOutput<'_> {
        classify("test.js", source, SourceType::default().with_module(true)).expect("valid source")
    }

    #[test]
    fn finds_static_site() {
        let output = classify_module("const a = css`color: red;`;");
        assert_eq!(output.sites.sites.len(), 1);
        assert!(output.sites.sites[0].is_static());
        assert_eq!(
            output.sites.sites[0].kind,
            SiteKind::Static("color: red;".to_string())
        );
    }

    #[test]
    fn finds_dynamic_site() {
        let output = classify_module("const a = css`color: ${color};`;");
        assert_eq!(output.sites.sites.len(), 1);
        assert!(output.sites.sites[0].is_dynamic());
        assert!(output.sites.any_dynamic());
    }

    #[test]
    fn ignores_non_css_tagged_templates() {
        let output = classify_module("const a = html`<div></div>`;");
        assert!(output.sites.is_empty());
    }

    #[test]
    fn sites_are_recorded_in_source_order() {
        let output = classify_module("const a = css`a`;\nconst b = css`${x}`;\n");
        assert_eq!(output.sites.sites[0].index, 0);
        assert_eq!(output.sites.sites[1].index, 1);
        assert!(output.sites.sites[0].range.start < output.sites.sites[1].range.start);
    }

    #[test]
    fn derivative_program_hoists_dynamic_site_and_replaces_tag() {
        let output = classify_module("const a = css`color: ${color};`;");
        let derivative = output.build_derivative_program();
        assert!(derivative.contains("export const __severed_css_0"));
        assert!(derivative.contains("color: ${color};"));
        assert!(derivative.contains(SENTINEL_LITERAL));
        assert!(!derivative.contains("css`"));
    }

    #[test]
    fn derivative_program_hoists_static_sites_too_when_file_is_mixed() {
        let source = "const a = css`static`;\nconst b = css`${dyn}`;\n";
        let output = classify_module(source);
        let derivative = output.build_derivative_program();
        assert!(derivative.contains("export const __severed_css_0"));
        assert!(derivative.contains("export const __severed_css_1"));
    }

    #[test]
    fn export_keyword_is_stripped_but_declaration_kept() {
        let output = classify_module("export const a = css`color: ${c};`;");
        let derivative = output.build_derivative_program();
        assert!(!derivative.trim_start().starts_with("export const a"));
        assert!(derivative.contains("const a ="));
    }

    #[test]
    fn export_without_declaration_is_removed() {
        let output = classify_module("const a = 1;\nexport { a };\n");
        let derivative = output.build_derivative_program();
        assert!(!derivative.contains("export { a }"));
    }

    #[test]
    fn export_all_is_removed() {
        let output = classify_module("export * from './other.js';\nconst a = css`${x}`;\n");
        let derivative = output.build_derivative_program();
        assert!(!derivative.contains("export * from"));
    }

    #[test]
    fn call_expressions_are_pure_annotated() {
        let output = classify_module("sideEffect();\nconst a = css`${x}`;\n");
        let derivative = output.build_derivative_program();
        assert!(derivative.contains("/* @__PURE__ */sideEffect()"));
    }

    #[test]
    fn nested_site_hoists_before_its_top_level_statement() {
        let source = "if (cond) {\n  console.log(css`${inner}`);\n}\n";
        let output = classify_module(source);
        assert_eq!(output.sites.sites.len(), 1);
        let derivative = output.build_derivative_program();
        let hoist_pos = derivative.find("export const __severed_css_0").unwrap();
        let if_pos = derivative.find("if (cond)").unwrap();
        assert!(hoist_pos < if_pos);
    }
}
