//! File coordinator: orchestrates one file's extraction end to end (§4.4)
//!
//! Everything upstream of this module only ever sees one file at a time and
//! never touches the host; everything the host actually calls into —
//! `emit`, the asset-specifier name-maker, the resolver — is threaded
//! through here as trait objects so the host adapter (§4.5) can wire up
//! push mode or pull mode without this module knowing which one it is.

use oxc_span::SourceType;
use tracing::{debug, instrument};

use crate::classifier::{self, ClassifyOutput};
use crate::css::{self, CssBuffer, CssFragment};
use crate::editor::TextEditor;
use crate::error::Result;
use crate::evaluator;
use crate::options::SITE_EXPORT_PREFIX;
use crate::shaker::{self, Resolver};
use crate::site::SiteKind;

/// Host-supplied hook turning raw CSS text into a final class name (§4.4).
/// The only place raw CSS becomes final CSS; a real host wraps this around
/// a selector-hashing/autoprefixing CSS post-processor.
pub trait Emit {
    fn emit(&mut self, css_text: &str) -> String;
}

impl<F: FnMut(&str) -> String> Emit for F {
    fn emit(&mut self, css_text: &str) -> String {
        self(css_text)
    }
}

/// Host-supplied hook producing the specifier for the injected CSS import,
/// given the source id and the file's final accumulated CSS text (pull
/// mode needs the CSS text for its cache-busting hash; push mode ignores
/// it).
pub trait NameMaker {
    fn specifier_for(&self, id: &str, css_text: &str) -> String;
}

impl<F: Fn(&str, &str) -> String> NameMaker for F {
    fn specifier_for(&self, id: &str, css_text: &str) -> String {
        self(id, css_text)
    }
}

/// Successful outcome of [`transform`]: the rewritten source, its source
/// map (serialised as a JSON string, the conventional inline-map shape),
/// and the CSS text that was stored into the per-file buffer.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub map_json: String,
    pub css: String,
}

/// Runs the full per-file pipeline (§4.4 steps 1-8). Returns `Ok(None)`
/// when the file has nothing to extract — the host should leave it
/// unchanged — per the two early-return invariants in §8.
#[instrument(skip(source_text, source_type, resolver, buffer, emit, name_maker))]
pub fn transform(
    id: &str,
    source_text: &str,
    source_type: SourceType,
    resolver: &dyn Resolver,
    buffer: &CssBuffer,
    emit: &mut dyn Emit,
    name_maker: &dyn NameMaker,
) -> Result<Option<TransformOutput>> {
    // §5: a transform for id `I` first removes entry `I`, then (only on
    // success) writes it back — so a failed re-transform clears the
    // previous entry instead of leaving stale CSS for `load` to serve.
    buffer.remove(id);

    if !source_text.contains("css`") {
        debug!("no css` substring, skipping parse");
        return Ok(None);
    }

    let classified = classifier::classify(id, source_text, source_type)?;
    if classified.sites.is_empty() {
        debug!("parsed but found no css tagged sites");
        return Ok(None);
    }

    debug!(site_count = classified.sites.sites.len(), any_dynamic = classified.sites.any_dynamic(), "classified");

    let css_values = resolve_site_values(id, &classified, resolver)?;

    let mut editor = TextEditor::new(source_text);
    let mut fragments = Vec::with_capacity(classified.sites.sites.len());

    for site in classified.sites.in_source_order() {
        let css_text = css_values
            .get(&site.index)
            .cloned()
            .expect("every site has a resolved css text by this point");
        let class_name = emit.emit(&css_text);
        fragments.push(CssFragment::new(class_name.clone(), css_text));
        let quoted = serde_json::to_string(&class_name).expect("class names are valid JSON strings");
        editor.replace(site.range.clone(), quoted);
    }

    let accumulated_css = css::concat_fragments(&fragments);
    let specifier = name_maker.specifier_for(id, &accumulated_css);
    editor.insert(0, format!("import {};\n", serde_json::to_string(&specifier).expect("specifier is valid JSON string")));

    let (code, map) = editor.apply_with_source_map(id);
    let map_json = map.to_json_string();

    buffer.store(id, accumulated_css.clone());

    debug!(substitutions = fragments.len(), "substituted and stored css buffer entry");

    Ok(Some(TransformOutput { code, map_json, css: accumulated_css }))
}

/// Resolves every site's CSS text: static sites read straight from their
/// recorded raw value; if any site is dynamic the whole file goes through
/// the sub-bundler + evaluator, and static sites simply ride along (their
/// value is already known, so they are never included in `required`).
fn resolve_site_values(id: &str, classified: &ClassifyOutput<'_>, resolver: &dyn Resolver) -> Result<std::collections::HashMap<usize, String>> {
    let mut values = std::collections::HashMap::new();

    for site in classified.sites.in_source_order() {
        if let SiteKind::Static(raw) = &site.kind {
            values.insert(site.index, raw.clone());
        }
    }

    if !classified.sites.any_dynamic() {
        return Ok(values);
    }

    let dynamic_indices: Vec<usize> = classified
        .sites
        .in_source_order()
        .iter()
        .filter(|s| s.is_dynamic())
        .map(|s| s.index)
        .collect();
    let required_exports: Vec<String> = dynamic_indices.iter().map(|i| format!("{SITE_EXPORT_PREFIX}{i}")).collect();

    let derivative_program = classified.build_derivative_program();
    debug!(bytes = derivative_program.len(), "built derivative program");

    let bundle = shaker::bundle(id, &derivative_program, &required_exports, resolver)?;
    debug!(modules = bundle.modules.len(), "sub-bundler closed module graph");

    let evaluated = evaluator::evaluate(id, &bundle, resolver, &dynamic_indices)?;
    for (index, css_text) in evaluated {
        values.insert(index, css_text);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopResolver;
    impl Resolver for NoopResolver {
        fn resolve(&self, _specifier: &str, _importer: &str) -> Option<String> {
            None
        }
        fn load(&self, _id: &str) -> Option<String> {
            None
        }
    }

    fn always_same_class(_css: &str) -> String {
        "severed-test".to_string()
    }

    fn identity_specifier(_id: &str, _css: &str) -> String {
        "./styles.css".to_string()
    }

    #[test]
    fn returns_none_when_no_css_tag_present() {
        let buffer = CssBuffer::new();
        let mut emit = always_same_class;
        let result = transform(
            "a.js",
            "const a = 1;",
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn static_site_substitutes_and_stores_buffer() {
        let buffer = CssBuffer::new();
        let mut emit = always_same_class;
        let result = transform(
            "a.js",
            "const a = css`color: red;`;",
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap()
        .unwrap();

        assert!(result.code.starts_with("import \"./styles.css\";\n"));
        assert!(result.code.contains("\"severed-test\""));
        assert_eq!(buffer.get("a.js").as_deref(), Some(result.css.as_str()));
    }

    #[test]
    fn dynamic_site_runs_through_evaluator() {
        let buffer = CssBuffer::new();
        let mut emit = always_same_class;
        let source = "const color = 'purple';\nconst a = css`background: ${color}`;\n";
        let result = transform(
            "a.js",
            source,
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap()
        .unwrap();

        assert!(result.css.contains("background: purple"));
    }

    #[test]
    fn reinvoking_transform_overwrites_buffer_entry() {
        let buffer = CssBuffer::new();
        let mut emit = always_same_class;
        transform(
            "a.js",
            "const a = css`one`;",
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap();
        transform(
            "a.js",
            "const a = css`two`;",
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap();

        let stored = buffer.get("a.js").unwrap();
        assert!(stored.contains("two"));
        assert!(!stored.contains("one"));
    }

    #[test]
    fn failed_retransform_clears_stale_buffer_entry() {
        let buffer = CssBuffer::new();
        let mut emit = always_same_class;
        transform(
            "a.js",
            "const a = css`one`;",
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap();
        assert!(buffer.get("a.js").is_some());

        let err = transform(
            "a.js",
            "const a = css`${undeclaredThing}`;",
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::SeveredError::Eval { .. }));

        assert!(buffer.get("a.js").is_none());
    }

    #[test]
    fn unused_side_effecting_code_does_not_block_evaluation() {
        let buffer = CssBuffer::new();
        let mut emit = always_same_class;
        let source = "const foo = sideEffect();\nconst color = 'blue';\nconst a = css`color: ${color}`;\n";
        let result = transform(
            "a.js",
            source,
            SourceType::default().with_module(true),
            &NoopResolver,
            &buffer,
            &mut emit,
            &identity_specifier,
        )
        .unwrap()
        .unwrap();

        assert!(result.css.contains("color: blue"));
    }
}
