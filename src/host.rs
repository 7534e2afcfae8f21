//! Host adapter: the virtual-module protocol for push-mode and pull-mode
//! hosts, implemented against a host-agnostic four-hook plugin shape (§4.5)
//!
//! The concrete bundler plugin ABI is out of scope (§1); this module
//! specifies the behaviour any host binding needs to reproduce and ships
//! one reference implementation, [`SeveredPlugin`], that a host binding can
//! wrap directly or use as a model.

use std::path::Path;
use std::sync::{Arc, Mutex};

use oxc_span::SourceType;

use crate::coordinator::{self, TransformOutput};
use crate::css::{self, CssBuffer};
use crate::error::Result;
use crate::options::{
    PluginOptions, PULL_MODE_QUERY_PREFIX, PULL_MODE_QUERY_SUFFIX, PUSH_MODE_SUFFIX, TRANSFORM_EXTENSIONS,
};
use crate::shaker::Resolver;

/// Out-of-scope collaborator (§1): TypeScript/JSX-to-JavaScript
/// pre-transpilation. The default [`IdentityTranspiler`] assumes the input
/// is already valid JavaScript; a real host binding pre-transpiles before
/// handing text to [`SeveredPlugin::transform`].
pub trait Transpiler {
    fn transpile(&self, id: &str, code: &str) -> Result<String>;
}

/// No-op transpiler: returns the input unchanged. Correct for plain
/// `.js` sources; a `.ts`/`.tsx` source handed to this will only survive
/// classification if it happens to contain no TypeScript-only syntax
/// inside a `css`…\`\` template's interpolations (see DESIGN.md).
#[derive(Debug, Default)]
pub struct IdentityTranspiler;

impl Transpiler for IdentityTranspiler {
    fn transpile(&self, _id: &str, code: &str) -> Result<String> {
        Ok(code.to_string())
    }
}

/// A host resolver that never resolves anything. Suitable when a file's
/// derivative program has no imports that need following — most `css`
/// sites never do — and as the default so the plugin remains usable
/// without wiring up a real resolver.
#[derive(Debug, Default)]
pub struct NullResolver;

impl Resolver for NullResolver {
    fn resolve(&self, _specifier: &str, _importer: &str) -> Option<String> {
        None
    }
    fn load(&self, _id: &str) -> Option<String> {
        None
    }
}

/// What a host's `resolveId` hook should do with an id the adapter
/// recognises (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Leave the import specifier as-is; some other pipeline (or the
    /// filesystem) will provide it. Used for push-mode asset paths.
    External,
    /// The adapter claims this id and will serve it itself via `load`.
    /// Carries the source id to read the buffer under (the query suffix
    /// already stripped).
    SelfLoad(String),
}

/// Snapshot of the *other* plugins registered in the same host pipeline,
/// handed to the fourth hook, `options` (§4.5). A real host gathers this
/// once, at pipeline-configuration time, from whichever of its own plugins
/// provide module resolution and TypeScript/JSX transpilation, so that the
/// sub-bundler resolves bare specifiers and transpiles sources exactly as
/// the host's own pipeline would (§9, "reusing the host's resolver inside
/// the sub-bundler").
///
/// Either field left `None` leaves the adapter's current resolver or
/// transpiler (the defaults, unless a prior `options` call or builder
/// method already replaced them) untouched.
#[derive(Default, Clone)]
pub struct HostOptions {
    pub resolver: Option<Arc<dyn Resolver>>,
    pub transpiler: Option<Arc<dyn Transpiler>>,
}

/// The host-agnostic four-hook plugin interface (§4.5): `transform`,
/// `resolveId`, `load`, and `options`. A host binding implements this trait
/// directly against whatever bundler-specific plugin ABI it actually has,
/// or wraps [`SeveredPlugin`] (which already implements it) behind that
/// ABI's own hook names.
pub trait HostPlugin {
    fn transform(&self, id: &str, code: &str) -> Result<Option<TransformOutput>>;
    fn resolve_id(&self, id: &str) -> Option<ResolveOutcome>;
    fn load(&self, id: &str) -> Option<String>;
    /// Adopts sibling-plugin resolver/transpiler snapshotted from the host's
    /// pipeline (§4.5's fourth hook). Called whenever the host re-snapshots
    /// its pipeline, so it may run more than once over a plugin's lifetime.
    fn options(&self, host_options: &HostOptions);
}

/// Reference no-op [`HostPlugin`]: matches nothing, resolves nothing. Stands
/// in for a concrete bundler binding in tests and in generic code that only
/// needs the trait shape, the same way [`NullResolver`] stands in for a real
/// resolver (§4.6, "a reference `NullHost`/in-memory test host").
#[derive(Debug, Default)]
pub struct NullHost;

impl HostPlugin for NullHost {
    fn transform(&self, _id: &str, _code: &str) -> Result<Option<TransformOutput>> {
        Ok(None)
    }

    fn resolve_id(&self, _id: &str) -> Option<ResolveOutcome> {
        None
    }

    fn load(&self, _id: &str) -> Option<String> {
        None
    }

    fn options(&self, _host_options: &HostOptions) {}
}

/// Reference implementation of the four-hook universal plugin interface
/// (§4.5). Owns the process-scoped CSS buffer and a default `emit` hook
/// built from [`css::class_name_for`] — a real host may substitute its own
/// CSS post-processor but the grammar in §6 is what this one follows.
///
/// `resolver`/`transpiler` sit behind a `Mutex<Arc<_>>` rather than a plain
/// field so that `options` (§4.5's fourth hook) can swap them in at any
/// point in the plugin's lifetime through a shared `&self`, not just once
/// at construction via the `with_*` builders.
pub struct SeveredPlugin {
    options: PluginOptions,
    buffer: CssBuffer,
    resolver: Mutex<Arc<dyn Resolver>>,
    transpiler: Mutex<Arc<dyn Transpiler>>,
}

impl SeveredPlugin {
    pub fn new(options: PluginOptions) -> Self {
        Self {
            options,
            buffer: CssBuffer::new(),
            resolver: Mutex::new(Arc::new(NullResolver)),
            transpiler: Mutex::new(Arc::new(IdentityTranspiler)),
        }
    }

    pub fn with_resolver(self, resolver: Box<dyn Resolver>) -> Self {
        *self.resolver.lock().unwrap() = Arc::from(resolver);
        self
    }

    pub fn with_transpiler(self, transpiler: Box<dyn Transpiler>) -> Self {
        *self.transpiler.lock().unwrap() = Arc::from(transpiler);
        self
    }

    /// `transform(code, id)` (§4.5). Skips ids outside the extension
    /// whitelist without even reading their content.
    pub fn transform(&self, id: &str, code: &str) -> Result<Option<TransformOutput>> {
        if !is_whitelisted_extension(id) {
            return Ok(None);
        }

        let transpiler = self.transpiler.lock().unwrap().clone();
        let code = transpiler.transpile(id, code)?;
        let source_type = SourceType::from_path(id).unwrap_or_else(|_| SourceType::default().with_module(true));

        let mut emit = |css_text: &str| css::class_name_for(css_text);
        let push_mode = self.options.is_push_mode();
        let name_maker = move |file_id: &str, css_text: &str| {
            if push_mode {
                push_mode_asset_path(file_id)
            } else {
                pull_mode_virtual_id(file_id, css_text)
            }
        };

        let resolver = self.resolver.lock().unwrap().clone();
        coordinator::transform(
            id,
            &code,
            source_type,
            resolver.as_ref(),
            &self.buffer,
            &mut emit,
            &name_maker,
        )
    }

    /// `resolveId(id)` (§4.5): push mode marks its own asset paths
    /// external; pull mode claims ids carrying the severed query marker.
    pub fn resolve_id(&self, id: &str) -> Option<ResolveOutcome> {
        if self.options.is_push_mode() {
            if id.ends_with(PUSH_MODE_SUFFIX) {
                Some(ResolveOutcome::External)
            } else {
                None
            }
        } else {
            strip_pull_query(id).map(|base| ResolveOutcome::SelfLoad(base.to_string()))
        }
    }

    /// `load(id)` (§4.5): pull mode serves the per-file CSS buffer entry
    /// for ids it claimed in `resolveId`; push mode never claims anything
    /// so this only ever returns `None` there.
    pub fn load(&self, id: &str) -> Option<String> {
        if self.options.is_push_mode() {
            return None;
        }
        let base = strip_pull_query(id)?;
        self.buffer.get(base)
    }

    /// `options(hostOptions)` (§4.5): adopts whichever sibling resolver and
    /// transpiler the host snapshotted from its own pipeline, so subsequent
    /// `transform` calls resolve bare specifiers and transpile TypeScript/JSX
    /// the same way the host's own pipeline does. Fields left `None` leave
    /// the current resolver/transpiler in place.
    pub fn options(&self, host_options: &HostOptions) {
        if let Some(resolver) = &host_options.resolver {
            *self.resolver.lock().unwrap() = resolver.clone();
        }
        if let Some(transpiler) = &host_options.transpiler {
            *self.transpiler.lock().unwrap() = transpiler.clone();
        }
    }
}

impl HostPlugin for SeveredPlugin {
    fn transform(&self, id: &str, code: &str) -> Result<Option<TransformOutput>> {
        SeveredPlugin::transform(self, id, code)
    }

    fn resolve_id(&self, id: &str) -> Option<ResolveOutcome> {
        SeveredPlugin::resolve_id(self, id)
    }

    fn load(&self, id: &str) -> Option<String> {
        SeveredPlugin::load(self, id)
    }

    fn options(&self, host_options: &HostOptions) {
        SeveredPlugin::options(self, host_options)
    }
}

fn is_whitelisted_extension(id: &str) -> bool {
    let path = id.split(['?', '#']).next().unwrap_or(id);
    TRANSFORM_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// `<flattened-source-id>.severed.css` (§6): every run of non-alphanumerics
/// in the id's process-working-directory-relative form becomes a single
/// `-`.
fn push_mode_asset_path(id: &str) -> String {
    let relative = Path::new(id)
        .strip_prefix(std::env::current_dir().unwrap_or_default())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| id.to_string());

    let mut flattened = String::with_capacity(relative.len());
    let mut last_was_sep = false;
    for ch in relative.chars() {
        if ch.is_ascii_alphanumeric() {
            flattened.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            flattened.push('-');
            last_was_sep = true;
        }
    }
    format!("{}{}", flattened.trim_matches('-'), PUSH_MODE_SUFFIX)
}

/// `<source-id>?severed=<5-hex-chars>&lang.css` (§6).
fn pull_mode_virtual_id(id: &str, css_text: &str) -> String {
    format!("{id}{PULL_MODE_QUERY_PREFIX}{}{PULL_MODE_QUERY_SUFFIX}", css::cache_bust_hash(css_text))
}

/// Strips a pull-mode query suffix from `id`, returning the bare source id
/// if `id` carries one.
fn strip_pull_query(id: &str) -> Option<&str> {
    id.split_once(PULL_MODE_QUERY_PREFIX).map(|(base, _)| base)
}
