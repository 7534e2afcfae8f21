//! # severed
//!
//! A build-time extractor for `css`…\`\` tagged template literals. Each
//! occurrence is replaced with a generated class-name string constant, its
//! CSS text is emitted as a sibling asset, and the source is rewritten to
//! import that asset — no runtime CSS-in-JS library is needed at the end of
//! the pipeline, and the style text is visible to ordinary CSS asset
//! tooling.
//!
//! ## Pipeline
//!
//! 1. [`classifier`] parses a file and classifies every `css` site as
//!    static or dynamic, building a derivative program for the dynamic
//!    ones.
//! 2. [`shaker`] tree-shakes that derivative program against a host
//!    resolver, producing a closed graph of reachable module sources.
//! 3. [`evaluator`] links that graph into a script and runs it through an
//!    embedded ECMAScript engine, harvesting each site's computed CSS text.
//! 4. [`coordinator`] ties the above together for one file: apply
//!    substitutions, emit the CSS import, and hand back rewritten source
//!    plus a source map.
//! 5. [`host`] implements the virtual-module protocol a host bundler needs
//!    to serve that CSS back, in either push mode or pull mode.
//!
//! ## Example
//!
//! ```rust,ignore
//! use severed::{PluginOptions, SeveredPlugin};
//!
//! let plugin = SeveredPlugin::new(PluginOptions::default());
//! if let Some(output) = plugin.transform("button.js", source_text)? {
//!     println!("{}", output.code);
//! }
//! ```

pub mod classifier;
pub mod coordinator;
pub mod css;
pub mod editor;
pub mod error;
pub mod evaluator;
pub mod host;
mod line_index;
pub mod options;
pub mod shaker;
pub mod site;

pub use coordinator::TransformOutput;
pub use error::{Result, SeveredError};
pub use host::{HostOptions, HostPlugin, NullHost, ResolveOutcome, SeveredPlugin};
pub use options::PluginOptions;
pub use shaker::Resolver;
