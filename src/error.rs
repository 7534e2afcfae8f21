//! Crate-wide error types
//!
//! Mirrors the failure taxonomy laid out for the extraction pipeline: a parse
//! error aborts before any site is even seen, a bundle error means the
//! derivative program could not be closed over its imports, an eval error
//! means the closed program ran but failed, and a type error means it ran to
//! completion but produced something other than a string.

use thiserror::Error;

/// Errors that can occur while extracting `css` tagged templates from a file.
#[derive(Debug, Error)]
pub enum SeveredError {
    /// The source file failed to parse.
    #[error("failed to parse `{id}`: {message}")]
    Parse { id: String, message: String },

    /// The sub-bundler could not close the derivative program over its
    /// imports (a resolver miss that the host considered fatal, or a cycle
    /// it refused to walk).
    #[error("failed to bundle `{id}` while extracting css: {message}")]
    Bundle { id: String, message: String },

    /// The derivative program was constructed and closed successfully but
    /// failed during execution.
    #[error("Failed to evaluate `{id}` while extracting css: {message}")]
    Eval { id: String, message: String },

    /// An export meant to hold a site's computed CSS text was not a string.
    #[error("expected css to evaluate to string")]
    Type { id: String, site_index: usize },

    /// The host's resolver refused to resolve an id the sub-bundler needed.
    #[error("could not resolve `{specifier}` from `{importer}`")]
    Resolve { specifier: String, importer: String },
}

impl SeveredError {
    /// The source id this error is about, when one applies.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            SeveredError::Parse { id, .. }
            | SeveredError::Bundle { id, .. }
            | SeveredError::Eval { id, .. }
            | SeveredError::Type { id, .. } => Some(id),
            SeveredError::Resolve { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SeveredError>;
