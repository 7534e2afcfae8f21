//! Configuration surface for the extraction pipeline

use serde::{Deserialize, Serialize};

/// The sentinel string literal substituted in place of `css`…`` tags inside
/// the derivative program, so the sub-bundler never sees a tagged template.
pub const SENTINEL_LITERAL: &str = "\"__severed_sentinel__\"";

/// Prefix for the hoisted per-site export bindings in the derivative program.
pub const SITE_EXPORT_PREFIX: &str = "__severed_css_";

/// Extensions the host adapter will offer to `transform`.
pub const TRANSFORM_EXTENSIONS: &[&str] = &[".js", ".ts", ".tsx"];

/// Fixed suffix appended to push-mode asset paths.
pub const PUSH_MODE_SUFFIX: &str = ".severed.css";

/// Query marker used to recognise pull-mode virtual ids.
pub const PULL_MODE_QUERY_PREFIX: &str = "?severed=";

/// Query suffix appended after the short hash in pull-mode virtual ids, used
/// by hosts that route loaders by pseudo-extension.
pub const PULL_MODE_QUERY_SUFFIX: &str = "&lang.css";

/// Number of hex characters kept from the SHA-512 digest of a CSS fragment's
/// text when deriving its class name.
pub const CLASS_NAME_HEX_LEN: usize = 7;

/// Number of hex characters kept from the SHA-512 digest used as the
/// cache-busting short hash in pull-mode virtual ids.
pub const CACHE_BUST_HEX_LEN: usize = 5;

/// Configuration options for the `severed` plugin.
///
/// Mirrors the single documented option, `writeCSSFiles`, which switches the
/// host adapter between push mode (real asset files) and the pull-mode
/// virtual modules used by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// When `true`, emit a real CSS asset per file (push mode) instead of
    /// serving CSS through virtual modules (pull mode).
    ///
    /// `rename` is explicit rather than `rename_all = "camelCase"`: serde's
    /// camelCase conversion only capitalizes the first letter of each
    /// underscore-separated word, giving `writeCssFiles`, not the spec's
    /// `writeCSSFiles`.
    #[serde(rename = "writeCSSFiles")]
    pub write_css_files: bool,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            write_css_files: false,
        }
    }
}

impl PluginOptions {
    /// Create options with push mode enabled.
    pub fn with_write_css_files(mut self, write_css_files: bool) -> Self {
        self.write_css_files = write_css_files;
        self
    }

    /// Whether the host should operate in push mode.
    pub fn is_push_mode(&self) -> bool {
        self.write_css_files
    }
}
