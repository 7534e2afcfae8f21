//! CSS fragments, class-name hashing, and the process-scoped per-file buffer
//!
//! `emit` is deliberately not implemented here: the contract in §4.4 says raw
//! CSS becomes final CSS only inside the host-supplied hook. This module
//! owns everything on *this* side of that hook: hashing raw CSS into a class
//! name, wrapping it into a selector rule, and the shared buffer that the
//! host adapter's `load` hook reads from.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha512};

use crate::options::{CACHE_BUST_HEX_LEN, CLASS_NAME_HEX_LEN};

/// Generated class name for a CSS fragment, of the form `severed-<hex>`.
pub fn class_name_for(css_text: &str) -> String {
    format!("severed-{}", hex_digest(css_text, CLASS_NAME_HEX_LEN))
}

/// Short cache-busting hash used in the pull-mode virtual-id query string.
pub fn cache_bust_hash(css_text: &str) -> String {
    hex_digest(css_text, CACHE_BUST_HEX_LEN)
}

fn hex_digest(text: &str, hex_len: usize) -> String {
    let digest = Sha512::digest(text.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..hex_len.min(hex.len())].to_string()
}

/// One generated class selector rule wrapping a site's CSS text.
#[derive(Debug, Clone)]
pub struct CssFragment {
    pub class_name: String,
    pub css_text: String,
}

impl CssFragment {
    pub fn new(class_name: String, css_text: String) -> Self {
        Self {
            class_name,
            css_text,
        }
    }

    /// Render as `.{class_name} { {css_text} }`.
    pub fn render(&self) -> String {
        format!(".{} {{ {} }}", self.class_name, self.css_text)
    }
}

/// Concatenates a file's fragments into the accumulated CSS text that gets
/// stored in the per-file buffer, with two blank-line separators.
pub fn concat_fragments(fragments: &[CssFragment]) -> String {
    fragments
        .iter()
        .map(CssFragment::render)
        .collect::<Vec<_>>()
        .join("\n\n\n")
}

/// Process-wide mapping of source id to accumulated CSS text (§3, §5).
///
/// Mutation rules: a `transform` call for id `I` first removes entry `I`,
/// then (only on success) writes it back with the freshly accumulated text.
/// `load` reads entry `I` after stripping any query suffix from the id it
/// was given.
#[derive(Default)]
pub struct CssBuffer {
    entries: Mutex<HashMap<String, String>>,
}

impl CssBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self, id: &str) -> Option<String> {
        self.entries.lock().unwrap().remove(id)
    }

    pub fn store(&self, id: impl Into<String>, css_text: impl Into<String>) {
        self.entries.lock().unwrap().insert(id.into(), css_text.into());
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.entries.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.entries.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_css_yields_identical_class_name() {
        assert_eq!(class_name_for("color: red;"), class_name_for("color: red;"));
    }

    #[test]
    fn distinct_css_yields_distinct_class_name() {
        assert_ne!(class_name_for("color: red;"), class_name_for("color: blue;"));
    }

    #[test]
    fn class_name_grammar_matches_spec() {
        let name = class_name_for("color: red;");
        assert!(name.starts_with("severed-"));
        assert_eq!(name.len(), "severed-".len() + CLASS_NAME_HEX_LEN);
        assert!(name["severed-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cache_bust_hash_is_shorter_than_class_name_hash() {
        let hash = cache_bust_hash("color: red;");
        assert_eq!(hash.len(), CACHE_BUST_HEX_LEN);
    }

    #[test]
    fn fragment_renders_as_selector_rule() {
        let fragment = CssFragment::new("severed-abc1234".into(), "color: red;".into());
        assert_eq!(fragment.render(), ".severed-abc1234 { color: red; }");
    }

    #[test]
    fn concat_joins_with_two_blank_lines() {
        let fragments = vec![
            CssFragment::new("severed-a".into(), "color: red;".into()),
            CssFragment::new("severed-b".into(), "color: blue;".into()),
        ];
        let joined = concat_fragments(&fragments);
        assert_eq!(
            joined,
            ".severed-a { color: red; }\n\n\n.severed-b { color: blue; }"
        );
    }

    #[test]
    fn buffer_overwrites_on_restore() {
        let buffer = CssBuffer::new();
        buffer.store("a.js", "first");
        buffer.store("a.js", "second");
        assert_eq!(buffer.get("a.js").as_deref(), Some("second"));
    }

    #[test]
    fn buffer_take_removes_entry() {
        let buffer = CssBuffer::new();
        buffer.store("a.js", "css");
        assert_eq!(buffer.take("a.js").as_deref(), Some("css"));
        assert_eq!(buffer.get("a.js"), None);
    }
}
