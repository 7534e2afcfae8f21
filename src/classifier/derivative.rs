//! Derivative-program text assembly
//!
//! Everything here operates purely on byte ranges into the original source;
//! no AST node is touched once [`super::classify`] has finished walking it.

use std::ops::Range;

use crate::editor::TextEditor;

/// Copies `source_text[range]` verbatim except for a `/* @__PURE__ */`
/// inserted immediately before every call-expression start that falls
/// inside `range`.
pub fn slice_with_pure_annotations(source_text: &str, range: Range<u32>, call_points: &[u32]) -> String {
    let local = &source_text[range.start as usize..range.end as usize];
    let mut editor = TextEditor::new(local);
    for &call_start in call_points {
        if call_start >= range.start && call_start < range.end {
            editor.insert(call_start - range.start, "/* @__PURE__ */");
        }
    }
    editor.apply()
}
