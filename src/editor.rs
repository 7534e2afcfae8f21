//! Text editor: immutable original text plus a log of byte-range edits
//!
//! This is the one substitution primitive used twice in the pipeline: the
//! classifier uses it to splice the derivative program together out of the
//! original text (§4.1), and the file coordinator uses a fresh instance of
//! it to apply the final class-name substitutions and produce a source map
//! (§4.4 step 5-7).

use std::ops::Range;

use oxc_sourcemap::{SourceMap, Token};

use crate::line_index::LineIndex;

/// One byte-range replacement. `range` is `[start, end)` in the *original*
/// text; an empty range is a pure insertion at that position.
#[derive(Debug, Clone)]
pub struct Edit {
    pub range: Range<u32>,
    pub replacement: String,
}

/// Accumulates non-overlapping edits against one immutable original text.
pub struct TextEditor<'a> {
    original: &'a str,
    edits: Vec<Edit>,
}

impl<'a> TextEditor<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            edits: Vec::new(),
        }
    }

    pub fn replace(&mut self, range: Range<u32>, replacement: impl Into<String>) {
        self.edits.push(Edit {
            range,
            replacement: replacement.into(),
        });
    }

    pub fn insert(&mut self, at: u32, text: impl Into<String>) {
        self.replace(at..at, text);
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Splice all edits into the original text, in ascending `start` order.
    /// Edits must be non-overlapping; two zero-width insertions may share a
    /// start, in which case they are applied in the order they were added.
    pub fn apply(&self) -> String {
        let (text, _) = self.splice();
        text
    }

    /// Same as [`Self::apply`], additionally producing a source map from
    /// original text to rewritten text.
    pub fn apply_with_source_map(&self, source_name: &str) -> (String, SourceMap) {
        let (text, anchors) = self.splice();

        let generated_index = LineIndex::new(&text);
        let original_index = LineIndex::new(self.original);
        let tokens: Vec<Token> = anchors
            .iter()
            .map(|&(generated_offset, original_offset)| {
                let (dst_line, dst_col) = generated_index.line_col(generated_offset);
                let (src_line, src_col) = original_index.line_col(original_offset);
                Token::new(dst_line, dst_col, src_line, src_col, Some(0), None)
            })
            .collect();

        let map = SourceMap::new(
            None,
            vec![],
            None,
            vec![source_name.to_string().into()],
            Some(vec![self.original.to_string().into()]),
            tokens,
            None,
        );

        (text, map)
    }

    /// Returns the rewritten text plus `(generated_offset, original_offset)`
    /// anchor pairs marking the start of every passthrough span (i.e. every
    /// stretch of text copied verbatim from the original).
    fn splice(&self) -> (String, Vec<(u32, u32)>) {
        let mut sorted = self.edits.clone();
        sorted.sort_by_key(|e| e.range.start);

        let mut out = String::with_capacity(self.original.len());
        let mut anchors = Vec::new();
        let mut cursor = 0u32;

        for edit in &sorted {
            debug_assert!(
                edit.range.start >= cursor,
                "overlapping edits passed to TextEditor"
            );
            if edit.range.start > cursor {
                anchors.push((out.len() as u32, cursor));
                out.push_str(&self.original[cursor as usize..edit.range.start as usize]);
            }
            out.push_str(&edit.replacement);
            cursor = edit.range.end.max(cursor);
        }

        if (cursor as usize) < self.original.len() {
            anchors.push((out.len() as u32, cursor));
            out.push_str(&self.original[cursor as usize..]);
        }

        (out, anchors)
    }
}
