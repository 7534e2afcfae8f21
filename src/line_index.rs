//! Byte offset → (line, column) lookup for source-map generation
//!
//! Columns are counted in bytes rather than UTF-16 code units. This is a
//! deliberate simplification over the full source-map spec (see DESIGN.md);
//! it is exact for the ASCII-dominated CSS template text this crate rewrites
//! and degrades gracefully (merely imprecise column info) for the rare
//! non-ASCII case.

#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// Returns the zero-based `(line, column)` for a byte offset.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => (line as u32, 0),
            Err(insert_at) => {
                let line = insert_at - 1;
                let col = offset - self.line_starts[line];
                (line as u32, col)
            }
        }
    }
}
