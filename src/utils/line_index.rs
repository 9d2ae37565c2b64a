//! Byte-offset to line-number mapping.
//!
//! Every regex scan in the indexer reports byte positions; this table turns them into
//! 1-based line numbers with a binary search instead of counting newlines per match.

/// Normalize CRLF and lone CR line endings to LF
pub fn normalize_line_endings(source: &str) -> String {
    if !source.contains('\r') {
        return source.to_string();
    }
    source.replace("\r\n", "\n").replace('\r', "\n")
}

/// Start offsets of every line in a source text
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = Vec::with_capacity(text.len() / 40 + 1);
        starts.push(0);
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Number of lines (`count('\n') + 1`)
    pub fn total_lines(&self) -> usize {
        self.starts.len()
    }

    /// 1-based line number containing byte offset `pos`
    pub fn line_of(&self, pos: usize) -> usize {
        self.starts.partition_point(|&s| s <= pos).max(1)
    }

    /// Byte offset where 1-based `line` begins (clamped to the text length)
    pub fn line_start(&self, line: usize) -> usize {
        if line == 0 {
            return 0;
        }
        self.starts.get(line - 1).copied().unwrap_or(self.len)
    }

    /// Byte range `[start, end)` covering lines `first..=last` (1-based, inclusive)
    pub fn span(&self, first: usize, last: usize) -> (usize, usize) {
        let start = self.line_start(first);
        let end = if last >= self.starts.len() {
            self.len
        } else {
            self.starts[last]
        };
        (start, end.max(start))
    }
}
