//! Regex-driven structural indexer for COBOL sources.
//!
//! Builds a [`StructuralIndex`] (divisions, sections, paragraphs, copybooks, data
//! items, identification and file-control entries, statements and EXEC blocks)
//! without a grammar parse, so multi-million-line sources index in interactive time.
//!
//! Positions are mapped to 1-based line numbers through one [`LineIndex`] built per
//! call. Sources above [`WINDOW_THRESHOLD_CHARS`] are scanned in fixed-size line
//! windows, reporting progress after each one.

mod patterns;
pub mod types;

pub use types::{IndexCategory, IndexEntry, StatementEntry, StructuralIndex};

use crate::utils::line_index::{normalize_line_endings, LineIndex};
use patterns::*;
use regex::Regex;
use std::time::Instant;
use tracing::debug;

/// Sources longer than this (in bytes) are scanned window by window
pub const WINDOW_THRESHOLD_CHARS: usize = 500_000;

/// Lines per scan window
pub const WINDOW_LINES: usize = 10_000;

/// Regex-based structural indexer
///
/// Stateless apart from its windowing parameters; one instance can index any number
/// of sources.
#[derive(Debug, Clone)]
pub struct StructuralIndexer {
    window_threshold: usize,
    window_lines: usize,
}

impl Default for StructuralIndexer {
    fn default() -> Self {
        Self {
            window_threshold: WINDOW_THRESHOLD_CHARS,
            window_lines: WINDOW_LINES,
        }
    }
}

impl StructuralIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the windowing threshold and window size
    pub fn with_windowing(threshold_chars: usize, window_lines: usize) -> Self {
        Self {
            window_threshold: threshold_chars,
            window_lines: window_lines.max(1),
        }
    }

    /// Index a source without progress reporting
    pub fn index(&self, source: &str) -> StructuralIndex {
        self.index_with_progress(source, &mut |_, _| {})
    }

    /// Index a source, calling `progress(stage, percent)` synchronously
    ///
    /// Windowed scans report stage `"scanning"` after each window; every call ends with
    /// `("complete", 100)`.
    pub fn index_with_progress(
        &self,
        source: &str,
        progress: &mut dyn FnMut(&str, u8),
    ) -> StructuralIndex {
        let started = Instant::now();
        let text = normalize_line_endings(source);
        let lines = LineIndex::new(&text);
        let scan = Scan {
            text: &text,
            lines: &lines,
        };

        let mut index = StructuralIndex {
            total_lines: lines.total_lines(),
            ..Default::default()
        };

        // Divisions bound the paragraph and statement scans, so they are found first.
        scan.divisions(&mut index);
        let proc_offset = index
            .divisions
            .iter()
            .find(|d| d.name.contains("PROCEDURE"))
            .map(|d| lines.line_start(d.line_start));

        let windowed = text.len() > self.window_threshold;
        let windows = if windowed {
            self.windows(&lines)
        } else {
            vec![(0, text.len())]
        };

        let window_count = windows.len();
        for (i, (start, end)) in windows.into_iter().enumerate() {
            scan.window(start, end, proc_offset, &mut index);
            if windowed {
                progress("scanning", ((i + 1) * 100 / window_count) as u8);
            }
        }

        // EXEC blocks span lines freely and are never split across windows.
        scan.exec_blocks(&mut index);

        finalize(&mut index);
        progress("complete", 100);

        debug!(
            "Indexed {} lines in {:?}: {} divisions, {} sections, {} paragraphs, {} statements ({} windows)",
            index.total_lines,
            started.elapsed(),
            index.divisions.len(),
            index.sections.len(),
            index.paragraphs.len(),
            index.statements.len(),
            window_count
        );

        index
    }

    fn windows(&self, lines: &LineIndex) -> Vec<(usize, usize)> {
        (0..lines.total_lines())
            .step_by(self.window_lines)
            .map(|first| lines.span(first + 1, first + self.window_lines))
            .collect()
    }
}

/// Convenience wrapper around a default indexer
pub fn index_source(source: &str) -> StructuralIndex {
    StructuralIndexer::default().index(source)
}

/// Per-call scan context over the normalized text
struct Scan<'a> {
    text: &'a str,
    lines: &'a LineIndex,
}

impl Scan<'_> {
    fn line_of(&self, pos: usize) -> usize {
        self.lines.line_of(pos)
    }

    /// Line of a match start, stepping past one leading newline a `\s` run may have eaten
    fn line_of_skipping_newline(&self, pos: usize) -> usize {
        if self.text.as_bytes().get(pos) == Some(&b'\n') {
            self.lines.line_of(pos + 1)
        } else {
            self.lines.line_of(pos)
        }
    }

    fn divisions(&self, index: &mut StructuralIndex) {
        for caps in DIVISION_RE.captures_iter(self.text) {
            let Some(name) = caps.get(1) else { continue };
            index.divisions.push(IndexEntry::new(
                format!("{} DIVISION", name.as_str().to_uppercase()),
                IndexCategory::Division,
                self.line_of(name.start()),
            ));
        }
    }

    fn window(
        &self,
        start: usize,
        end: usize,
        proc_offset: Option<usize>,
        index: &mut StructuralIndex,
    ) {
        let slice = &self.text[start..end];

        self.named(&SECTION_RE, slice, start, |name, line| {
            index.sections.push(IndexEntry::new(
                format!("{} SECTION", name),
                IndexCategory::Section,
                line,
            ))
        });

        self.named(&COPY_RE, slice, start, |name, line| {
            index
                .copybooks
                .push(IndexEntry::new(name, IndexCategory::Copybook, line))
        });

        self.named(&LEVEL_01_RE, slice, start, |name, line| {
            index
                .data_items_01
                .push(IndexEntry::new(name, IndexCategory::DataItem, line))
        });

        for caps in DATA_ITEM_RE.captures_iter(slice) {
            let (Some(level), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            index.data_items_all.push(IndexEntry::new(
                format!("{} {}", level.as_str(), name.as_str().to_uppercase()),
                IndexCategory::DataItem,
                self.line_of(start + level.start()),
            ));
        }

        let ids = &mut index.id_division_entries;
        self.keyword_entries(&PROGRAM_ID_RE, "PROGRAM-ID", slice, start, IndexCategory::IdEntry, ids);
        for (keyword, re) in ID_ENTRY_PATTERNS.iter() {
            self.keyword_entries(re, keyword, slice, start, IndexCategory::IdEntry, ids);
        }

        let files = &mut index.file_entries;
        self.keyword_entries(
            &FILE_CONTROL_RE,
            "FILE-CONTROL",
            slice,
            start,
            IndexCategory::FileEntry,
            files,
        );
        for (keyword, re) in FILE_ENTRY_PATTERNS.iter() {
            for caps in re.captures_iter(slice) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                files.push(IndexEntry::new(
                    format!("{} {}", keyword, name.as_str().to_uppercase()),
                    IndexCategory::FileEntry,
                    self.line_of_skipping_newline(start + whole.start()),
                ));
            }
        }
        for (clause, re) in FILE_CLAUSE_PATTERNS.iter() {
            self.keyword_entries(re, clause, slice, start, IndexCategory::FileClause, files);
        }

        // Paragraphs and statements only exist from the PROCEDURE DIVISION header on.
        let Some(proc_offset) = proc_offset else {
            return;
        };
        let proc_start = start.max(proc_offset);
        if proc_start >= end {
            return;
        }
        let proc_slice = &self.text[proc_start..end];

        for caps in PARAGRAPH_RE.captures_iter(proc_slice) {
            let Some(name) = caps.get(1) else { continue };
            let upper = name.as_str().to_uppercase();
            if upper.contains("SECTION") || PARAGRAPH_STOPWORDS.contains(&upper.as_str()) {
                continue;
            }
            index.paragraphs.push(IndexEntry::new(
                upper,
                IndexCategory::Paragraph,
                self.line_of(proc_start + name.start()),
            ));
        }

        let statement_patterns = STATEMENT_PATTERNS.iter().chain(END_STATEMENT_PATTERNS.iter());
        for (statement_type, re) in statement_patterns {
            for m in re.find_iter(proc_slice) {
                let line = self.line_of_skipping_newline(proc_start + m.start());
                index.statements.push(StatementEntry {
                    statement_type: statement_type.to_string(),
                    line_start: line,
                    line_end: line,
                    paragraph: String::new(),
                });
            }
        }
    }

    /// Entries named by capture group 1, located at the capture
    fn named(&self, re: &Regex, slice: &str, base: usize, mut push: impl FnMut(String, usize)) {
        for caps in re.captures_iter(slice) {
            let Some(name) = caps.get(1) else { continue };
            push(name.as_str().to_uppercase(), self.line_of(base + name.start()));
        }
    }

    fn keyword_entries(
        &self,
        re: &Regex,
        name: &str,
        slice: &str,
        base: usize,
        category: IndexCategory,
        out: &mut Vec<IndexEntry>,
    ) {
        for m in re.find_iter(slice) {
            out.push(IndexEntry::new(
                name,
                category,
                self.line_of_skipping_newline(base + m.start()),
            ));
        }
    }

    fn exec_blocks(&self, index: &mut StructuralIndex) {
        for caps in EXEC_RE.captures_iter(self.text) {
            let Some(block) = caps.get(1) else { continue };
            let head = block.as_str().chars().take(15).collect::<String>().to_uppercase();
            let exec_type = if head.contains("SQL") { "EXEC-SQL" } else { "EXEC-CICS" };
            let line_start = self.line_of_skipping_newline(block.start());
            let line_end = self.line_of(block.end().saturating_sub(1));
            index.exec_statements.push(StatementEntry {
                statement_type: exec_type.to_string(),
                line_start,
                line_end: line_end.max(line_start),
                paragraph: String::new(),
            });
        }
    }
}

/// Sort every category, assign spans and paragraph containment
fn finalize(index: &mut StructuralIndex) {
    let total = index.total_lines;

    for entries in [
        &mut index.divisions,
        &mut index.sections,
        &mut index.paragraphs,
        &mut index.copybooks,
        &mut index.data_items_01,
        &mut index.data_items_all,
        &mut index.id_division_entries,
        &mut index.file_entries,
    ] {
        entries.sort_by_key(|e| e.line_start);
    }
    index.statements.sort_by_key(|s| s.line_start);
    index.exec_statements.sort_by_key(|s| s.line_start);

    assign_spans(&mut index.divisions, |_| None, total);

    let divisions: Vec<(usize, usize, bool)> = index
        .divisions
        .iter()
        .map(|d| (d.line_start, d.line_end, d.name.contains("PROCEDURE")))
        .collect();
    let division_end = |line: usize| {
        divisions
            .iter()
            .find(|(s, e, _)| *s <= line && line <= *e)
            .map(|(_, e, _)| *e)
    };
    assign_spans(&mut index.sections, division_end, total);

    let procedure = divisions.iter().find(|(_, _, is_proc)| *is_proc).copied();
    let proc_sections: Vec<(usize, usize)> = match procedure {
        Some((ps, pe, _)) => index
            .sections
            .iter()
            .filter(|s| ps <= s.line_start && s.line_start <= pe)
            .map(|s| (s.line_start, s.line_end))
            .collect(),
        None => Vec::new(),
    };
    assign_spans(
        &mut index.paragraphs,
        |line| enclosing_end(&proc_sections, line).or(procedure.map(|(_, e, _)| e)),
        total,
    );

    for entries in [
        &mut index.copybooks,
        &mut index.data_items_01,
        &mut index.data_items_all,
        &mut index.id_division_entries,
        &mut index.file_entries,
    ] {
        for entry in entries.iter_mut() {
            entry.line_end = entry.line_start;
        }
    }

    let paragraph_starts: Vec<(usize, &str)> = index
        .paragraphs
        .iter()
        .map(|p| (p.line_start, p.name.as_str()))
        .collect();
    let containing = |line: usize| -> String {
        let idx = paragraph_starts.partition_point(|(start, _)| *start <= line);
        idx.checked_sub(1)
            .map(|i| paragraph_starts[i].1.to_string())
            .unwrap_or_default()
    };
    for stmt in index
        .statements
        .iter_mut()
        .chain(index.exec_statements.iter_mut())
    {
        stmt.paragraph = containing(stmt.line_start);
    }
}

/// End line of the span in `spans` (disjoint, sorted by start) that contains `line`
fn enclosing_end(spans: &[(usize, usize)], line: usize) -> Option<usize> {
    let idx = spans.partition_point(|(start, _)| *start <= line);
    idx.checked_sub(1)
        .map(|i| spans[i].1)
        .filter(|end| line <= *end)
}

/// `line_end` of each entry is the line before the next entry, unless the next entry
/// lies beyond the enclosing container, in which case the container's end is used.
fn assign_spans(
    entries: &mut [IndexEntry],
    container_end: impl Fn(usize) -> Option<usize>,
    total: usize,
) {
    for i in 0..entries.len() {
        let start = entries[i].line_start;
        let limit = container_end(start).unwrap_or(total);
        let end = match entries.get(i + 1) {
            Some(next) if next.line_start <= limit => next.line_start.saturating_sub(1),
            _ => limit,
        };
        entries[i].line_end = end.max(start);
    }
}
