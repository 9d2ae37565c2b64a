//! Line coverage of a source by the structural index.
//!
//! Every line is classified as blank, comment or code; code lines are covered when some
//! index entry starts on them (EXEC blocks cover their whole span). Uncovered code lines
//! are where the regex indexer sees nothing and a grammar parse would be needed.

use crate::parser::indexer::{IndexEntry, StructuralIndex, StructuralIndexer};
use crate::utils::file_utils::read_file_lossy;
use crate::utils::line_index::normalize_line_endings;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// Covered and uncovered lines, with the covering component of each
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub total_lines: usize,
    /// Code lines with at least one index entry
    pub covered_lines: BTreeSet<usize>,
    pub uncovered_lines: BTreeSet<usize>,
    pub comment_lines: BTreeSet<usize>,
    /// Empty, whitespace-only and sequence-number-only lines
    pub blank_lines: BTreeSet<usize>,

    pub division_lines: BTreeSet<usize>,
    pub section_lines: BTreeSet<usize>,
    pub paragraph_lines: BTreeSet<usize>,
    pub statement_lines: BTreeSet<usize>,
    pub data_item_lines: BTreeSet<usize>,
    /// PROGRAM-ID, AUTHOR, DATE-WRITTEN, DATE-COMPILED
    pub id_entry_lines: BTreeSet<usize>,
    /// FILE-CONTROL, SELECT/FD/SD and their clauses
    pub file_entry_lines: BTreeSet<usize>,
    pub copybook_lines: BTreeSet<usize>,
    /// Every line of EXEC SQL/CICS blocks
    pub exec_lines: BTreeSet<usize>,
}

impl CoverageReport {
    /// Classify `source_lines` (the lines `index` was computed from) against `index`
    pub fn from_index(index: &StructuralIndex, source_lines: &[&str]) -> Self {
        let mut report = CoverageReport {
            total_lines: source_lines.len(),
            ..Default::default()
        };

        for (i, line) in source_lines.iter().enumerate() {
            match classify(line) {
                LineKind::Blank => report.blank_lines.insert(i + 1),
                LineKind::Comment => report.comment_lines.insert(i + 1),
                LineKind::Code => false,
            };
        }

        report.division_lines = starts(&index.divisions);
        report.section_lines = starts(&index.sections);
        report.paragraph_lines = starts(&index.paragraphs);
        report.data_item_lines = starts(&index.data_items_all);
        report.id_entry_lines = starts(&index.id_division_entries);
        report.file_entry_lines = starts(&index.file_entries);
        report.copybook_lines = starts(&index.copybooks);
        report.statement_lines = index.statements.iter().map(|s| s.line_start).collect();
        report.exec_lines = index
            .exec_statements
            .iter()
            .flat_map(|s| s.line_start..=s.line_end)
            .collect();

        let components = [
            &report.division_lines,
            &report.section_lines,
            &report.paragraph_lines,
            &report.statement_lines,
            &report.data_item_lines,
            &report.id_entry_lines,
            &report.file_entry_lines,
            &report.copybook_lines,
            &report.exec_lines,
        ];
        for line in 1..=report.total_lines {
            if report.blank_lines.contains(&line) || report.comment_lines.contains(&line) {
                continue;
            }
            if components.iter().any(|c| c.contains(&line)) {
                report.covered_lines.insert(line);
            } else {
                report.uncovered_lines.insert(line);
            }
        }

        report
    }

    /// Lines that are neither comments nor blank
    pub fn code_lines(&self) -> usize {
        self.total_lines - self.comment_lines.len() - self.blank_lines.len()
    }

    /// Covered share of code lines; 100 when there is no code
    pub fn coverage_percent(&self) -> f64 {
        match self.code_lines() {
            0 => 100.0,
            code => self.covered_lines.len() as f64 * 100.0 / code as f64,
        }
    }

    /// Uncovered lines folded into inclusive `(first, last)` runs
    pub fn uncovered_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for &line in &self.uncovered_lines {
            match ranges.last_mut() {
                Some((_, last)) if *last + 1 == line => *last = line,
                _ => ranges.push((line, line)),
            }
        }
        ranges
    }

    /// `Uncovered lines (n): 3, 7-9`
    pub fn uncovered_list(&self) -> String {
        if self.uncovered_lines.is_empty() {
            return "No uncovered lines.".to_string();
        }
        let ranges: Vec<String> = self
            .uncovered_ranges()
            .into_iter()
            .map(|(first, last)| {
                if first == last {
                    first.to_string()
                } else {
                    format!("{}-{}", first, last)
                }
            })
            .collect();
        format!(
            "Uncovered lines ({}): {}",
            self.uncovered_lines.len(),
            ranges.join(", ")
        )
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total lines: {}", self.total_lines)?;
        writeln!(f, "Code lines: {}", self.code_lines())?;
        writeln!(f, "  - Comment lines: {}", self.comment_lines.len())?;
        writeln!(f, "  - Blank lines: {}", self.blank_lines.len())?;
        writeln!(f, "Covered lines: {}", self.covered_lines.len())?;
        writeln!(f, "Uncovered lines: {}", self.uncovered_lines.len())?;
        writeln!(f, "Coverage: {:.1}%", self.coverage_percent())?;
        writeln!(f)?;
        writeln!(f, "Breakdown by component:")?;
        writeln!(f, "  - Division headers: {}", self.division_lines.len())?;
        writeln!(f, "  - Section headers: {}", self.section_lines.len())?;
        writeln!(f, "  - Paragraph headers: {}", self.paragraph_lines.len())?;
        writeln!(f, "  - Statements: {}", self.statement_lines.len())?;
        writeln!(f, "  - Data items: {}", self.data_item_lines.len())?;
        writeln!(f, "  - ID entries (PROGRAM-ID, etc.): {}", self.id_entry_lines.len())?;
        writeln!(f, "  - File entries (SELECT, FD): {}", self.file_entry_lines.len())?;
        writeln!(f, "  - Copybook refs: {}", self.copybook_lines.len())?;
        write!(f, "  - EXEC SQL/CICS: {}", self.exec_lines.len())
    }
}

fn starts(entries: &[IndexEntry]) -> BTreeSet<usize> {
    entries.iter().map(|e| e.line_start).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    Code,
}

fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() || is_sequence_number_only(line) {
        LineKind::Blank
    } else if matches!(line.as_bytes().get(6), Some(b'*') | Some(b'/')) || trimmed.starts_with('*')
    {
        // Indicator column, floating `*>` and free-format `*` comments
        LineKind::Comment
    } else {
        LineKind::Code
    }
}

/// Sequence area (columns 1-6) holding a number and nothing after it
fn is_sequence_number_only(line: &str) -> bool {
    let Some(sequence) = line.get(..6) else {
        return false;
    };
    sequence.bytes().all(|b| b.is_ascii_digit() || b == b' ')
        && sequence.bytes().any(|b| b.is_ascii_digit())
        && line[6..].trim().is_empty()
}

/// Measures how much of a source the structural index accounts for
#[derive(Debug, Clone, Default)]
pub struct CoverageAnalyzer {
    indexer: StructuralIndexer,
}

impl CoverageAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indexer(indexer: StructuralIndexer) -> Self {
        Self { indexer }
    }

    /// Index `source` as written (no COPY expansion) and report its coverage
    pub fn analyze(&self, source: &str) -> CoverageReport {
        let text = normalize_line_endings(source);
        let index = self.indexer.index(&text);
        let lines: Vec<&str> = text.split('\n').collect();
        CoverageReport::from_index(&index, &lines)
    }

    /// Read (lossy UTF-8) and analyze a file
    pub fn analyze_file(&self, path: &Path) -> Result<CoverageReport> {
        let source = read_file_lossy(path)?;
        Ok(self.analyze(&source))
    }
}
