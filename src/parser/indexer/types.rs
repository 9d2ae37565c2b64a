// Structural index data types
//
// Entries are produced by the StructuralIndexer and are immutable once `index()` returns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of structural entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexCategory {
    Division,
    Section,
    Paragraph,
    Copybook,
    DataItem,
    IdEntry,
    FileEntry,
    FileClause,
}

impl fmt::Display for IndexCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexCategory::Division => "division",
            IndexCategory::Section => "section",
            IndexCategory::Paragraph => "paragraph",
            IndexCategory::Copybook => "copybook",
            IndexCategory::DataItem => "data_item",
            IndexCategory::IdEntry => "id_entry",
            IndexCategory::FileEntry => "file_entry",
            IndexCategory::FileClause => "file_clause",
        };
        write!(f, "{}", s)
    }
}

impl IndexCategory {
    pub fn from_string(s: &str) -> Option<IndexCategory> {
        match s.to_lowercase().as_str() {
            "division" => Some(IndexCategory::Division),
            "section" => Some(IndexCategory::Section),
            "paragraph" => Some(IndexCategory::Paragraph),
            "copybook" => Some(IndexCategory::Copybook),
            "data_item" => Some(IndexCategory::DataItem),
            "id_entry" => Some(IndexCategory::IdEntry),
            "file_entry" => Some(IndexCategory::FileEntry),
            "file_clause" => Some(IndexCategory::FileClause),
            _ => None,
        }
    }
}

/// A named structural entry with its line span
///
/// `line_end` is 0 until the indexer finalizes the entry; afterwards `line_end >= line_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub category: IndexCategory,
    pub line_start: usize,
    pub line_end: usize,
}

impl IndexEntry {
    pub fn new(name: impl Into<String>, category: IndexCategory, line_start: usize) -> Self {
        Self {
            name: name.into(),
            category,
            line_start,
            line_end: 0,
        }
    }

    /// Whether 1-based `line` falls within this entry
    pub fn contains_line(&self, line: usize) -> bool {
        self.line_start <= line && line <= self.line_end
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (lines {}-{})",
            self.category, self.name, self.line_start, self.line_end
        )
    }
}

/// A statement keyword occurrence (MOVE, PERFORM, END-IF, EXEC-SQL, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub statement_type: String,
    pub line_start: usize,
    pub line_end: usize,
    /// Containing paragraph name, empty when the statement precedes every paragraph
    pub paragraph: String,
}

impl fmt::Display for StatementEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.statement_type, self.line_start)
    }
}

/// Regex-derived structural index of one COBOL source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralIndex {
    pub divisions: Vec<IndexEntry>,
    pub sections: Vec<IndexEntry>,
    pub paragraphs: Vec<IndexEntry>,
    pub copybooks: Vec<IndexEntry>,
    pub data_items_01: Vec<IndexEntry>,
    /// Every numbered level (01-49, 66, 77, 88), named "<level> <NAME>"
    pub data_items_all: Vec<IndexEntry>,
    pub statements: Vec<StatementEntry>,
    /// PROGRAM-ID, AUTHOR, DATE-WRITTEN, DATE-COMPILED
    pub id_division_entries: Vec<IndexEntry>,
    /// FILE-CONTROL, SELECT/FD/SD and SELECT clauses
    pub file_entries: Vec<IndexEntry>,
    pub exec_statements: Vec<StatementEntry>,
    pub total_lines: usize,
}

impl StructuralIndex {
    pub fn division_names(&self) -> Vec<&str> {
        self.divisions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn paragraph_names(&self) -> Vec<&str> {
        self.paragraphs.iter().map(|p| p.name.as_str()).collect()
    }

    /// Entries for a category (level-01 items stand in for `DataItem`)
    pub fn entries(&self, category: IndexCategory) -> Vec<&IndexEntry> {
        match category {
            IndexCategory::Division => self.divisions.iter().collect(),
            IndexCategory::Section => self.sections.iter().collect(),
            IndexCategory::Paragraph => self.paragraphs.iter().collect(),
            IndexCategory::Copybook => self.copybooks.iter().collect(),
            IndexCategory::DataItem => self.data_items_01.iter().collect(),
            IndexCategory::IdEntry => self.id_division_entries.iter().collect(),
            IndexCategory::FileEntry | IndexCategory::FileClause => self
                .file_entries
                .iter()
                .filter(|e| e.category == category)
                .collect(),
        }
    }

    /// Case-insensitive lookup of the first entry with `name` in `category`
    pub fn get_entry(&self, name: &str, category: IndexCategory) -> Option<&IndexEntry> {
        let wanted = name.to_uppercase();
        self.entries(category)
            .into_iter()
            .find(|e| e.name.to_uppercase() == wanted)
    }

    /// Paragraph containing 1-based `line`, if any
    pub fn paragraph_at(&self, line: usize) -> Option<&IndexEntry> {
        let idx = self.paragraphs.partition_point(|p| p.line_start <= line);
        idx.checked_sub(1)
            .map(|i| &self.paragraphs[i])
            .filter(|p| p.contains_line(line))
    }

    /// Statements recorded inside the named paragraph
    pub fn statements_in(&self, paragraph: &str) -> Vec<&StatementEntry> {
        let wanted = paragraph.to_uppercase();
        self.statements
            .iter()
            .filter(|s| s.paragraph == wanted)
            .collect()
    }
}
