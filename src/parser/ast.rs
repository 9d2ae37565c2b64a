//! Program tree for a parsed COBOL source.
//!
//! This is the structure the cache persists. Source lines are kept alongside for
//! body extraction but are never serialized; a program loaded from cache has none
//! until the caller re-attaches them with [`CobolProgram::with_source_lines`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Span of a node in the (preprocessed) source, 1-based and inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line_start: usize,
    pub line_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl SourceLocation {
    /// Whole-line span
    pub fn lines(line_start: usize, line_end: usize) -> Self {
        Self {
            line_start,
            line_end,
            col_start: 0,
            col_end: 0,
        }
    }

    pub fn line_count(&self) -> usize {
        if self.line_start == 0 || self.line_end < self.line_start {
            0
        } else {
            self.line_end - self.line_start + 1
        }
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.line_start <= line && line <= self.line_end
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lines {}-{}", self.line_start, self.line_end)
    }
}

/// Resolution state of a COPY reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopybookStatus {
    Resolved,
    #[default]
    Unresolved,
    /// Found on disk but could not be read
    Error,
}

impl fmt::Display for CopybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CopybookStatus::Resolved => "resolved",
            CopybookStatus::Unresolved => "unresolved",
            CopybookStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl CopybookStatus {
    pub fn from_string(s: &str) -> Option<CopybookStatus> {
        match s.to_lowercase().as_str() {
            "resolved" => Some(CopybookStatus::Resolved),
            "unresolved" => Some(CopybookStatus::Unresolved),
            "error" => Some(CopybookStatus::Error),
            _ => None,
        }
    }
}

/// A COPY statement found in a program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopybookRef {
    pub name: String,
    /// Line of the COPY statement
    pub line: usize,
    /// `OF`/`IN` library qualifier
    pub library: Option<String>,
    pub resolved_path: Option<PathBuf>,
    /// Raw REPLACING operands, trimmed
    pub replacing: Option<String>,
    pub status: CopybookStatus,
}

impl CopybookRef {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    pub name: String,
    pub level: u8,
    pub location: SourceLocation,
    pub pic: Option<String>,
    pub usage: Option<String>,
    pub value: Option<String>,
    pub occurs: Option<u32>,
    pub redefines: Option<String>,
    pub children: Vec<DataItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement keyword (MOVE, PERFORM, END-IF, EXEC-SQL, ...)
    pub kind: String,
    pub location: SourceLocation,
    pub target: Option<String>,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub name: String,
    pub location: SourceLocation,
    pub statements: Vec<Statement>,
    /// PERFORM and GO TO targets
    pub performs: Vec<String>,
    pub calls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub location: SourceLocation,
    pub paragraphs: Vec<Paragraph>,
    pub data_items: Vec<DataItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    pub name: String,
    pub location: SourceLocation,
    pub sections: Vec<Section>,
    /// Paragraphs not inside any section
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub line: usize,
    /// `*>` comment trailing code, as opposed to a whole comment line
    pub is_inline: bool,
}

/// A parsed COBOL program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CobolProgram {
    pub program_id: String,
    pub source_path: Option<PathBuf>,
    /// SHA-256 of the original source bytes
    pub source_hash: String,
    pub lines: usize,
    pub divisions: Vec<Division>,
    pub copybook_refs: Vec<CopybookRef>,
    pub comments: Vec<Comment>,
    #[serde(skip)]
    pub source_lines: Vec<String>,
}

/// Closed set of tree node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Division,
    Section,
    Paragraph,
    DataItem,
    Statement,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Division => "division",
            NodeKind::Section => "section",
            NodeKind::Paragraph => "paragraph",
            NodeKind::DataItem => "data_item",
            NodeKind::Statement => "statement",
        };
        write!(f, "{}", s)
    }
}

/// Borrowed view of any tree node
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Division(&'a Division),
    Section(&'a Section),
    Paragraph(&'a Paragraph),
    DataItem(&'a DataItem),
    Statement(&'a Statement),
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Division(_) => NodeKind::Division,
            Node::Section(_) => NodeKind::Section,
            Node::Paragraph(_) => NodeKind::Paragraph,
            Node::DataItem(_) => NodeKind::DataItem,
            Node::Statement(_) => NodeKind::Statement,
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            Node::Division(d) => &d.name,
            Node::Section(s) => &s.name,
            Node::Paragraph(p) => &p.name,
            Node::DataItem(d) => &d.name,
            Node::Statement(s) => &s.kind,
        }
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            Node::Division(d) => d.location,
            Node::Section(s) => s.location,
            Node::Paragraph(p) => p.location,
            Node::DataItem(d) => d.location,
            Node::Statement(s) => s.location,
        }
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<Node<'a>> {
        match *self {
            Node::Division(d) => {
                let mut out: Vec<Node<'a>> = d.sections.iter().map(Node::Section).collect();
                out.extend(d.paragraphs.iter().map(Node::Paragraph));
                out.sort_by_key(|n| n.location().line_start);
                out
            }
            Node::Section(s) => {
                let mut out: Vec<Node<'a>> = s.data_items.iter().map(Node::DataItem).collect();
                out.extend(s.paragraphs.iter().map(Node::Paragraph));
                out
            }
            Node::Paragraph(p) => p.statements.iter().map(Node::Statement).collect(),
            Node::DataItem(d) => d.children.iter().map(Node::DataItem).collect(),
            Node::Statement(_) => Vec::new(),
        }
    }
}

impl CobolProgram {
    /// Attach source lines for body extraction (they are not cached)
    pub fn with_source_lines(mut self, source: &str) -> Self {
        self.source_lines = source.split('\n').map(str::to_string).collect();
        self
    }

    /// Division by exact or partial name ("PROCEDURE" finds "PROCEDURE DIVISION")
    pub fn get_division(&self, name: &str) -> Option<&Division> {
        let wanted = name.to_uppercase();
        self.divisions
            .iter()
            .find(|d| d.name.to_uppercase() == wanted)
            .or_else(|| {
                self.divisions
                    .iter()
                    .find(|d| d.name.to_uppercase().contains(&wanted))
            })
    }

    pub fn all_sections(&self) -> Vec<&Section> {
        self.divisions.iter().flat_map(|d| d.sections.iter()).collect()
    }

    pub fn procedure_sections(&self) -> Vec<&Section> {
        self.get_division("PROCEDURE")
            .map(|d| d.sections.iter().collect())
            .unwrap_or_default()
    }

    /// Every PROCEDURE DIVISION paragraph, in source order
    pub fn all_paragraphs(&self) -> Vec<&Paragraph> {
        let Some(proc_div) = self.get_division("PROCEDURE") else {
            return Vec::new();
        };
        let mut paragraphs: Vec<&Paragraph> = proc_div.paragraphs.iter().collect();
        paragraphs.extend(proc_div.sections.iter().flat_map(|s| s.paragraphs.iter()));
        paragraphs.sort_by_key(|p| p.location.line_start);
        paragraphs
    }

    pub fn get_paragraph(&self, name: &str) -> Option<&Paragraph> {
        let wanted = name.to_uppercase();
        self.all_paragraphs()
            .into_iter()
            .find(|p| p.name.to_uppercase() == wanted)
    }

    /// WORKING-STORAGE items, optionally restricted to one level
    pub fn working_storage_items(&self, level: Option<u8>) -> Vec<&DataItem> {
        let Some(data_div) = self.get_division("DATA") else {
            return Vec::new();
        };
        data_div
            .sections
            .iter()
            .filter(|s| s.name.to_uppercase().contains("WORKING-STORAGE"))
            .flat_map(|s| s.data_items.iter())
            .filter(|d| level.map_or(true, |l| d.level == l))
            .collect()
    }

    /// Source text covered by `location` (empty when no source lines are attached)
    pub fn get_body(&self, location: &SourceLocation) -> String {
        if self.source_lines.is_empty() || location.line_start == 0 {
            return String::new();
        }
        let start = (location.line_start - 1).min(self.source_lines.len());
        let end = location.line_end.clamp(start, self.source_lines.len());
        self.source_lines[start..end].join("\n")
    }

    /// Pre-order walk over every node of the tree
    pub fn walk(&self) -> Vec<Node<'_>> {
        let mut out = Vec::new();
        let mut stack: Vec<Node<'_>> = self.divisions.iter().rev().map(Node::Division).collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<Node<'_>> {
        self.walk().into_iter().filter(|n| n.kind() == kind).collect()
    }
}

impl fmt::Display for CobolProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} lines, {} divisions, {} copybooks)",
            self.program_id,
            self.lines,
            self.divisions.len(),
            self.copybook_refs.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> CobolProgram {
        let para = |name: &str, start, end| Paragraph {
            name: name.to_string(),
            location: SourceLocation::lines(start, end),
            statements: vec![Statement {
                kind: "DISPLAY".into(),
                location: SourceLocation::lines(start + 1, start + 1),
                ..Default::default()
            }],
            ..Default::default()
        };

        CobolProgram {
            program_id: "DEMO".into(),
            lines: 12,
            divisions: vec![
                Division {
                    name: "DATA DIVISION".into(),
                    location: SourceLocation::lines(1, 5),
                    sections: vec![Section {
                        name: "WORKING-STORAGE SECTION".into(),
                        location: SourceLocation::lines(2, 5),
                        data_items: vec![
                            DataItem {
                                name: "WS-A".into(),
                                level: 1,
                                location: SourceLocation::lines(3, 3),
                                ..Default::default()
                            },
                            DataItem {
                                name: "WS-B".into(),
                                level: 77,
                                location: SourceLocation::lines(4, 4),
                                ..Default::default()
                            },
                        ],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                Division {
                    name: "PROCEDURE DIVISION".into(),
                    location: SourceLocation::lines(6, 12),
                    sections: vec![Section {
                        name: "LATE SECTION".into(),
                        location: SourceLocation::lines(10, 12),
                        paragraphs: vec![para("LATE-PARA", 11, 12)],
                        ..Default::default()
                    }],
                    paragraphs: vec![para("EARLY-PARA", 7, 9)],
                },
            ],
            ..Default::default()
        }
        .with_source_lines("L1\nL2\nL3\nL4\nL5\nL6\nL7\nL8\nL9\nL10\nL11\nL12")
    }

    #[test]
    fn test_get_division_partial_match() {
        let program = sample_program();
        assert_eq!(
            program.get_division("procedure").map(|d| d.name.as_str()),
            Some("PROCEDURE DIVISION")
        );
        assert!(program.get_division("ENVIRONMENT").is_none());
    }

    #[test]
    fn test_all_paragraphs_in_source_order() {
        let program = sample_program();
        let names: Vec<&str> = program.all_paragraphs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["EARLY-PARA", "LATE-PARA"]);
        assert!(program.get_paragraph("late-para").is_some());
        assert_eq!(program.procedure_sections().len(), 1);
        assert_eq!(program.all_sections().len(), 2);
    }

    #[test]
    fn test_working_storage_level_filter() {
        let program = sample_program();
        assert_eq!(program.working_storage_items(None).len(), 2);
        let level77 = program.working_storage_items(Some(77));
        assert_eq!(level77.len(), 1);
        assert_eq!(level77[0].name, "WS-B");
    }

    #[test]
    fn test_get_body_clamps_and_joins() {
        let program = sample_program();
        assert_eq!(program.get_body(&SourceLocation::lines(2, 3)), "L2\nL3");
        assert_eq!(program.get_body(&SourceLocation::lines(11, 40)), "L11\nL12");
        assert_eq!(program.get_body(&SourceLocation::lines(0, 0)), "");

        let detached = CobolProgram {
            source_lines: Vec::new(),
            ..sample_program()
        };
        assert_eq!(detached.get_body(&SourceLocation::lines(1, 2)), "");
    }

    #[test]
    fn test_walk_is_preorder_and_kinds_filter() {
        let program = sample_program();
        let names: Vec<&str> = program.walk().iter().map(|n| n.name()).collect();
        assert_eq!(names[0], "DATA DIVISION");
        assert_eq!(names[1], "WORKING-STORAGE SECTION");
        assert_eq!(names[2], "WS-A");

        let paragraphs = program.nodes_of_kind(NodeKind::Paragraph);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].name(), "EARLY-PARA", "Division children follow line order");
        assert_eq!(program.nodes_of_kind(NodeKind::Statement).len(), 2);
    }

    #[test]
    fn test_source_lines_are_not_serialized() {
        let program = sample_program();
        let json = serde_json::to_value(&program).unwrap();
        assert!(json.get("source_lines").is_none());
        let back: CobolProgram = serde_json::from_value(json).unwrap();
        assert!(back.source_lines.is_empty());
        assert_eq!(back.divisions, program.divisions);
    }

    #[test]
    fn test_copybook_status_strings() {
        assert_eq!(CopybookStatus::default(), CopybookStatus::Unresolved);
        assert_eq!(CopybookStatus::from_string("RESOLVED"), Some(CopybookStatus::Resolved));
        assert_eq!(CopybookStatus::Error.to_string(), "error");
    }
}
