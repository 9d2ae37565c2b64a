//! Assemble a [`CobolProgram`] tree from a structural index.
//!
//! The index only knows names and line spans; the builder nests them
//! (division → section → paragraph → statement), turns the numbered data entries into
//! item hierarchies with their PIC/VALUE/OCCURS clauses, and fills each paragraph's
//! control-flow targets from the chunk analyzer.

use crate::parser::ast::{
    CobolProgram, Comment, CopybookRef, DataItem, Division, Paragraph, Section, SourceLocation,
    Statement,
};
use crate::parser::chunk_analyzer::ChunkAnalyzer;
use crate::parser::indexer::{IndexEntry, StatementEntry, StructuralIndex};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

pub const UNKNOWN_PROGRAM_ID: &str = "UNKNOWN";

const WORKING_STORAGE: &str = "WORKING-STORAGE SECTION";

static PROGRAM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPROGRAM-ID\s*[.\s]\s*([A-Z][A-Z0-9-]*)").unwrap());

static PIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPIC(?:TURE)?\s+(?:IS\s+)?(\S+?)\.?(?:\s|$)").unwrap());

static VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bVALUES?\s+(?:IS\s+|ARE\s+)?('[^']*'|"[^"]*"|\S+?)\.?(?:\s|$)"#).unwrap()
});

static OCCURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bOCCURS\s+(\d+)").unwrap());

static REDEFINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bREDEFINES\s+([A-Z0-9][A-Z0-9-]*)").unwrap());

static USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(COMP(?:UTATIONAL)?(?:-[1-5])?|BINARY|PACKED-DECIMAL|INDEX|POINTER|DISPLAY)\b",
    )
    .unwrap()
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).unwrap());

/// Builds program trees; holds only the chunk analyzer and one toggle
#[derive(Debug, Clone, Copy)]
pub struct ProgramBuilder {
    analyzer: ChunkAnalyzer,
    analyze_paragraphs: bool,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            analyzer: ChunkAnalyzer::new(),
            analyze_paragraphs: true,
        }
    }

    /// Toggle filling paragraph PERFORM/CALL targets
    pub fn analyze_paragraphs(mut self, enabled: bool) -> Self {
        self.analyze_paragraphs = enabled;
        self
    }

    /// Build the program tree for `index`
    ///
    /// `source_lines` must be the lines the index was computed from.
    pub fn build(
        &self,
        index: &StructuralIndex,
        source_lines: &[String],
        source_path: Option<&Path>,
        source_hash: &str,
        copybook_refs: Vec<CopybookRef>,
    ) -> CobolProgram {
        let mut divisions: Vec<Division> = index
            .divisions
            .iter()
            .map(|d| Division {
                name: d.name.clone(),
                location: location_of(d),
                ..Default::default()
            })
            .collect();

        for entry in &index.sections {
            let section = Section {
                name: entry.name.clone(),
                location: location_of(entry),
                ..Default::default()
            };
            match divisions
                .iter_mut()
                .find(|d| d.location.contains_line(entry.line_start))
            {
                Some(division) => division.sections.push(section),
                None => debug!("Section {} is outside every division", entry.name),
            }
        }

        self.attach_data_items(&mut divisions, index, source_lines);
        self.attach_paragraphs(&mut divisions, index, source_lines);

        let program = CobolProgram {
            program_id: program_id(source_lines),
            source_path: source_path.map(Path::to_path_buf),
            source_hash: source_hash.to_string(),
            lines: index.total_lines,
            divisions,
            copybook_refs,
            comments: collect_comments(source_lines),
            source_lines: source_lines.to_vec(),
        };

        debug!(
            "Built program {}: {} divisions, {} paragraphs, {} comments",
            program.program_id,
            program.divisions.len(),
            program.all_paragraphs().len(),
            program.comments.len()
        );
        program
    }

    fn attach_data_items(
        &self,
        divisions: &mut [Division],
        index: &StructuralIndex,
        source_lines: &[String],
    ) {
        let Some(data_div) = divisions
            .iter_mut()
            .find(|d| d.name == "DATA DIVISION")
        else {
            return;
        };

        // Items grouped per owning section; `None` for items outside every section.
        let mut grouped: Vec<(Option<usize>, Vec<DataItem>)> = Vec::new();
        for (i, entry) in index.data_items_all.iter().enumerate() {
            if !data_div.location.contains_line(entry.line_start) {
                continue;
            }
            let next_start = index
                .data_items_all
                .get(i + 1)
                .map(|n| n.line_start)
                .unwrap_or(usize::MAX);
            let Some(item) = parse_data_item(entry, next_start, source_lines) else {
                continue;
            };
            let owner = data_div
                .sections
                .iter()
                .position(|s| s.location.contains_line(entry.line_start));
            match grouped.iter_mut().find(|(o, _)| *o == owner) {
                Some((_, items)) => items.push(item),
                None => grouped.push((owner, vec![item])),
            }
        }

        for (owner, flat) in grouped {
            let tree = nest_items(flat);
            let section_idx = match owner {
                Some(idx) => idx,
                None => working_storage_index(data_div),
            };
            data_div.sections[section_idx].data_items.extend(tree);
        }
    }

    fn attach_paragraphs(
        &self,
        divisions: &mut [Division],
        index: &StructuralIndex,
        source_lines: &[String],
    ) {
        let Some(proc_div) = divisions
            .iter_mut()
            .find(|d| d.name == "PROCEDURE DIVISION")
        else {
            return;
        };

        for entry in &index.paragraphs {
            let location = location_of(entry);
            let mut statements: Vec<Statement> = within(&index.statements, &location)
                .iter()
                .chain(within(&index.exec_statements, &location))
                .map(|s| self.statement(s, source_lines))
                .collect();
            statements.sort_by_key(|s| s.location.line_start);

            let (performs, calls) = if self.analyze_paragraphs {
                let analysis =
                    self.analyzer
                        .analyze_range(source_lines, entry.line_start, entry.line_end);
                (analysis.performs, analysis.calls)
            } else {
                (Vec::new(), Vec::new())
            };

            let paragraph = Paragraph {
                name: entry.name.clone(),
                location,
                statements,
                performs,
                calls,
            };

            // Sections are disjoint and ordered, so only the last one starting at or
            // before the paragraph can contain it.
            let owner = proc_div
                .sections
                .partition_point(|s| s.location.line_start <= entry.line_start)
                .checked_sub(1)
                .filter(|&i| proc_div.sections[i].location.contains_line(entry.line_start));
            match owner {
                Some(i) => proc_div.sections[i].paragraphs.push(paragraph),
                None => proc_div.paragraphs.push(paragraph),
            }
        }
    }

    fn statement(&self, entry: &StatementEntry, source_lines: &[String]) -> Statement {
        let location = SourceLocation::lines(entry.line_start, entry.line_end);
        let target = match entry.statement_type.as_str() {
            "PERFORM" | "GO" => {
                let analysis = self
                    .analyzer
                    .analyze_range(source_lines, entry.line_start, entry.line_start);
                analysis.performs.into_iter().next()
            }
            "CALL" => {
                let analysis = self
                    .analyzer
                    .analyze_range(source_lines, entry.line_start, entry.line_start);
                analysis.calls.into_iter().next()
            }
            "MOVE" => {
                let analysis = self
                    .analyzer
                    .analyze_range(source_lines, entry.line_start, entry.line_start);
                analysis.moves.into_iter().next().map(|(_, to)| to)
            }
            _ => None,
        };
        Statement {
            kind: entry.statement_type.clone(),
            location,
            target,
            arguments: Vec::new(),
        }
    }
}

fn location_of(entry: &IndexEntry) -> SourceLocation {
    SourceLocation::lines(entry.line_start, entry.line_end)
}

/// Statements starting inside `location`; `statements` must be sorted by start line
fn within<'a>(
    statements: &'a [StatementEntry],
    location: &SourceLocation,
) -> &'a [StatementEntry] {
    let from = statements.partition_point(|s| s.line_start < location.line_start);
    let to = statements.partition_point(|s| s.line_start <= location.line_end);
    &statements[from..to.max(from)]
}

/// Index of the WORKING-STORAGE section, appending an empty one (at line 0) if absent
fn working_storage_index(data_div: &mut Division) -> usize {
    if let Some(idx) = data_div.sections.iter().position(|s| s.name == WORKING_STORAGE) {
        return idx;
    }
    data_div.sections.push(Section {
        name: WORKING_STORAGE.to_string(),
        location: SourceLocation::lines(0, 0),
        ..Default::default()
    });
    data_div.sections.len() - 1
}

/// First PROGRAM-ID name outside comment lines
fn program_id(source_lines: &[String]) -> String {
    source_lines
        .iter()
        .filter(|line| !is_comment_line(line))
        .find_map(|line| PROGRAM_ID_RE.captures(line))
        .map(|caps| caps[1].to_uppercase())
        .unwrap_or_else(|| UNKNOWN_PROGRAM_ID.to_string())
}

fn is_comment_line(line: &str) -> bool {
    matches!(line.as_bytes().get(6), Some(b'*') | Some(b'/'))
}

/// Indicator-column comment lines and `*>` comments
fn collect_comments(source_lines: &[String]) -> Vec<Comment> {
    let mut comments = Vec::new();
    for (i, line) in source_lines.iter().enumerate() {
        let line_no = i + 1;
        if is_comment_line(line) {
            comments.push(Comment {
                text: line.get(7..).unwrap_or("").trim().to_string(),
                line: line_no,
                is_inline: false,
            });
            continue;
        }
        let Some(pos) = floating_comment_start(line) else {
            continue;
        };
        comments.push(Comment {
            text: line[pos + 2..].trim().to_string(),
            line: line_no,
            is_inline: !line[..pos].trim().is_empty(),
        });
    }
    comments
}

/// Byte offset of a `*>` that is not inside a literal
fn floating_comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'*' && bytes.get(i + 1) == Some(&b'>') => return Some(i),
            None => {}
        }
    }
    None
}

/// Data item for an index entry named `"<level> <NAME>"`, clauses read up to its period
fn parse_data_item(
    entry: &IndexEntry,
    next_item_line: usize,
    source_lines: &[String],
) -> Option<DataItem> {
    let (level, name) = entry.name.split_once(' ')?;
    let level: u8 = level.parse().ok()?;

    let mut text = String::new();
    let mut line_end = entry.line_start;
    for line_no in entry.line_start..next_item_line.min(source_lines.len() + 1) {
        let Some(line) = source_lines.get(line_no - 1) else { break };
        if is_comment_line(line) {
            continue;
        }
        line_end = line_no;
        text.push(' ');
        text.push_str(line.get(7..).unwrap_or(line));
        if ends_entry(line) {
            break;
        }
    }

    // Clauses follow the item name.
    let upper = text.to_ascii_uppercase();
    let clauses = upper
        .find(name)
        .map(|pos| &text[pos + name.len()..])
        .unwrap_or(text.as_str());
    let unquoted = QUOTED_RE.replace_all(clauses, "''");

    Some(DataItem {
        name: name.to_string(),
        level,
        location: SourceLocation::lines(entry.line_start, line_end),
        pic: PIC_RE.captures(clauses).map(|c| c[1].to_string()),
        usage: USAGE_RE.captures(&unquoted).map(|c| c[1].to_uppercase()),
        value: VALUE_RE.captures(clauses).map(|c| c[1].to_string()),
        occurs: OCCURS_RE.captures(clauses).and_then(|c| c[1].parse().ok()),
        redefines: REDEFINES_RE.captures(clauses).map(|c| c[1].to_uppercase()),
        children: Vec::new(),
    })
}

/// Whether the line carries the period closing a data entry (outside literals)
fn ends_entry(line: &str) -> bool {
    let code = line.get(7..72.min(line.len())).unwrap_or("");
    let unquoted = QUOTED_RE.replace_all(code, "''");
    unquoted.trim_end().ends_with('.') || unquoted.contains(". ")
}

/// Nest a flat run of items by level number
///
/// 01/77 start new roots, 66/88 belong to the preceding item, and other levels nest
/// under the nearest open item with a lower level.
fn nest_items(flat: Vec<DataItem>) -> Vec<DataItem> {
    let mut roots: Vec<DataItem> = Vec::new();
    // Open ancestors of the next item, outermost first.
    let mut stack: Vec<DataItem> = Vec::new();

    for item in flat {
        match item.level {
            1 | 77 => {
                close_all(&mut stack, &mut roots);
                stack.push(item);
            }
            66 | 88 => match stack.last_mut() {
                Some(parent) => parent.children.push(item),
                None => roots.push(item),
            },
            level => {
                while stack.last().is_some_and(|top| top.level >= level || top.level == 77) {
                    close_one(&mut stack, &mut roots);
                }
                stack.push(item);
            }
        }
    }
    close_all(&mut stack, &mut roots);
    roots
}

fn close_one(stack: &mut Vec<DataItem>, roots: &mut Vec<DataItem>) {
    if let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

fn close_all(stack: &mut Vec<DataItem>, roots: &mut Vec<DataItem>) {
    while !stack.is_empty() {
        close_one(stack, roots);
    }
}
