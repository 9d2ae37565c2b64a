//! On-demand analysis of small COBOL fragments.
//!
//! Extracts PERFORM/GO TO targets, CALL targets, MOVE pairs, IF/EVALUATE conditions
//! and hyphenated data references from a paragraph-sized chunk with a handful of
//! regexes, so per-paragraph queries never need a full parse.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Paragraph names may start with a digit (`1000-INIT`) but must contain a letter.
const PARA_NAME: &str = r"([A-Z0-9][A-Z0-9-]{0,29})";

static PERFORM_THRU_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\bPERFORM\s+{}\s+(?:THRU|THROUGH)\s+{}\b",
        PARA_NAME, PARA_NAME
    ))
    .unwrap()
});

static PERFORM_SIMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\bPERFORM\s+{}\b", PARA_NAME)).unwrap());

static GOTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\bGO\s+TO\s+{}\b", PARA_NAME)).unwrap());

static CALL_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bCALL\s+['"]([A-Z][A-Z0-9-]*)['"]"#).unwrap());

static CALL_IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCALL\s+([A-Z][A-Z0-9-]+)\b").unwrap());

static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bMOVE\s+(?:CORRESPONDING\s+|CORR\s+)?(\S+)\s+TO\s+([A-Z][A-Z0-9-]*)").unwrap()
});

static IF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bIF[ \t]+(.+?)[ \t]*(?:\bTHEN\b.*)?$").unwrap());

static EVALUATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bEVALUATE[ \t]+(.+?)[ \t]*$").unwrap());

static DATA_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Z0-9-]*(?:-[A-Z0-9]+)+)\b").unwrap());

/// Clause words that follow PERFORM without naming a paragraph
const PERFORM_KEYWORDS: &[&str] = &[
    "UNTIL", "VARYING", "TIMES", "WITH", "TEST", "BEFORE", "AFTER", "THRU", "THROUGH",
    "END-PERFORM",
];

const CALL_KEYWORDS: &[&str] = &["USING", "BY", "REFERENCE", "CONTENT", "VALUE"];

/// Reserved words never reported as data references
static COBOL_KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "IDENTIFICATION", "DIVISION", "PROGRAM-ID", "ENVIRONMENT", "DATA", "PROCEDURE",
        "WORKING-STORAGE", "SECTION", "LINKAGE", "FILE", "MOVE", "TO", "FROM", "PERFORM",
        "CALL", "USING", "BY", "REFERENCE", "CONTENT", "VALUE", "IF", "ELSE", "END-IF",
        "EVALUATE", "WHEN", "END-EVALUATE", "DISPLAY", "ACCEPT", "COMPUTE", "ADD",
        "SUBTRACT", "MULTIPLY", "DIVIDE", "STRING", "UNSTRING", "INSPECT", "REPLACING",
        "READ", "WRITE", "REWRITE", "DELETE", "START", "OPEN", "CLOSE", "INPUT", "OUTPUT",
        "I-O", "EXTEND", "GO", "STOP", "RUN", "EXIT", "CONTINUE", "INITIALIZE", "SET", "TRUE",
        "FALSE", "SPACES", "ZEROS", "HIGH-VALUES", "LOW-VALUES", "CORRESPONDING", "CORR",
        "NOT", "AND", "OR", "GREATER", "LESS", "EQUAL", "THAN", "PIC", "PICTURE", "OCCURS",
        "TIMES", "INDEXED", "REDEFINES", "FILLER", "COPY",
    ]
    .into_iter()
    .collect()
});

/// Facts extracted from one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    /// PERFORM (including THRU endpoints) and GO TO targets, first occurrence order
    pub performs: Vec<String>,
    pub calls: Vec<String>,
    /// `(source, target)` pairs
    pub moves: Vec<(String, String)>,
    /// IF conditions and EVALUATE subjects
    pub conditions: Vec<String>,
    pub data_refs: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn is_paragraph_name(name: &str) -> bool {
    name.bytes().any(|b| b.is_ascii_alphabetic()) && !PERFORM_KEYWORDS.contains(&name)
}

/// Stateless chunk analyzer; all patterns are compiled once per process
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkAnalyzer;

impl ChunkAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a chunk (case-insensitive)
    pub fn analyze(&self, chunk: &str) -> ChunkAnalysis {
        let upper = chunk.to_uppercase();

        let mut performs = extract_performs(&upper);
        for target in extract_gotos(&upper) {
            push_unique(&mut performs, target);
        }

        ChunkAnalysis {
            performs,
            calls: extract_calls(&upper),
            moves: extract_moves(&upper),
            conditions: extract_conditions(&upper),
            data_refs: extract_data_refs(&upper),
        }
    }

    /// Analyze lines `line_start..=line_end` (1-based, clamped to the available lines)
    pub fn analyze_range<S: AsRef<str>>(
        &self,
        source_lines: &[S],
        line_start: usize,
        line_end: usize,
    ) -> ChunkAnalysis {
        self.analyze(&self.get_chunk(source_lines, line_start, line_end))
    }

    /// Lines `line_start..=line_end` joined with `\n` (1-based, clamped)
    pub fn get_chunk<S: AsRef<str>>(
        &self,
        source_lines: &[S],
        line_start: usize,
        line_end: usize,
    ) -> String {
        let start = line_start.max(1) - 1;
        let end = line_end.min(source_lines.len());
        if start >= end {
            return String::new();
        }
        source_lines[start..end]
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Convenience wrapper around [`ChunkAnalyzer::analyze`]
pub fn analyze_chunk(chunk: &str) -> ChunkAnalysis {
    ChunkAnalyzer.analyze(chunk)
}

fn extract_performs(chunk: &str) -> Vec<String> {
    let mut performs = Vec::new();
    let mut thru_targets: HashSet<String> = HashSet::new();

    for caps in PERFORM_THRU_RE.captures_iter(chunk) {
        for name in [&caps[1], &caps[2]] {
            if is_paragraph_name(name) {
                push_unique(&mut performs, name.to_string());
                thru_targets.insert(name.to_string());
            }
        }
    }

    for caps in PERFORM_SIMPLE_RE.captures_iter(chunk) {
        let target = &caps[1];
        if !is_paragraph_name(target) || thru_targets.contains(target) {
            continue;
        }
        push_unique(&mut performs, target.to_string());
    }

    performs
}

fn extract_gotos(chunk: &str) -> Vec<String> {
    let mut gotos = Vec::new();
    for caps in GOTO_RE.captures_iter(chunk) {
        if caps[1].bytes().any(|b| b.is_ascii_alphabetic()) {
            push_unique(&mut gotos, caps[1].to_string());
        }
    }
    gotos
}

fn extract_calls(chunk: &str) -> Vec<String> {
    let mut calls = Vec::new();

    for caps in CALL_LITERAL_RE.captures_iter(chunk) {
        push_unique(&mut calls, caps[1].to_string());
    }

    for caps in CALL_IDENTIFIER_RE.captures_iter(chunk) {
        let Some(target) = caps.get(1) else { continue };
        // An identifier directly followed by a literal is not a call target.
        let rest = chunk[target.end()..].trim_start();
        if rest.starts_with('\'') || rest.starts_with('"') {
            continue;
        }
        if CALL_KEYWORDS.contains(&target.as_str()) {
            continue;
        }
        push_unique(&mut calls, target.as_str().to_string());
    }

    calls
}

fn extract_moves(chunk: &str) -> Vec<(String, String)> {
    MOVE_RE
        .captures_iter(chunk)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn extract_conditions(chunk: &str) -> Vec<String> {
    let mut conditions = Vec::new();
    for re in [&*IF_RE, &*EVALUATE_RE] {
        for caps in re.captures_iter(chunk) {
            // END-IF / END-EVALUATE
            let start = caps.get(0).map_or(0, |m| m.start());
            if start > 0 && chunk.as_bytes()[start - 1] == b'-' {
                continue;
            }
            let condition = caps[1].trim().trim_end_matches('.').trim();
            if !condition.is_empty() {
                conditions.push(condition.to_string());
            }
        }
    }
    conditions
}

fn extract_data_refs(chunk: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for caps in DATA_REF_RE.captures_iter(chunk) {
        let name = &caps[1];
        if COBOL_KEYWORDS.contains(name) || !name.contains('-') {
            continue;
        }
        push_unique(&mut refs, name.to_string());
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perform_forms() {
        let analysis = analyze_chunk(
            "PERFORM INIT-PARA. PERFORM PROCESS-PARA THRU PROCESS-EXIT. PERFORM VALIDATE UNTIL WS-DONE = 'Y'.",
        );
        for expected in ["INIT-PARA", "PROCESS-PARA", "PROCESS-EXIT", "VALIDATE"] {
            assert!(
                analysis.performs.contains(&expected.to_string()),
                "Missing PERFORM target {}",
                expected
            );
        }
        assert!(!analysis.performs.iter().any(|p| p == "UNTIL" || p == "THRU"));
    }

    #[test]
    fn test_perform_numeric_paragraphs_and_times() {
        let analysis = analyze_chunk(
            "           PERFORM 1000-INITIALIZE\n           PERFORM 5 TIMES\n           PERFORM UNTIL WS-EOF\n",
        );
        assert_eq!(analysis.performs, vec!["1000-INITIALIZE"]);
    }

    #[test]
    fn test_thru_endpoints_are_not_duplicated() {
        let analysis = analyze_chunk("PERFORM A-PARA THROUGH B-PARA\nPERFORM A-PARA\n");
        assert_eq!(analysis.performs, vec!["A-PARA", "B-PARA"]);
    }

    #[test]
    fn test_goto_targets_fold_into_performs() {
        let analysis = analyze_chunk("PERFORM X-PARA\nGO TO EXIT-PARA.\ngo to x-para.");
        assert_eq!(analysis.performs, vec!["X-PARA", "EXIT-PARA"]);
    }

    #[test]
    fn test_calls_literal_and_identifier() {
        let analysis = analyze_chunk(
            "CALL 'SUBPGM1' USING WS-AREA\nCALL \"SUBPGM2\"\nCALL WS-PGM-NAME USING BY REFERENCE X\nCALL 'SUBPGM1'",
        );
        assert_eq!(analysis.calls, vec!["SUBPGM1", "SUBPGM2", "WS-PGM-NAME"]);
    }

    #[test]
    fn test_moves_including_corresponding() {
        let analysis = analyze_chunk(
            "MOVE 'INVALID' TO MR-DATA\nMOVE CORRESPONDING IN-REC TO OUT-REC\nmove corr a-rec to b-rec",
        );
        assert_eq!(
            analysis.moves,
            vec![
                ("'INVALID'".to_string(), "MR-DATA".to_string()),
                ("IN-REC".to_string(), "OUT-REC".to_string()),
                ("A-REC".to_string(), "B-REC".to_string()),
            ]
        );
    }

    #[test]
    fn test_data_refs_exclude_keywords_and_plain_words() {
        let analysis =
            analyze_chunk("IF WS-EOF-FLAG = HIGH-VALUES\n  MOVE COUNTER TO WS-TOTAL\nEND-IF.");
        assert_eq!(analysis.data_refs, vec!["WS-EOF-FLAG", "WS-TOTAL"]);
    }

    #[test]
    fn test_conditions() {
        let analysis = analyze_chunk(
            "IF WS-COUNT > 10 THEN\n  DISPLAY 'BIG'\nEND-IF\nEVALUATE TRUE\nIF MR-KEY = SPACES\n",
        );
        assert_eq!(
            analysis.conditions,
            vec!["WS-COUNT > 10", "MR-KEY = SPACES", "TRUE"]
        );
    }

    #[test]
    fn test_range_helpers_clamp() {
        let lines = vec!["PERFORM A-PARA", "CALL 'X1'", "MOVE A TO B-C"];
        let analyzer = ChunkAnalyzer::new();
        assert_eq!(analyzer.get_chunk(&lines, 2, 3), "CALL 'X1'\nMOVE A TO B-C");
        assert_eq!(analyzer.get_chunk(&lines, 0, 99).lines().count(), 3);
        assert_eq!(analyzer.get_chunk(&lines, 3, 2), "");

        let analysis = analyzer.analyze_range(&lines, 2, 2);
        assert_eq!(analysis.calls, vec!["X1"]);
        assert!(analysis.performs.is_empty());
    }
}
