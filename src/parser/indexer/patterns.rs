//! Regex patterns for structural indexing, compiled once.
//!
//! Every structural pattern is anchored at a line start and carries an optional
//! legacy-column prefix so a single pattern set covers sequence-numbered,
//! blank-padded and version-marked sources:
//! - 6-digit sequence numbers: `000100 `
//! - 6 to 8 leading blanks
//! - short version markers with optional area letter: `1.1    `, `07.141 `, `7.682A `
//!
//! The whitespace after a version marker is mandatory; that is what separates a
//! marker from code starting in column 1.

use regex::Regex;
use std::sync::LazyLock;

/// Shared legacy-column prefix
pub(super) const PREFIX: &str = r"^(?:[\d.]{1,6}[A-B]?\s+|[\s]{6,8})?";

fn structural(body: &str) -> Regex {
    Regex::new(&format!("(?im){}{}", PREFIX, body)).unwrap()
}

pub(super) static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    structural(r"\s*(IDENTIFICATION|ID|ENVIRONMENT|DATA|PROCEDURE)\s+DIVISION")
});

pub(super) static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| structural(r"\s*([A-Z0-9][A-Z0-9-]*)\s+SECTION\s*\.?"));

/// Area A name followed by a period and nothing else on the line
pub(super) static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| structural(r"([A-Z0-9][A-Z0-9-]{0,29})\s*\.\s*$"));

pub(super) static COPY_RE: LazyLock<Regex> =
    LazyLock::new(|| structural(r#"\s*COPY\s+['"]?([A-Z][A-Z0-9-]*)['"]?"#));

pub(super) static LEVEL_01_RE: LazyLock<Regex> =
    LazyLock::new(|| structural(r"\s*01\s+([A-Z][A-Z0-9-]*)"));

/// Levels 01-49, 66, 77 and 88
pub(super) static DATA_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    structural(r"\s*(0[1-9]|[1-4][0-9]|66|77|88)\s+([A-Z][A-Z0-9-]*|FILLER)")
});

pub(super) static PROGRAM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| structural(r"\s*PROGRAM-ID\s*[.\s]+([A-Z][A-Z0-9-]*)"));

/// IDENTIFICATION DIVISION paragraphs without a captured value
pub(super) static ID_ENTRY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ["AUTHOR", "DATE-WRITTEN", "DATE-COMPILED"]
        .into_iter()
        .map(|kw| (kw, structural(&format!(r"\s*{}\s*[.\s]+", kw))))
        .collect()
});

pub(super) static FILE_CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| structural(r"\s*FILE-CONTROL\s*\.?"));

/// SELECT / FD / SD with the file name captured
pub(super) static FILE_ENTRY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| {
        ["SELECT", "FD", "SD"]
            .into_iter()
            .map(|kw| (kw, structural(&format!(r"\s*{}\s+([A-Z][A-Z0-9-]*)", kw))))
            .collect()
    });

/// SELECT clause continuations
pub(super) static FILE_CLAUSE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| {
        [
            ("ORGANIZATION", r"\s+ORGANIZATION\s+"),
            ("ACCESS", r"\s+ACCESS\s+MODE\s+"),
            ("RECORD-KEY", r"\s+RECORD\s+KEY\s+"),
            ("ALTERNATE-KEY", r"\s+ALTERNATE\s+RECORD\s+KEY\s+"),
            ("FILE-STATUS", r"\s+FILE\s+STATUS\s+"),
            ("ASSIGN", r"\s+ASSIGN\s+"),
            ("RELATIVE-KEY", r"\s+RELATIVE\s+KEY\s+"),
        ]
        .into_iter()
        .map(|(name, body)| (name, structural(body)))
        .collect()
    });

/// Statement keywords recognised inside the PROCEDURE DIVISION
///
/// Kept as separate patterns rather than one alternation: a match may swallow the
/// following newline, and one shared pattern would then hide the next line's keyword.
pub(super) static STATEMENT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| {
        const KEYWORDS: &[&str] = &[
            "MOVE", "PERFORM", "CALL", "IF", "EVALUATE", "READ", "WRITE", "OPEN", "CLOSE",
            "DISPLAY", "ACCEPT", "COMPUTE", "ADD", "SUBTRACT", "MULTIPLY", "DIVIDE", "STRING",
            "UNSTRING", "INSPECT", "INITIALIZE", "SET", "STOP",
        ];
        const TAIL: &[&str] = &["RETURN", "SEARCH", "SORT", "MERGE", "START", "DELETE", "REWRITE"];

        let mut patterns: Vec<(&'static str, Regex)> = KEYWORDS
            .iter()
            .map(|kw| (*kw, structural(&format!(r"\s+{}\s+", kw))))
            .collect();
        patterns.push(("GO", structural(r"\s+GO\s+TO\s+")));
        patterns.push(("EXIT", structural(r"\s+EXIT\s*\.?")));
        patterns.push(("CONTINUE", structural(r"\s+CONTINUE\s*\.?")));
        patterns.extend(
            TAIL.iter()
                .map(|kw| (*kw, structural(&format!(r"\s+{}\s+", kw)))),
        );
        patterns
    });

/// Scope terminators and conditional phrases
pub(super) static END_STATEMENT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| {
        const TERMINATORS: &[&str] = &[
            "END-IF", "END-READ", "END-WRITE", "END-PERFORM", "END-EVALUATE", "END-CALL",
            "END-SEARCH", "END-STRING", "END-UNSTRING", "END-COMPUTE", "END-ADD",
            "END-SUBTRACT", "END-MULTIPLY", "END-DIVIDE",
        ];

        let mut patterns: Vec<(&'static str, Regex)> = TERMINATORS
            .iter()
            .map(|kw| (*kw, structural(&format!(r"\s+{}\s*\.?", kw))))
            .collect();
        patterns.extend([
            ("AT-END", structural(r"\s+AT\s+END\s+")),
            ("NOT-AT-END", structural(r"\s+NOT\s+AT\s+END\s+")),
            ("INVALID-KEY", structural(r"\s+INVALID\s+KEY\s+")),
            ("NOT-INVALID-KEY", structural(r"\s+NOT\s+INVALID\s+KEY\s+")),
            ("WHEN", structural(r"\s+WHEN\s+")),
            ("ELSE", structural(r"\s+ELSE\s*$")),
            ("THEN", structural(r"\s+THEN\s*$")),
        ]);
        patterns
    });

/// Multi-line EXEC SQL / EXEC CICS blocks
pub(super) static EXEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ims)^\d{0,6}\s+(EXEC\s+(?:SQL|CICS).*?END-EXEC)").unwrap()
});

/// Paragraph-shaped names that are never paragraphs
pub(super) const PARAGRAPH_STOPWORDS: &[&str] = &["DIVISION", "SECTION", "END", "EXIT"];
