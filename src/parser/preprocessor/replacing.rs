//! Text substitution for `COPY ... REPLACING` and the `REPLACE` directive.

use regex::{NoExpand, Regex};
use std::sync::LazyLock;

/// `==old== BY ==new==` (either side may be empty)
static PSEUDO_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)==(.*?)==\s+BY\s+==(.*?)==").unwrap());

/// `word BY word`
static WORD_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([A-Z][A-Z0-9-]*)\s+BY\s+([A-Z][A-Z0-9-]*)").unwrap());

/// Start of a REPLACE directive in Area A/B (not a continuation of another statement)
static REPLACE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*REPLACE(?:\s|$)").unwrap());

static REPLACE_OFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*REPLACE\s+OFF\s*\.\s*$").unwrap());

/// One `old BY new` substitution
#[derive(Debug, Clone)]
pub struct Replacement {
    pub from: String,
    pub to: String,
    /// Whole-word, case-insensitive match instead of raw substring
    pub word: bool,
    /// Word-boundary matcher, built once when the operand is parsed
    pattern: Option<Regex>,
}

impl PartialEq for Replacement {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to && self.word == other.word
    }
}

impl Eq for Replacement {}

impl Replacement {
    pub fn pseudo(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            word: false,
            pattern: None,
        }
    }

    pub fn word(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let pattern = (!from.is_empty())
            .then(|| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&from))).ok())
            .flatten();
        Self {
            from,
            to: to.into(),
            word: true,
            pattern,
        }
    }

    fn apply(&self, text: &str) -> String {
        if self.from.is_empty() {
            return text.to_string();
        }
        if !self.word {
            return text.replace(&self.from, &self.to);
        }
        match &self.pattern {
            Some(re) => re.replace_all(text, NoExpand(&self.to)).into_owned(),
            None => text.to_string(),
        }
    }
}

/// Parse REPLACING operands: pseudo-text pairs first, then plain word pairs
pub fn parse_replacing(clause: &str) -> Vec<Replacement> {
    let mut replacements: Vec<Replacement> = PSEUDO_PAIR_RE
        .captures_iter(clause)
        .map(|caps| Replacement::pseudo(caps[1].trim(), caps[2].trim()))
        .collect();

    // Word pairs are looked for outside pseudo-text only.
    let without_pseudo = PSEUDO_PAIR_RE.replace_all(clause, " ");
    replacements.extend(
        WORD_PAIR_RE
            .captures_iter(&without_pseudo)
            .map(|caps| Replacement::word(&caps[1], &caps[2])),
    );
    replacements
}

/// Apply a COPY REPLACING clause to copybook content
pub fn apply_replacing(content: &str, clause: &str) -> String {
    parse_replacing(clause)
        .iter()
        .fold(content.to_string(), |text, r| r.apply(&text))
}

/// Outcome of REPLACE directive processing
#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    pub source: String,
    /// Directives seen (including `REPLACE OFF`)
    pub directives: usize,
    pub errors: Vec<String>,
}

fn is_comment_line(line: &str) -> bool {
    matches!(line.as_bytes().get(6), Some(b'*') | Some(b'/')) || line.trim_start().starts_with("*>")
}

/// Content area of a line (column 8 onward once the sequence area is blanked)
fn content_of(line: &str) -> &str {
    if line.len() > 7 && line.is_char_boundary(7) && line[..7].trim().is_empty() {
        &line[7..]
    } else {
        line
    }
}

fn as_comment(line: &str) -> String {
    format!("      *{}", content_of(line))
}

/// Apply REPLACE directives in source order
///
/// A directive's replacements affect the lines after it until the next REPLACE, which
/// supersedes them, or `REPLACE OFF.`. Directive lines are turned into comment lines
/// so line numbering is unchanged.
pub fn apply_replace_directives(source: &str) -> ReplaceOutcome {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut active: Vec<Replacement> = Vec::new();
    let mut outcome = ReplaceOutcome::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_comment_line(line) {
            out.push(line.to_string());
            i += 1;
            continue;
        }

        let content = content_of(line);
        if REPLACE_START_RE.is_match(content) {
            outcome.directives += 1;
            let first = i;
            let mut directive = content.trim().to_string();
            while !directive.trim_end().ends_with('.') && i + 1 < lines.len() {
                i += 1;
                directive.push(' ');
                directive.push_str(content_of(lines[i]).trim());
            }

            if !directive.trim_end().ends_with('.') {
                outcome.errors.push(format!(
                    "REPLACE directive at line {} is missing its terminating period",
                    first + 1
                ));
            }

            if REPLACE_OFF_RE.is_match(&directive) {
                active.clear();
            } else {
                active = PSEUDO_PAIR_RE
                    .captures_iter(&directive)
                    .map(|caps| Replacement::pseudo(caps[1].trim(), caps[2].trim()))
                    .collect();
            }

            for consumed in &lines[first..=i] {
                out.push(as_comment(consumed));
            }
            i += 1;
            continue;
        }

        let processed = active
            .iter()
            .fold(line.to_string(), |text, r| r.apply(&text));
        out.push(processed);
        i += 1;
    }

    outcome.source = out.join("\n");
    outcome
}
