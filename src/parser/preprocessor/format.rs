//! Legacy column-format detection and normalization.
//!
//! Mainframe source-control tools leave per-line prefixes in columns 1-6: six-digit
//! sequence numbers, or short Panvalet/Librarian version markers such as `1.1`,
//! `07.141` or `7.682A`. Normalization rewrites those prefixes to six blanks so the
//! indicator column and Areas A/B land where fixed-format COBOL expects them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Non-blank lines sampled for detection
pub const FORMAT_SAMPLE_LINES: usize = 20;

static SEQUENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}").unwrap());

/// Short dotted version marker, optionally suffixed by an area letter
static PANVALET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}\.[\d.]{0,4}[AB]?)(?:[ \t]|$)").unwrap());

/// Detected column layout of a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// No recognised prefix; left untouched
    #[default]
    Standard,
    /// Six-digit sequence numbers in columns 1-6
    Sequence,
    /// Version markers from Panvalet/Librarian exports
    Panvalet,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceFormat::Standard => "standard",
            SourceFormat::Sequence => "sequence",
            SourceFormat::Panvalet => "panvalet",
        };
        write!(f, "{}", s)
    }
}

impl SourceFormat {
    pub fn from_string(s: &str) -> Option<SourceFormat> {
        match s.to_lowercase().as_str() {
            "standard" => Some(SourceFormat::Standard),
            "sequence" => Some(SourceFormat::Sequence),
            "panvalet" => Some(SourceFormat::Panvalet),
            _ => None,
        }
    }
}

fn panvalet_marker(line: &str) -> Option<&str> {
    PANVALET_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Classify a source by majority vote over its first non-blank lines
///
/// A format wins only with a strict majority of the sampled lines; anything else,
/// including an empty source, is `Standard`.
pub fn detect_format(source: &str) -> SourceFormat {
    let mut sampled = 0usize;
    let mut panvalet = 0usize;
    let mut sequence = 0usize;

    for line in source
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(FORMAT_SAMPLE_LINES)
    {
        sampled += 1;
        if panvalet_marker(line).is_some() {
            panvalet += 1;
        } else if SEQUENCE_RE.is_match(line) {
            sequence += 1;
        }
    }

    if sampled == 0 {
        SourceFormat::Standard
    } else if panvalet * 2 > sampled {
        SourceFormat::Panvalet
    } else if sequence * 2 > sampled {
        SourceFormat::Sequence
    } else {
        SourceFormat::Standard
    }
}

/// Replace detected per-line prefixes with six blank columns
///
/// Lines without a recognised prefix pass through unchanged, as does every line of a
/// `Standard` source. Line structure (count and terminators) is preserved.
pub fn normalize(source: &str, format: SourceFormat) -> String {
    if format == SourceFormat::Standard {
        return source.to_string();
    }

    source
        .split('\n')
        .map(|line| match format {
            SourceFormat::Sequence => normalize_sequence_line(line),
            SourceFormat::Panvalet => normalize_panvalet_line(line),
            SourceFormat::Standard => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_sequence_line(line: &str) -> String {
    if !SEQUENCE_RE.is_match(line) {
        return line.to_string();
    }
    format!("      {}", line.get(6..).unwrap_or(""))
}

fn normalize_panvalet_line(line: &str) -> String {
    let Some(marker) = panvalet_marker(line) else {
        return line.to_string();
    };
    let marker_len = marker.len();

    // Marker fits the sequence area: keep everything from the indicator column on.
    let padding_is_blank = line
        .as_bytes()
        .iter()
        .skip(marker_len)
        .take(6usize.saturating_sub(marker_len))
        .all(|b| *b == b' ' || *b == b'\t');
    if marker_len <= 6 && padding_is_blank {
        return format!("      {}", line.get(6..).unwrap_or(""));
    }

    format!("      {}", &line[marker_len..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENCE_SOURCE: &str = "000100 IDENTIFICATION DIVISION.
000200 PROGRAM-ID. SEQ.
000300
000400 PROCEDURE DIVISION.
000500     STOP RUN.
";

    const PANVALET_SOURCE: &str = "1.1    IDENTIFICATION DIVISION.
07.141 PROGRAM-ID. PANV.
7.682A PROCEDURE DIVISION.
3.2001     STOP RUN.
";

    const STANDARD_SOURCE: &str = "       IDENTIFICATION DIVISION.
       PROGRAM-ID. STD.
       PROCEDURE DIVISION.
           STOP RUN.
";

    #[test]
    fn test_detects_each_format() {
        assert_eq!(detect_format(SEQUENCE_SOURCE), SourceFormat::Sequence);
        assert_eq!(detect_format(PANVALET_SOURCE), SourceFormat::Panvalet);
        assert_eq!(detect_format(STANDARD_SOURCE), SourceFormat::Standard);
        assert_eq!(detect_format(""), SourceFormat::Standard);
    }

    #[test]
    fn test_tie_falls_back_to_standard() {
        let mixed = "000100 A.\n       B.\n";
        assert_eq!(
            detect_format(mixed),
            SourceFormat::Standard,
            "Exactly half is not a majority"
        );
    }

    #[test]
    fn test_detection_samples_only_leading_lines() {
        let mut src = String::new();
        for _ in 0..FORMAT_SAMPLE_LINES {
            src.push_str("       MOVE A TO B.\n");
        }
        for i in 0..100 {
            src.push_str(&format!("{:06} MOVE A TO B.\n", i));
        }
        assert_eq!(detect_format(&src), SourceFormat::Standard);
    }

    #[test]
    fn test_normalize_sequence() {
        let out = normalize(SEQUENCE_SOURCE, SourceFormat::Sequence);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "       IDENTIFICATION DIVISION.");
        assert_eq!(lines[2], "      ", "Sequence-only line becomes blank columns");
        assert_eq!(lines[4], "           STOP RUN.");
        assert_eq!(out.matches('\n').count(), SEQUENCE_SOURCE.matches('\n').count());
    }

    #[test]
    fn test_normalize_panvalet() {
        let out = normalize(PANVALET_SOURCE, SourceFormat::Panvalet);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "       IDENTIFICATION DIVISION.");
        assert_eq!(lines[1], "       PROGRAM-ID. PANV.");
        assert_eq!(lines[2], "       PROCEDURE DIVISION.");
        assert_eq!(lines[3], "           STOP RUN.");
    }

    #[test]
    fn test_standard_normalization_is_identity() {
        assert_eq!(normalize(STANDARD_SOURCE, SourceFormat::Standard), STANDARD_SOURCE);
        assert_eq!(
            normalize(STANDARD_SOURCE, SourceFormat::Sequence),
            STANDARD_SOURCE,
            "Lines without a prefix pass through"
        );
    }
}
