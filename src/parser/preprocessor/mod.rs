//! COBOL preprocessor: format normalization, COPY expansion and REPLACE directives.
//!
//! Pipeline for one call:
//! 1. detect the legacy column format and normalize it to blank sequence columns
//! 2. find every `COPY name [OF|IN lib] [REPLACING ...] .` statement and resolve it
//! 3. inline resolved copybooks (recursively, in reverse position order), applying
//!    REPLACING operands and bracketing each body with comment markers
//! 4. apply REPLACE directives
//!
//! Preprocessing never fails. Missing or unreadable copybooks and circular includes
//! are reported as warnings and the COPY statement is left in place. A copybook is
//! inlined at most once per call: any later COPY of an already visited path counts
//! as circular.

pub mod copybook;
pub mod format;
pub mod replacing;

pub use copybook::{CopybookInfo, CopybookNode, CopybookResolver, DEFAULT_COPYBOOK_EXTENSIONS};
pub use format::{detect_format, normalize, SourceFormat};

use crate::parser::ast::{CopybookRef, CopybookStatus};
use crate::utils::file_utils::read_file_lossy;
use crate::utils::line_index::{normalize_line_endings, LineIndex};
use crate::utils::paths::canonical_or_original;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static COPY_STATEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?is)\bCOPY\s+['"]?([A-Z][A-Z0-9-]*)['"]?"#,
        r"(?:\s+(?:OF|IN)\s+([A-Z][A-Z0-9-]*))?",
        r"(?:\s+REPLACING\s+(.+?))?",
        r"\s*\.",
    ))
    .unwrap()
});

/// Result of preprocessing one source
#[derive(Debug, Clone, Default)]
pub struct PreprocessorResult {
    /// Normalized source with copybooks inlined and REPLACE applied
    pub source: String,
    pub original_source: String,
    /// Top-level COPY statements, in source order
    pub copybook_refs: Vec<CopybookRef>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub format: SourceFormat,
    /// Whether column prefixes were rewritten
    pub normalized: bool,
}

/// COBOL preprocessor
///
/// Holds only configuration; per-call state (content cache, visited set, warnings)
/// lives in the call, so one instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    resolver: CopybookResolver,
    resolve_copybooks: bool,
    apply_replace: bool,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Preprocessor {
    pub fn new(copybook_paths: Vec<PathBuf>) -> Self {
        Self {
            resolver: CopybookResolver::new(copybook_paths),
            resolve_copybooks: true,
            apply_replace: true,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.resolver = self.resolver.with_extensions(extensions);
        self
    }

    /// Toggle COPY resolution and inlining (references are still collected)
    pub fn resolve_copybooks(mut self, enabled: bool) -> Self {
        self.resolve_copybooks = enabled;
        self
    }

    /// Toggle REPLACE directive processing
    pub fn apply_replace(mut self, enabled: bool) -> Self {
        self.apply_replace = enabled;
        self
    }

    pub fn add_copybook_path(&mut self, path: PathBuf) {
        self.resolver.add_path(path);
    }

    pub fn resolver(&self) -> &CopybookResolver {
        &self.resolver
    }

    /// Preprocess a source
    ///
    /// `source_path` anchors relative copybook lookup in the source's own directory;
    /// `search_paths` are tried before the instance's configured paths.
    pub fn preprocess(
        &self,
        source: &str,
        source_path: Option<&Path>,
        search_paths: &[PathBuf],
    ) -> PreprocessorResult {
        let text = normalize_line_endings(source);
        let format = detect_format(&text);
        let normalized_text = normalize(&text, format);
        let normalized = format != SourceFormat::Standard;
        if normalized {
            debug!("Normalized {} format source", format);
        }

        let mut expansion = Expansion {
            resolver: &self.resolver,
            search_paths,
            contents: HashMap::new(),
            warnings: Vec::new(),
        };

        let statements = find_copy_statements(&normalized_text);
        let mut copybook_refs: Vec<CopybookRef> =
            statements.iter().map(|s| s.reference.clone()).collect();

        let mut expanded = normalized_text.clone();
        if self.resolve_copybooks {
            let source_dir = source_path.and_then(Path::parent);
            let mut visited = HashSet::new();
            expanded = expansion.expand(
                &normalized_text,
                statements,
                source_dir,
                &mut visited,
                Some(&mut copybook_refs),
            );
        }

        let mut errors = Vec::new();
        if self.apply_replace {
            let outcome = replacing::apply_replace_directives(&expanded);
            if outcome.directives > 0 {
                debug!("Applied {} REPLACE directives", outcome.directives);
            }
            expanded = outcome.source;
            errors.extend(outcome.errors);
        }

        PreprocessorResult {
            source: expanded,
            original_source: source.to_string(),
            copybook_refs,
            warnings: expansion.warnings,
            errors,
            format,
            normalized,
        }
    }
}

/// A COPY statement located in some text
#[derive(Debug, Clone)]
struct CopyStatement {
    reference: CopybookRef,
    /// Byte span to replace, widened to the line start when only blanks precede it
    start: usize,
    end: usize,
}

fn in_comment(text: &str, line_start: usize, pos: usize) -> bool {
    let before = &text[line_start..pos];
    matches!(before.as_bytes().get(6), Some(b'*') | Some(b'/')) || before.contains("*>")
}

fn find_copy_statements(text: &str) -> Vec<CopyStatement> {
    let lines = LineIndex::new(text);
    let mut statements = Vec::new();

    for caps in COPY_STATEMENT_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let line = lines.line_of(whole.start());
        let line_start = lines.line_start(line);
        if in_comment(text, line_start, whole.start()) {
            continue;
        }

        let start = if text[line_start..whole.start()].trim().is_empty() {
            line_start
        } else {
            whole.start()
        };

        let mut reference = CopybookRef::new(name.as_str().to_uppercase(), line);
        reference.library = caps.get(2).map(|m| m.as_str().to_uppercase());
        reference.replacing = caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .filter(|r| !r.is_empty());

        statements.push(CopyStatement {
            reference,
            start,
            end: whole.end(),
        });
    }

    statements
}

/// Per-call inlining state
struct Expansion<'a> {
    resolver: &'a CopybookResolver,
    search_paths: &'a [PathBuf],
    /// Copybook bodies read during this call, by canonical path
    contents: HashMap<PathBuf, String>,
    warnings: Vec<String>,
}

impl Expansion<'_> {
    /// Inline `statements` found in `text`
    ///
    /// `visited` holds the canonical paths of every copybook inlined so far in this
    /// call; meeting one of them again is a circular include. When `refs` is given,
    /// the top-level references are updated with their resolution status.
    fn expand(
        &mut self,
        text: &str,
        mut statements: Vec<CopyStatement>,
        source_dir: Option<&Path>,
        visited: &mut HashSet<PathBuf>,
        mut refs: Option<&mut Vec<CopybookRef>>,
    ) -> String {
        let mut result = text.to_string();
        let mut resolved: Vec<Option<PathBuf>> = Vec::with_capacity(statements.len());

        for (i, stmt) in statements.iter_mut().enumerate() {
            let path =
                self.resolver
                    .resolve_with(&stmt.reference.name, source_dir, self.search_paths);
            match &path {
                Some(p) => {
                    stmt.reference.status = CopybookStatus::Resolved;
                    stmt.reference.resolved_path = Some(p.clone());
                }
                None => {
                    stmt.reference.status = CopybookStatus::Unresolved;
                    self.warnings.push(format!(
                        "Copybook '{}' not found in search paths (referenced at line {})",
                        stmt.reference.name, stmt.reference.line
                    ));
                }
            }
            if let Some(refs) = refs.as_deref_mut() {
                refs[i] = stmt.reference.clone();
            }
            resolved.push(path);
        }

        // Splice from the end so earlier spans stay valid.
        for (i, stmt) in statements.iter().enumerate().rev() {
            let Some(path) = &resolved[i] else { continue };
            let canonical = canonical_or_original(path);

            if !visited.insert(canonical.clone()) {
                warn!("⚠️  Circular copybook reference: {}", stmt.reference.name);
                self.warnings.push(format!(
                    "Circular copybook reference detected: {}",
                    stmt.reference.name
                ));
                continue;
            }

            let body = match self.read(&canonical) {
                Ok(body) => body,
                Err(e) => {
                    warn!("⚠️  Failed to read copybook {}: {:#}", stmt.reference.name, e);
                    self.warnings.push(format!(
                        "Error reading copybook '{}': {:#}",
                        stmt.reference.name, e
                    ));
                    if let Some(refs) = refs.as_deref_mut() {
                        refs[i].status = CopybookStatus::Error;
                    }
                    continue;
                }
            };

            let body = match &stmt.reference.replacing {
                Some(clause) => replacing::apply_replacing(&body, clause),
                None => body,
            };

            let nested = find_copy_statements(&body);
            let body = if nested.is_empty() {
                body
            } else {
                self.expand(&body, nested, canonical.parent(), visited, None)
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let replacement = format!(
                "      * COPY {} - BEGIN (from {})\n{}\n      * COPY {} - END",
                stmt.reference.name,
                file_name,
                body.strip_suffix('\n').unwrap_or(&body),
                stmt.reference.name
            );
            result.replace_range(stmt.start..stmt.end, &replacement);
        }

        result
    }

    fn read(&mut self, path: &Path) -> anyhow::Result<String> {
        if let Some(cached) = self.contents.get(path) {
            return Ok(cached.clone());
        }
        let content = normalize_line_endings(&read_file_lossy(path)?);
        self.contents.insert(path.to_path_buf(), content.clone());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MAIN_SOURCE: &str = "       IDENTIFICATION DIVISION.
       PROGRAM-ID. MAIN.
       DATA DIVISION.
       WORKING-STORAGE SECTION.
       COPY CUSTREC.
       COPY MISSING.
       PROCEDURE DIVISION.
           STOP RUN.
";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_inlines_resolved_copybook_with_markers() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "custrec.cpy", "       01 CUST-REC.\n          05 CUST-ID PIC 9(5).\n");
        let program = write(dir.path(), "main.cbl", MAIN_SOURCE);

        let result = Preprocessor::default().preprocess(MAIN_SOURCE, Some(&program), &[]);

        assert_eq!(result.copybook_refs.len(), 2);
        let cust = &result.copybook_refs[0];
        assert_eq!(cust.name, "CUSTREC");
        assert_eq!(cust.line, 5);
        assert_eq!(cust.status, CopybookStatus::Resolved);
        assert_eq!(result.copybook_refs[1].status, CopybookStatus::Unresolved);

        assert!(result
            .source
            .contains("      * COPY CUSTREC - BEGIN (from custrec.cpy)\n       01 CUST-REC.\n"));
        assert!(result.source.contains("      * COPY CUSTREC - END\n"));
        assert!(result.source.contains("       COPY MISSING."), "Unresolved COPY stays");
        assert_eq!(
            result.warnings,
            vec!["Copybook 'MISSING' not found in search paths (referenced at line 6)"]
        );
        assert_eq!(result.original_source, MAIN_SOURCE);
    }

    #[test]
    fn test_case_insensitive_resolution_marks_resolved() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "CustRec.CPY", "       01 CUST-REC.\n");
        let src = "       COPY custrec.\n";

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess(src, None, &[]);
        assert_eq!(result.copybook_refs[0].status, CopybookStatus::Resolved);
        assert!(result.source.contains("01 CUST-REC."));
    }

    #[test]
    fn test_replacing_and_library_are_captured() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "template.cpy", "       01 :P:-REC.\n          05 :P:-KEY PIC X.\n");
        let src = "       COPY TEMPLATE OF SYSLIB\n           REPLACING ==:P:== BY ==ORDER==.\n";

        let result = Preprocessor::default().preprocess(src, None, &[dir.path().to_path_buf()]);
        let r = &result.copybook_refs[0];
        assert_eq!(r.library.as_deref(), Some("SYSLIB"));
        assert_eq!(r.replacing.as_deref(), Some("==:P:== BY ==ORDER=="));
        assert!(result.source.contains("01 ORDER-REC."));
        assert!(result.source.contains("05 ORDER-KEY PIC X."));
        assert!(!result.source.contains(":P:"));
    }

    #[test]
    fn test_nested_copybooks_are_inlined() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "outer.cpy", "       01 OUTER-REC.\n       COPY INNER.\n");
        write(dir.path(), "inner.cpy", "          05 INNER-FIELD PIC X.\n");

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess("       COPY OUTER.\n", None, &[]);

        assert!(result.source.contains("COPY INNER - BEGIN (from inner.cpy)"));
        assert!(result.source.contains("05 INNER-FIELD PIC X."));
        assert_eq!(result.copybook_refs.len(), 1, "Only top-level refs are recorded");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_second_copy_of_same_copybook_is_circular() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "flag.cpy", "       01 WS-FLAG PIC X.\n");
        let src = "       COPY FLAG.\n       COPY FLAG.\n";

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess(src, None, &[]);
        assert_eq!(result.source.matches("01 WS-FLAG PIC X.").count(), 1);
        assert_eq!(result.source.matches("COPY FLAG - BEGIN").count(), 1);
        // Expansion runs bottom-up, so the first statement is the one left in place.
        assert!(result.source.starts_with("       COPY FLAG.\n"));
        assert_eq!(
            result.warnings,
            vec!["Circular copybook reference detected: FLAG"]
        );
        assert!(result
            .copybook_refs
            .iter()
            .all(|r| r.status == CopybookStatus::Resolved));
    }

    #[test]
    fn test_circular_copybooks_warn_and_terminate() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.cpy", "       01 A-REC.\n       COPY B.\n");
        write(dir.path(), "b.cpy", "       01 B-REC.\n       COPY A.\n");

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess("       COPY A.\n", None, &[]);

        assert!(result
            .warnings
            .iter()
            .any(|w| w == "Circular copybook reference detected: A"));
        assert_eq!(result.source.matches("01 A-REC.").count(), 1);
        assert_eq!(result.source.matches("01 B-REC.").count(), 1);
        assert!(result.source.contains("       COPY A."), "Cyclic COPY is left in place");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unreadable_copybook_is_an_error() {
        // A regular file whose reads fail with EIO, even for root.
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/proc/self/mem", dir.path().join("mem.cpy")).unwrap();

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess("       COPY MEM.\n", None, &[]);

        assert_eq!(result.copybook_refs[0].status, CopybookStatus::Error);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Error reading copybook 'MEM':"));
        assert!(result.source.contains("       COPY MEM."), "Unreadable COPY stays");
    }

    #[test]
    fn test_directory_named_like_copybook_is_not_resolved() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("broken.cpy")).unwrap();

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess("       COPY BROKEN.\n", None, &[]);
        assert_eq!(result.copybook_refs[0].status, CopybookStatus::Unresolved);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_copy_in_comment_lines_is_ignored() {
        let src = "      * COPY NOTREAL.\n       MOVE A TO B. *> COPY ALSO-NOT.\n";
        let result = Preprocessor::default().preprocess(src, None, &[]);
        assert!(result.copybook_refs.is_empty());
    }

    #[test]
    fn test_resolution_disabled_keeps_refs_unresolved() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "custrec.cpy", "       01 CUST-REC.\n");
        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]).resolve_copybooks(false);
        let result = pre.preprocess(MAIN_SOURCE, None, &[]);

        assert_eq!(result.copybook_refs.len(), 2);
        assert!(result
            .copybook_refs
            .iter()
            .all(|r| r.status == CopybookStatus::Unresolved));
        assert!(result.warnings.is_empty());
        assert_eq!(result.source, MAIN_SOURCE);
    }

    #[test]
    fn test_sequence_format_is_normalized_before_expansion() {
        let src = "000100 IDENTIFICATION DIVISION.\n000200 PROGRAM-ID. SEQ.\n000300 PROCEDURE DIVISION.\n";
        let result = Preprocessor::default().preprocess(src, None, &[]);
        assert_eq!(result.format, SourceFormat::Sequence);
        assert!(result.normalized);
        assert!(result.source.starts_with("       IDENTIFICATION DIVISION."));
    }

    #[test]
    fn test_replace_directive_runs_after_copy() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "body.cpy", "           DISPLAY TOKEN-X.\n");
        let src = "       REPLACE ==TOKEN-X== BY ==WS-NAME==.\n       COPY BODY.\n";

        let pre = Preprocessor::new(vec![dir.path().to_path_buf()]);
        let result = pre.preprocess(src, None, &[]);
        assert!(result.source.contains("DISPLAY WS-NAME."));
        assert!(result.errors.is_empty());

        let untouched = pre.clone().apply_replace(false).preprocess(src, None, &[]);
        assert!(untouched.source.contains("DISPLAY TOKEN-X."));
    }
}
