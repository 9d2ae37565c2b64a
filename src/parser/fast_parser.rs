//! Fast-path parse: cache lookup, then preprocess → index → build.

use crate::cache::CacheManager;
use crate::config::CoquConfig;
use crate::parser::ast::{CobolProgram, CopybookStatus};
use crate::parser::builder::ProgramBuilder;
use crate::parser::indexer::{StructuralIndex, StructuralIndexer};
use crate::parser::preprocessor::{detect_format, normalize, Preprocessor};
use crate::utils::file_utils::read_file_lossy;
use crate::utils::hashing::sha256_hex;
use crate::utils::line_index::normalize_line_endings;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of one parse
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub program: CobolProgram,
    pub from_cache: bool,
    /// Preprocessor warnings and errors (empty on a cache hit)
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// Indexer-based parser with an optional program cache
#[derive(Debug)]
pub struct FastParser {
    preprocessor: Preprocessor,
    indexer: StructuralIndexer,
    builder: ProgramBuilder,
    cache: Option<CacheManager>,
    search_paths: Vec<PathBuf>,
}

impl Default for FastParser {
    fn default() -> Self {
        Self::new(Preprocessor::default(), None)
    }
}

impl FastParser {
    pub fn new(preprocessor: Preprocessor, cache: Option<CacheManager>) -> Self {
        Self {
            preprocessor,
            indexer: StructuralIndexer::new(),
            builder: ProgramBuilder::new(),
            cache,
            search_paths: Vec::new(),
        }
    }

    pub fn from_config(config: &CoquConfig) -> Self {
        let mut parser = Self::new(config.preprocessor(), config.cache_manager());
        parser.builder = parser
            .builder
            .analyze_paragraphs(config.parser.analyze_paragraphs);
        parser
    }

    pub fn with_indexer(mut self, indexer: StructuralIndexer) -> Self {
        self.indexer = indexer;
        self
    }

    /// Copybook directories tried before the preprocessor's own paths
    pub fn with_search_paths(mut self, search_paths: Vec<PathBuf>) -> Self {
        self.search_paths = search_paths;
        self
    }

    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    /// Parse a source, serving it from the cache when its content was seen before
    pub fn parse(&self, source: &str, source_path: Option<&Path>) -> ParseOutcome {
        let start = Instant::now();
        let source_hash = sha256_hex(source.as_bytes());

        if let Some(program) = self.cache.as_ref().and_then(|c| c.get(&source_hash)) {
            let program = self.reattach_source_lines(program, source, source_path);
            debug!(
                "Served {} from cache in {:?}",
                program.program_id,
                start.elapsed()
            );
            return ParseOutcome {
                program,
                from_cache: true,
                warnings: Vec::new(),
                elapsed: start.elapsed(),
            };
        }

        let preprocessed = self
            .preprocessor
            .preprocess(source, source_path, &self.search_paths);
        let index = self.indexer.index(&preprocessed.source);
        let source_lines = split_lines(&preprocessed.source);
        let program = self.builder.build(
            &index,
            &source_lines,
            source_path,
            &source_hash,
            preprocessed.copybook_refs,
        );

        if let Some(cache) = &self.cache {
            cache.put(&source_hash, &program);
        }

        let mut warnings = preprocessed.warnings;
        warnings.extend(preprocessed.errors);

        let elapsed = start.elapsed();
        info!(
            "Parsed {} ({} lines) in {:?}",
            program.program_id, program.lines, elapsed
        );
        ParseOutcome {
            program,
            from_cache: false,
            warnings,
            elapsed,
        }
    }

    /// Read (lossy UTF-8) and parse a file
    pub fn parse_file(&self, path: &Path) -> Result<ParseOutcome> {
        let source = read_file_lossy(path)?;
        Ok(self.parse(&source, Some(path)))
    }

    /// Structural index of the preprocessed source, without building or caching
    pub fn index_only(&self, source: &str) -> StructuralIndex {
        let preprocessed = self.preprocessor.preprocess(source, None, &self.search_paths);
        self.indexer.index(&preprocessed.source)
    }

    /// Apply the configured age and size limits to the cache
    pub fn prune_cache(&self, max_age_days: u64, max_size_mb: u64) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        cache.cleanup_old(max_age_days) + cache.cleanup_by_size(max_size_mb)
    }

    /// Cached programs carry no source lines; rebuild the text their line numbers refer to
    fn reattach_source_lines(
        &self,
        mut program: CobolProgram,
        source: &str,
        source_path: Option<&Path>,
    ) -> CobolProgram {
        let inlined = program
            .copybook_refs
            .iter()
            .any(|r| r.status == CopybookStatus::Resolved);

        let text = if inlined {
            self.preprocessor
                .preprocess(source, source_path, &self.search_paths)
                .source
        } else {
            let text = normalize_line_endings(source);
            normalize(&text, detect_format(&text))
        };
        program.source_lines = split_lines(&text);
        program
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SOURCE: &str = "       IDENTIFICATION DIVISION.
       PROGRAM-ID. CACHED.
       DATA DIVISION.
       WORKING-STORAGE SECTION.
       COPY WSREC.
       PROCEDURE DIVISION.
       MAIN-PARA.
           PERFORM SUB-PARA
           STOP RUN.
       SUB-PARA.
           DISPLAY WS-NAME.
";

    fn parser_with_cache(temp: &TempDir) -> FastParser {
        let cache = CacheManager::new(Some(temp.path().join("cache")));
        let preprocessor = Preprocessor::new(vec![temp.path().join("copy")]);
        FastParser::new(preprocessor, Some(cache))
    }

    fn write_copybook(temp: &TempDir) {
        let dir = temp.path().join("copy");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("WSREC.cpy"), "       01 WS-REC.\n          05 WS-NAME PIC X(10).").unwrap();
    }

    #[test]
    fn test_parse_builds_program_with_copybook() {
        let temp = TempDir::new().unwrap();
        write_copybook(&temp);
        let outcome = parser_with_cache(&temp).parse(SOURCE, None);

        assert!(!outcome.from_cache);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        let program = &outcome.program;
        assert_eq!(program.program_id, "CACHED");
        assert_eq!(program.source_hash, sha256_hex(SOURCE.as_bytes()));
        assert_eq!(program.copybook_refs[0].status, CopybookStatus::Resolved);

        let ws = program.working_storage_items(Some(1));
        assert_eq!(ws[0].name, "WS-REC", "Inlined copybook items are indexed");
        assert_eq!(
            program.get_paragraph("MAIN-PARA").unwrap().performs,
            vec!["SUB-PARA"]
        );
    }

    #[test]
    fn test_second_parse_is_served_from_cache() {
        let temp = TempDir::new().unwrap();
        write_copybook(&temp);
        let parser = parser_with_cache(&temp);

        let first = parser.parse(SOURCE, None);
        let second = parser.parse(SOURCE, None);
        assert!(second.from_cache);
        assert_eq!(second.program.divisions, first.program.divisions);
        assert_eq!(second.program.source_lines, first.program.source_lines);

        let para = second.program.get_paragraph("SUB-PARA").unwrap();
        assert!(second.program.get_body(&para.location).contains("DISPLAY WS-NAME"));

        let stats = parser.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.saves), (1, 1));
    }

    #[test]
    fn test_edited_source_is_reparsed() {
        let temp = TempDir::new().unwrap();
        let parser = parser_with_cache(&temp);
        parser.parse(SOURCE, None);

        let edited = SOURCE.replace("SUB-PARA.", "SUB-PARB.");
        let outcome = parser.parse(&edited, None);
        assert!(!outcome.from_cache);
        assert!(outcome.program.get_paragraph("SUB-PARB").is_some());
    }

    #[test]
    fn test_missing_copybook_is_a_warning() {
        let outcome = FastParser::default().parse(SOURCE, None);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("WSREC"));
        assert_eq!(outcome.program.copybook_refs[0].status, CopybookStatus::Unresolved);
    }

    #[test]
    fn test_parse_file_and_missing_file() {
        let temp = TempDir::new().unwrap();
        write_copybook(&temp);
        let path = temp.path().join("main.cbl");
        fs::write(&path, SOURCE).unwrap();

        let parser = FastParser::default().with_search_paths(vec![temp.path().join("copy")]);
        let outcome = parser.parse_file(&path).unwrap();
        assert_eq!(outcome.program.source_path.as_deref(), Some(path.as_path()));
        assert!(outcome.warnings.is_empty());

        assert!(parser.parse_file(&temp.path().join("absent.cbl")).is_err());
    }

    #[test]
    fn test_index_only() {
        let index = FastParser::default().index_only(SOURCE);
        assert_eq!(index.paragraph_names(), vec!["MAIN-PARA", "SUB-PARA"]);
        assert_eq!(index.copybooks.len(), 1);
    }

    #[test]
    fn test_from_config_respects_cache_toggle() {
        let temp = TempDir::new().unwrap();
        let mut config = CoquConfig::default();
        config.cache.dir = Some(temp.path().join("cache"));
        assert!(FastParser::from_config(&config).cache().is_some());

        config.cache.enabled = false;
        let parser = FastParser::from_config(&config);
        assert!(parser.cache().is_none());
        assert_eq!(parser.prune_cache(30, 500), 0);
    }
}
