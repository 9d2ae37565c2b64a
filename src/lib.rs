// coqu Core - fast-path COBOL analysis engine
//
// Regex structural indexing, copybook-aware preprocessing, per-paragraph chunk
// analysis and a content-addressed binary cache of program trees.
// Everything runs synchronously on the calling thread; no component needs a grammar.

// Shared helpers (files, line offsets, hashing, paths)
pub mod utils;

// Indexer, preprocessor, chunk analyzer, program tree and coverage
pub mod parser;

// On-disk program cache
pub mod cache;

pub mod config;

pub use cache::{CacheError, CacheManager, CacheStats, Serializer};
pub use config::CoquConfig;
pub use parser::{
    analyze_chunk, ChunkAnalysis, ChunkAnalyzer, CobolProgram, CoverageAnalyzer, CoverageReport,
    FastParser, ParseOutcome, Preprocessor, PreprocessorResult, ProgramBuilder, StructuralIndex,
    StructuralIndexer,
};
