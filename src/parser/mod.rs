// coqu Parser Module
//
// Fast-path COBOL analysis: regex structural indexing, preprocessing (format
// normalization, COPY/REPLACE), on-demand chunk analysis, program tree assembly and
// index coverage reporting.

pub mod ast;
pub mod builder;
pub mod chunk_analyzer;
pub mod coverage;
pub mod fast_parser;
pub mod indexer;
pub mod preprocessor;

pub use ast::{CobolProgram, CopybookRef, CopybookStatus, NodeKind, SourceLocation};
pub use builder::ProgramBuilder;
pub use chunk_analyzer::{analyze_chunk, ChunkAnalysis, ChunkAnalyzer};
pub use coverage::{CoverageAnalyzer, CoverageReport};
pub use fast_parser::{FastParser, ParseOutcome};
pub use indexer::{
    index_source, IndexCategory, IndexEntry, StatementEntry, StructuralIndex, StructuralIndexer,
};
pub use preprocessor::{Preprocessor, PreprocessorResult, SourceFormat};
