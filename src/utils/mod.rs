// coqu Utilities Module
//
// Common helpers shared by the indexer, preprocessor and cache.

use anyhow::{Context, Result};
use std::path::Path;

/// File utilities
pub mod file_utils {
    use super::*;
    use std::fs;

    /// Extensions recognised as COBOL program sources
    pub const DEFAULT_COBOL_EXTENSIONS: &[&str] = &[".cbl", ".cob", ".cobol"];

    /// Check if a file carries one of the given extensions (case-insensitive, leading dot included)
    pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let dotted = format!(".{}", ext.to_lowercase());
        extensions.iter().any(|e| e.to_lowercase() == dotted)
    }

    /// Check if a file looks like a COBOL source using the default extension list
    pub fn is_cobol_file(path: &Path) -> bool {
        let defaults: Vec<String> = DEFAULT_COBOL_EXTENSIONS
            .iter()
            .map(|e| e.to_string())
            .collect();
        has_extension(path, &defaults)
    }

    /// Read file content, tolerating non-UTF-8 bytes
    ///
    /// Mainframe exports routinely contain stray EBCDIC-converted bytes, so invalid
    /// sequences are replaced rather than rejected.
    pub fn read_file_lossy(path: &Path) -> Result<String> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Line-offset table and position lookups
pub mod line_index;

/// Content hashing (cache keys)
pub mod hashing;

/// Home/cache directories and canonicalization
pub mod paths;
