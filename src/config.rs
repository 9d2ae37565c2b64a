//! coqu configuration: copybook search, cache location and limits, parser toggles.
//!
//! Finding and reading the configuration file is the caller's job; this module only
//! maps a JSON document onto typed settings and builds components from them.

use crate::cache::CacheManager;
use crate::parser::preprocessor::{Preprocessor, DEFAULT_COPYBOOK_EXTENSIONS};
use crate::utils::file_utils::{has_extension, DEFAULT_COBOL_EXTENSIONS};
use crate::utils::paths::default_cache_dir;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoquConfig {
    /// Extra copybook directories, searched after the source's own directory
    #[serde(default)]
    pub copybook_paths: Vec<PathBuf>,
    /// Copybook file extensions, tried in order (`""` matches extensionless files)
    #[serde(default = "default_copybook_extensions")]
    pub copybook_extensions: Vec<String>,
    /// Extensions recognised as COBOL program sources
    #[serde(default = "default_cobol_extensions")]
    pub cobol_extensions: Vec<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub parser: ParserConfig,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory; `~/.cache/coqu` when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

/// Parse pipeline toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_true")]
    pub resolve_copybooks: bool,
    #[serde(default = "default_true")]
    pub apply_replace: bool,
    /// Fill paragraph PERFORM/CALL targets while building the program tree
    #[serde(default = "default_true")]
    pub analyze_paragraphs: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_size_mb() -> u64 {
    500
}

fn default_max_age_days() -> u64 {
    30
}

fn default_copybook_extensions() -> Vec<String> {
    DEFAULT_COPYBOOK_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_cobol_extensions() -> Vec<String> {
    DEFAULT_COBOL_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

impl Default for CoquConfig {
    fn default() -> Self {
        Self {
            copybook_paths: Vec::new(),
            copybook_extensions: default_copybook_extensions(),
            cobol_extensions: default_cobol_extensions(),
            cache: CacheConfig::default(),
            parser: ParserConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_size_mb: default_max_size_mb(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            resolve_copybooks: true,
            apply_replace: true,
            analyze_paragraphs: true,
        }
    }
}

impl CoquConfig {
    /// Parse a JSON configuration document; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid coqu configuration")
    }

    /// Configured cache directory, or the default one
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Preprocessor with the configured copybook search and toggles
    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.copybook_paths.clone())
            .with_extensions(self.copybook_extensions.clone())
            .resolve_copybooks(self.parser.resolve_copybooks)
            .apply_replace(self.parser.apply_replace)
    }

    /// Cache manager for the configured directory, `None` when caching is disabled
    pub fn cache_manager(&self) -> Option<CacheManager> {
        self.cache
            .enabled
            .then(|| CacheManager::new(Some(self.cache_dir())))
    }

    pub fn is_cobol_source(&self, path: &Path) -> bool {
        has_extension(path, &self.cobol_extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CoquConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoquConfig::default());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_size_mb, 500);
        assert_eq!(config.cache.max_age_days, 30);
        assert!(config.parser.resolve_copybooks && config.parser.apply_replace);
        assert!(config.copybook_extensions.contains(&".cpy".to_string()));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = CoquConfig::from_json_str(
            r#"{
                "copybook_paths": ["/copy/lib"],
                "cache": {"max_size_mb": 50},
                "parser": {"apply_replace": false}
            }"#,
        )
        .unwrap();
        assert_eq!(config.copybook_paths, vec![PathBuf::from("/copy/lib")]);
        assert_eq!(config.cache.max_size_mb, 50);
        assert_eq!(config.cache.max_age_days, 30);
        assert!(!config.parser.apply_replace);
        assert!(config.parser.resolve_copybooks);
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        let err = CoquConfig::from_json_str(r#"{"cache": {"enabled": "yes"}}"#).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid coqu configuration"));
    }

    #[test]
    fn test_components_follow_settings() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CoquConfig::default();
        config.cache.dir = Some(temp_dir.path().join("c"));
        config.copybook_paths = vec![temp_dir.path().to_path_buf()];

        let cache = config.cache_manager().expect("cache enabled by default");
        assert_eq!(cache.cache_dir(), temp_dir.path().join("c"));
        assert_eq!(
            config.preprocessor().resolver().search_paths(),
            &[temp_dir.path().to_path_buf()]
        );

        config.cache.enabled = false;
        assert!(config.cache_manager().is_none());
    }

    #[test]
    fn test_cobol_source_extensions() {
        let config = CoquConfig::default();
        assert!(config.is_cobol_source(Path::new("PAYROLL.CBL")));
        assert!(!config.is_cobol_source(Path::new("COMAREA.cpy")));
    }
}
