//! Copybook lookup on disk.
//!
//! Resolution order: the referencing source's own directory, then any per-call search
//! paths, then the resolver's configured paths. Within a directory every extension is
//! tried with the lower-case, upper-case and as-written name; if none exists the
//! directory is scanned for a case-insensitive match.

use crate::utils::file_utils::read_file_lossy;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Extensions tried in order; the empty string means "no extension"
pub const DEFAULT_COPYBOOK_EXTENSIONS: &[&str] = &[
    ".cpy", ".copy", ".cbl", ".cob", ".CPY", ".COPY", ".CBL", ".COB", "",
];

static NESTED_COPY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bCOPY\s+['"]?([A-Z][A-Z0-9-]*)"#).unwrap());

/// Facts about a resolved copybook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopybookInfo {
    pub name: String,
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    pub lines: usize,
    /// Names of COPY statements inside this copybook, first occurrence order
    pub nested_refs: Vec<String>,
}

/// One node of a copybook dependency tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopybookNode {
    pub name: String,
    pub path: Option<PathBuf>,
    pub lines: usize,
    pub resolved: bool,
    /// Set when this name already appears on the path from the root
    pub circular: bool,
    pub nested: Vec<CopybookNode>,
}

#[derive(Debug, Clone)]
pub struct CopybookResolver {
    search_paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl Default for CopybookResolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CopybookResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            extensions: DEFAULT_COPYBOOK_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        if !extensions.is_empty() {
            self.extensions = extensions;
        }
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn add_path(&mut self, path: PathBuf) {
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    /// Resolve a copybook referenced from `source_path`
    pub fn resolve(&self, name: &str, source_path: Option<&Path>) -> Option<PathBuf> {
        self.resolve_with(name, source_path.and_then(Path::parent), &[])
    }

    /// Resolve with an explicit referencing directory and extra per-call search paths
    pub fn resolve_with(
        &self,
        name: &str,
        source_dir: Option<&Path>,
        extra_paths: &[PathBuf],
    ) -> Option<PathBuf> {
        let dirs: Vec<&Path> = source_dir
            .into_iter()
            .chain(extra_paths.iter().map(PathBuf::as_path))
            .chain(self.search_paths.iter().map(PathBuf::as_path))
            .filter(|d| d.is_dir())
            .collect();

        let variants = [name.to_lowercase(), name.to_uppercase(), name.to_string()];
        for dir in &dirs {
            for ext in &self.extensions {
                for variant in &variants {
                    let candidate = dir.join(format!("{}{}", variant, ext));
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }

        // Case-sensitive filesystems: fall back to scanning for a differently-cased file.
        for dir in &dirs {
            match self.scan_case_insensitive(dir, name) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => debug!("Skipping copybook directory scan: {:#}", e),
            }
        }

        None
    }

    fn scan_case_insensitive(&self, dir: &Path, name: &str) -> Result<Option<PathBuf>> {
        let entries =
            fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
        let mut matches: Vec<PathBuf> = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let hit = self.extensions.iter().any(|ext| {
                file_name.len() == name.len() + ext.len()
                    && file_name.is_char_boundary(name.len())
                    && file_name[..name.len()].eq_ignore_ascii_case(name)
                    && file_name[name.len()..].eq_ignore_ascii_case(ext)
            });
            if hit {
                matches.push(path);
            }
        }

        // read_dir order is unspecified
        matches.sort();
        Ok(matches.into_iter().next())
    }

    /// Size, line count and nested COPY names of a copybook
    pub fn info(&self, name: &str, source_path: Option<&Path>) -> Option<CopybookInfo> {
        let path = self.resolve(name, source_path)?;
        match self.read_info(name, &path) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Copybook info unavailable for {}: {:#}", name, e);
                None
            }
        }
    }

    fn read_info(&self, name: &str, path: &Path) -> Result<CopybookInfo> {
        let content = read_file_lossy(path)?;
        let size = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        let mut nested_refs: Vec<String> = Vec::new();
        for caps in NESTED_COPY_RE.captures_iter(&content) {
            let nested = caps[1].to_uppercase();
            if !nested_refs.contains(&nested) {
                nested_refs.push(nested);
            }
        }

        Ok(CopybookInfo {
            name: name.to_uppercase(),
            path: path.to_path_buf(),
            size,
            lines: content.matches('\n').count() + 1,
            nested_refs,
        })
    }

    /// Every copybook file directly inside `directory`
    pub fn find_all_in_directory(&self, directory: &Path) -> Vec<CopybookInfo> {
        let escaped = glob::Pattern::escape(&directory.to_string_lossy());
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut results = Vec::new();

        for ext in self.extensions.iter().filter(|e| !e.is_empty()) {
            let pattern = format!("{}/*{}", escaped, ext);
            let Ok(paths) = glob::glob(&pattern) else {
                continue;
            };
            for path in paths.flatten() {
                if !path.is_file() || !seen.insert(path.clone()) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if let Ok(info) = self.read_info(stem, &path) {
                    results.push(info);
                }
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }

    /// Nested COPY structure rooted at `name`, cycle-safe
    pub fn dependency_tree(&self, name: &str, source_path: Option<&Path>) -> CopybookNode {
        let mut ancestors = HashSet::new();
        self.tree_node(name, source_path, &mut ancestors)
    }

    fn tree_node(
        &self,
        name: &str,
        source_path: Option<&Path>,
        ancestors: &mut HashSet<String>,
    ) -> CopybookNode {
        let upper = name.to_uppercase();
        if ancestors.contains(&upper) {
            return CopybookNode {
                name: upper,
                circular: true,
                ..Default::default()
            };
        }

        let Some(info) = self.info(name, source_path) else {
            return CopybookNode {
                name: upper,
                ..Default::default()
            };
        };

        ancestors.insert(upper.clone());
        let nested = info
            .nested_refs
            .iter()
            .map(|child| self.tree_node(child, Some(&info.path), ancestors))
            .collect();
        ancestors.remove(&upper);

        CopybookNode {
            name: upper,
            path: Some(info.path),
            lines: info.lines,
            resolved: true,
            circular: false,
            nested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_from_source_directory_first() {
        let src_dir = TempDir::new().unwrap();
        let lib_dir = TempDir::new().unwrap();
        fs::write(src_dir.path().join("custrec.cpy"), "       01 CUST.\n").unwrap();
        fs::write(lib_dir.path().join("custrec.cpy"), "       01 OTHER.\n").unwrap();

        let resolver = CopybookResolver::new(vec![lib_dir.path().to_path_buf()]);
        let program = src_dir.path().join("main.cbl");
        let found = resolver.resolve("CUSTREC", Some(&program)).unwrap();
        assert_eq!(found, src_dir.path().join("custrec.cpy"));
    }

    #[test]
    fn test_resolves_uppercase_and_extensionless() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("DATEREC.CPY"), "").unwrap();
        fs::write(dir.path().join("PLAIN"), "").unwrap();

        let resolver = CopybookResolver::new(vec![dir.path().to_path_buf()]);
        assert_eq!(
            resolver.resolve("daterec", None),
            Some(dir.path().join("DATEREC.CPY"))
        );
        assert_eq!(resolver.resolve("plain", None), Some(dir.path().join("PLAIN")));
        assert!(resolver.resolve("MISSING", None).is_none());
    }

    #[test]
    fn test_case_insensitive_scan_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ComArea.Cpy"), "       01 COMAREA.\n").unwrap();

        let resolver = CopybookResolver::new(vec![dir.path().to_path_buf()]);
        let found = resolver.resolve("COMAREA", None);
        assert_eq!(found, Some(dir.path().join("ComArea.Cpy")));
    }

    #[test]
    fn test_per_call_paths_precede_configured_paths() {
        let call_dir = TempDir::new().unwrap();
        let conf_dir = TempDir::new().unwrap();
        fs::write(call_dir.path().join("x.cpy"), "").unwrap();
        fs::write(conf_dir.path().join("x.cpy"), "").unwrap();

        let resolver = CopybookResolver::new(vec![conf_dir.path().to_path_buf()]);
        let found = resolver.resolve_with("X", None, &[call_dir.path().to_path_buf()]);
        assert_eq!(found, Some(call_dir.path().join("x.cpy")));
    }

    #[test]
    fn test_info_lists_nested_refs_once() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("outer.cpy"),
            "       COPY INNER.\n       COPY inner.\n       COPY OTHER.\n",
        )
        .unwrap();

        let resolver = CopybookResolver::new(vec![dir.path().to_path_buf()]);
        let info = resolver.info("outer", None).unwrap();
        assert_eq!(info.name, "OUTER");
        assert_eq!(info.nested_refs, vec!["INNER", "OTHER"]);
        assert_eq!(info.lines, 4);
        assert!(info.size > 0);
    }

    #[test]
    fn test_dependency_tree_marks_cycles_and_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.cpy"), "       COPY B.\n       COPY GONE.\n").unwrap();
        fs::write(dir.path().join("b.cpy"), "       COPY A.\n").unwrap();

        let resolver = CopybookResolver::new(vec![dir.path().to_path_buf()]);
        let tree = resolver.dependency_tree("A", None);

        assert!(tree.resolved);
        assert_eq!(tree.nested.len(), 2);
        let b = &tree.nested[0];
        assert_eq!(b.name, "B");
        assert!(b.resolved);
        assert!(b.nested[0].circular, "A under B closes a cycle");
        let gone = &tree.nested[1];
        assert!(!gone.resolved && !gone.circular);
    }

    #[test]
    fn test_find_all_in_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one.cpy"), "       01 ONE.\n").unwrap();
        fs::write(dir.path().join("TWO.CPY"), "       01 TWO.\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let resolver = CopybookResolver::default();
        let found = resolver.find_all_in_directory(dir.path());
        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ONE", "TWO"]);
    }
}
