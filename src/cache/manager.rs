//! Content-addressed on-disk cache of parsed programs.
//!
//! Entries live at `{cache_dir}/{sha256_hex}.coqu`. Every filesystem failure is
//! logged and reported as a miss, `false` or `0`; nothing here returns an error.

use super::serializer::Serializer;
use crate::parser::ast::CobolProgram;
use crate::utils::paths::default_cache_dir;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// File extension of cache entries
pub const CACHE_EXTENSION: &str = "coqu";

const BYTES_PER_MB: u64 = 1024 * 1024;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Counters and disk usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub cache_dir: PathBuf,
    pub hits: u64,
    pub misses: u64,
    pub saves: u64,
    pub files: usize,
    pub total_bytes: u64,
    pub total_mb: f64,
    /// Hits as a percentage of lookups (0 before the first lookup)
    pub hit_rate: f64,
}

/// One entry on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedEntry {
    pub hash: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// File-based program cache keyed by source content hash
///
/// Counters are atomics so lookups only need `&self`. Concurrent writers of the same
/// key race under last-writer-wins; each write goes to its own temporary file that is
/// then renamed into place, so a reader sees either a whole entry or none.
#[derive(Debug)]
pub struct CacheManager {
    cache_dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
    saves: AtomicU64,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CacheManager {
    /// Open (and create if needed) the cache directory, `~/.cache/coqu` by default
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(default_cache_dir);
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(
                "⚠️  Failed to create cache directory {}: {}",
                cache_dir.display(),
                e
            );
        }
        Self {
            cache_dir,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            saves: AtomicU64::new(0),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Entry path for a content hash, `None` unless the hash is plain hex
    pub fn entry_path(&self, source_hash: &str) -> Option<PathBuf> {
        if source_hash.is_empty() || !source_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(
            self.cache_dir
                .join(format!("{}.{}", source_hash.to_lowercase(), CACHE_EXTENSION)),
        )
    }

    /// Look up a program; unusable entries are deleted and count as misses
    pub fn get(&self, source_hash: &str) -> Option<CobolProgram> {
        let Some(path) = self.entry_path(source_hash).filter(|p| p.is_file()) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match Serializer::load(&path) {
            Ok(program) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", path.display());
                Some(program)
            }
            Err(e) => {
                warn!("⚠️  Discarding unusable cache entry {}: {}", path.display(), e);
                if let Err(e) = fs::remove_file(&path) {
                    debug!("Failed to delete {}: {}", path.display(), e);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a program; `false` when it could not be written
    pub fn put(&self, source_hash: &str, program: &CobolProgram) -> bool {
        let Some(path) = self.entry_path(source_hash) else {
            warn!("⚠️  Refusing to cache under invalid key {:?}", source_hash);
            return false;
        };

        match Serializer::save(program, &path) {
            Ok(()) => {
                self.saves.fetch_add(1, Ordering::Relaxed);
                info!("📋 Cached {} as {}", program.program_id, path.display());
                true
            }
            Err(e) => {
                warn!("⚠️  Failed to write cache entry {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete one entry; `false` when there was nothing to delete
    pub fn remove(&self, source_hash: &str) -> bool {
        let Some(path) = self.entry_path(source_hash) else {
            return false;
        };
        fs::remove_file(&path).is_ok()
    }

    /// Delete every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let removed = self
            .entries()
            .iter()
            .filter(|e| remove_entry(&e.path))
            .count();
        info!("Cleared {} cache entries", removed);
        removed
    }

    /// Delete entries last modified more than `max_age_days` ago
    pub fn cleanup_old(&self, max_age_days: u64) -> usize {
        let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return 0;
        };

        let removed = self
            .entries()
            .iter()
            .filter(|e| e.modified < cutoff)
            .filter(|e| remove_entry(&e.path))
            .count();
        if removed > 0 {
            info!("Removed {} cache entries older than {} days", removed, max_age_days);
        }
        removed
    }

    /// Evict oldest entries until the cache fits in `max_size_mb`
    pub fn cleanup_by_size(&self, max_size_mb: u64) -> usize {
        let cap = max_size_mb.saturating_mul(BYTES_PER_MB);
        let mut entries = self.entries();
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= cap {
            return 0;
        }

        entries.sort_by_key(|e| e.modified);
        let mut removed = 0;
        for entry in entries {
            if total <= cap {
                break;
            }
            if remove_entry(&entry.path) {
                total = total.saturating_sub(entry.size);
                removed += 1;
            }
        }
        info!(
            "Evicted {} cache entries to fit {} MB ({} bytes remain)",
            removed, max_size_mb, total
        );
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let entries = self.entries();
        let total_bytes: u64 = entries.iter().map(|e| e.size).sum();
        let lookups = hits + misses;

        CacheStats {
            cache_dir: self.cache_dir.clone(),
            hits,
            misses,
            saves: self.saves.load(Ordering::Relaxed),
            files: entries.len(),
            total_bytes,
            total_mb: total_bytes as f64 / BYTES_PER_MB as f64,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 * 100.0 / lookups as f64
            },
        }
    }

    /// Entries on disk, newest first
    pub fn list_cached(&self) -> Vec<CachedEntry> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        entries
    }

    fn entries(&self) -> Vec<CachedEntry> {
        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&self.cache_dir.to_string_lossy()),
            CACHE_EXTENSION
        );
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("⚠️  Invalid cache directory pattern {}: {}", pattern, e);
                return Vec::new();
            }
        };

        paths
            .flatten()
            .filter_map(|path| {
                let metadata = fs::metadata(&path).ok().filter(|m| m.is_file())?;
                let hash = path.file_stem()?.to_str()?.to_string();
                Some(CachedEntry {
                    hash,
                    size: metadata.len(),
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    path,
                })
            })
            .collect()
    }
}

fn remove_entry(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!("⚠️  Failed to delete cache entry {}: {}", path.display(), e);
            false
        }
    }
}
