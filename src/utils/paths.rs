// coqu Path Utilities
//
// Home/cache directory lookup and tolerant canonicalization.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Cache directory name under the user cache root
pub const CACHE_DIR_NAME: &str = "coqu";

/// Canonicalize a path, falling back to the path as given when it cannot be resolved
///
/// Used for identity comparisons (visited copybooks), where symlinked and relative
/// spellings of one file must compare equal but a missing file must not be an error.
pub fn canonical_or_original(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// The user's home directory
///
/// Lookup order: `HOME`, then `USERPROFILE` (set on Windows, where `HOME` usually is
/// not). A variable that is set but empty counts as unset. No passwd or registry
/// lookup is attempted; without either variable the caller falls back on its own.
pub fn home_dir() -> Option<PathBuf> {
    home_dir_from(env::var_os("HOME"), env::var_os("USERPROFILE"))
}

fn home_dir_from(home: Option<OsString>, user_profile: Option<OsString>) -> Option<PathBuf> {
    [home, user_profile]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Default cache directory: `~/.cache/coqu`, or the system temp dir when there is no home
pub fn default_cache_dir() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".cache").join(CACHE_DIR_NAME),
        None => env::temp_dir().join(CACHE_DIR_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_or_original_resolves_relative_spellings() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("A.cpy");
        std::fs::write(&file, "       01 A PIC X.\n").unwrap();

        let dotted = temp_dir.path().join(".").join("A.cpy");
        assert_eq!(canonical_or_original(&dotted), canonical_or_original(&file));
    }

    #[test]
    fn test_canonical_or_original_keeps_missing_paths() {
        let missing = Path::new("/definitely/not/here.cpy");
        assert_eq!(canonical_or_original(missing), missing.to_path_buf());
    }

    #[test]
    fn test_home_dir_lookup_order() {
        let some = |v: &str| Some(OsString::from(v));
        assert_eq!(
            home_dir_from(some("/home/op"), some("C:\\Users\\op")),
            Some(PathBuf::from("/home/op"))
        );
        assert_eq!(
            home_dir_from(None, some("C:\\Users\\op")),
            Some(PathBuf::from("C:\\Users\\op"))
        );
        assert_eq!(
            home_dir_from(some(""), some("C:\\Users\\op")),
            Some(PathBuf::from("C:\\Users\\op")),
            "Empty HOME is skipped"
        );
        assert_eq!(home_dir_from(some(""), None), None);
        assert_eq!(home_dir_from(None, None), None);
    }

    #[test]
    fn test_default_cache_dir_ends_with_name() {
        assert!(default_cache_dir().ends_with(CACHE_DIR_NAME));
    }
}
