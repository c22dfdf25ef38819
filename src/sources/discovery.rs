//! File discovery - glob-based lookup of CSV files on disk

use crate::error::{IngestError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_PATTERNS: &[&str] = &["*.csv"];

/// `*.csv` files directly inside `directory`
pub fn list_csv_files(directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    find_files(directory, DEFAULT_PATTERNS, false)
}

/// Regular files under `root` matching any of `patterns`, sorted and
/// de-duplicated. With `recursive`, subdirectories are searched as well.
/// An empty pattern list means `*.csv`.
pub fn find_files(root: impl AsRef<Path>, patterns: &[&str], recursive: bool) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(IngestError::SourceNotFound(root.to_path_buf()));
    }
    let root_str = root.to_str().ok_or_else(|| {
        IngestError::Configuration(format!("path {} is not valid UTF-8", root.display()))
    })?;
    let escaped_root = Pattern::escape(root_str);
    let patterns = if patterns.is_empty() {
        DEFAULT_PATTERNS
    } else {
        patterns
    };

    let mut files = Vec::new();
    for pattern in patterns {
        let full_pattern = if recursive {
            format!("{}/**/{}", escaped_root, pattern)
        } else {
            format!("{}/{}", escaped_root, pattern)
        };
        let entries = glob::glob(&full_pattern).map_err(|e| {
            IngestError::Configuration(format!("invalid pattern '{}': {}", pattern, e))
        })?;
        for entry in entries {
            let path = entry.map_err(|e| IngestError::Io(e.into()))?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    debug!("Found {} file(s) under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "a\n1\n").unwrap();
    }

    #[test]
    fn test_list_csv_files_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.csv"));
        touch(&dir.path().join("a.csv"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("nested/c.csv"));

        let files = list_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_find_files_recursive_with_patterns() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("top.csv"));
        touch(&dir.path().join("nested/deeper/inner.csv"));
        touch(&dir.path().join("nested/readme.txt"));

        let csv = find_files(dir.path(), &["*.csv"], true).unwrap();
        assert_eq!(csv.len(), 2);

        let mixed = find_files(dir.path(), &["*.csv", "*.txt"], true).unwrap();
        assert_eq!(mixed.len(), 3);

        let defaulted = find_files(dir.path(), &[], false).unwrap();
        assert_eq!(defaulted, vec![dir.path().join("top.csv")]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = list_csv_files(dir.path().join("missing"));
        assert!(matches!(result, Err(IngestError::SourceNotFound(_))));
    }
}
