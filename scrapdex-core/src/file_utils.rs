//! File utility functions for static data directories.

use crate::error::{ScrapdexError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively find files with given extension in a directory.
pub fn find_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(ScrapdexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Some(ext) = entry.path().extension() {
                if ext == extension {
                    files.push(entry.path().to_path_buf());
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Read file with UTF-8 encoding.
pub fn read_utf8_file(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

/// Read and parse a JSON document.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let text = read_utf8_file(path)?;
    serde_json::from_str(&text).map_err(|e| {
        ScrapdexError::Parse(format!("Invalid JSON in {}: {}", path.display(), e))
    })
}

/// File stem as an owned string, used as an item id fallback.
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}
