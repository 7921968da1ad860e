//! File discovery helpers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Supported FITS file extensions.
pub const FITS_EXTENSIONS: &[&str] = &["fit", "fits"];

/// Returns FITS files in `dir` whose file name starts with `prefix` and
/// contains `needle`, sorted by path.
///
/// A missing directory yields an empty list; other I/O failures propagate.
pub fn fits_files_matching(dir: &Path, prefix: &str, needle: &str) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        if !FITS_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && name.contains(needle) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Create `dir` (and parents) unless it already exists.
///
/// Returns `true` when the directory was created by this call.
pub fn ensure_dir(dir: &Path) -> io::Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    Ok(true)
}
