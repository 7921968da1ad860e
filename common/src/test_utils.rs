//! Helpers for tests that touch the filesystem.

use std::path::PathBuf;

/// Returns the workspace root directory (parent of the calling crate).
fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Returns a fresh, empty directory under `test_output/` for one test.
///
/// The directory name includes the process id so concurrent test binaries
/// never share state. Any leftovers from a previous run are removed.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = workspace_root()
        .join("test_output")
        .join(format!("{}_{}", name, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).expect("Failed to clear scratch directory");
    }
    std::fs::create_dir_all(&dir).expect("Failed to create scratch directory");
    dir
}
