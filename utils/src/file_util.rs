use std::path::{Path, PathBuf};

/// Recursively scan `dir` and return the first file whose extension is in
/// `extensions` (lowercase comparison). Directories are visited in the order
/// the OS yields them.
pub fn find_first_by_extension(dir: &Path, extensions: &[&str]) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if has_extension(&path, extensions) {
            return Some(path);
        }
    }
    for subdir in subdirs {
        if let Some(found) = find_first_by_extension(&subdir, extensions) {
            return Some(found);
        }
    }
    None
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            extensions.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
