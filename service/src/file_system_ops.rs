//! File system operations abstraction for testing
//!
//! Services perform all disk access through the [`FileSystemOps`] trait so
//! pipelines can be tested against a mock without touching the real file
//! system. `StdFileSystemOps` is the production implementation.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long a deadline-bounded deletion waits between retries.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SimpleDirEntry {
    pub path: PathBuf,
    pub is_file: bool,
}

/// Trait for file system operations to enable testing
pub trait FileSystemOps: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn file_size(&self, path: &Path) -> io::Result<u64>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Move a file, creating the destination's parent directories.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Recursively delete a directory. A missing directory counts as
    /// success. With a deadline the deletion is retried until the deadline
    /// passes, so a stuck filesystem cannot block shutdown indefinitely.
    fn remove_dir_all(&self, path: &Path, deadline: Option<Duration>) -> io::Result<()>;

    /// List the direct children of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<SimpleDirEntry>>;

    /// List all files under a directory recursively.
    fn read_dir_recursive(&self, path: &Path) -> io::Result<Vec<SimpleDirEntry>>;
}

/// Production implementation using std::fs
#[derive(Debug, Clone, Copy)]
pub struct StdFileSystemOps;

impl FileSystemOps for StdFileSystemOps {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|m| m.len())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?
        }
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path, deadline: Option<Duration>) -> io::Result<()> {
        let started = Instant::now();
        loop {
            match std::fs::remove_dir_all(path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    let Some(limit) = deadline else { return Err(e) };
                    if started.elapsed() >= limit {
                        return Err(e);
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
            }
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<SimpleDirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            let is_file = path.is_file();
            entries.push(SimpleDirEntry { path, is_file });
        }
        Ok(entries)
    }

    fn read_dir_recursive(&self, path: &Path) -> io::Result<Vec<SimpleDirEntry>> {
        let mut entries = Vec::new();
        let mut pending = vec![path.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    pending.push(entry_path);
                } else {
                    entries.push(SimpleDirEntry {
                        path: entry_path,
                        is_file: true,
                    });
                }
            }
        }
        Ok(entries)
    }
}

pub mod mock {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;

    /// In-memory file system for tests. Tracks a flat set of file paths and
    /// records every deletion so tests can assert on cleanup behavior.
    #[derive(Debug, Default)]
    pub struct MockFileSystemOps {
        files: Mutex<BTreeSet<PathBuf>>,
        deleted: Mutex<Vec<PathBuf>>,
    }

    impl MockFileSystemOps {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_file(&self, path: impl Into<PathBuf>) {
            self.files.lock().unwrap().insert(path.into());
        }

        pub fn was_deleted(&self, path: impl Into<PathBuf>) -> bool {
            self.deleted.lock().unwrap().contains(&path.into())
        }

        pub fn deleted_paths(&self) -> Vec<PathBuf> {
            self.deleted.lock().unwrap().clone()
        }
    }

    impl FileSystemOps for MockFileSystemOps {
        fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains(path)
        }

        fn file_size(&self, path: &Path) -> io::Result<u64> {
            if self.exists(path) {
                Ok(0)
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
            }
        }

        fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }

        fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            if !self.exists(from) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
            }
            self.files.lock().unwrap().insert(to.to_path_buf());
            Ok(())
        }

        fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            let mut files = self.files.lock().unwrap();
            if !files.remove(from) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
            }
            files.insert(to.to_path_buf());
            Ok(())
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            let mut files = self.files.lock().unwrap();
            if !files.remove(path) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
            }
            self.deleted.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn remove_dir_all(&self, path: &Path, _deadline: Option<Duration>) -> io::Result<()> {
            let mut files = self.files.lock().unwrap();
            let under: Vec<PathBuf> = files
                .iter()
                .filter(|f| f.starts_with(path))
                .cloned()
                .collect();
            for file in &under {
                files.remove(file);
            }
            self.deleted.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn read_dir(&self, path: &Path) -> io::Result<Vec<SimpleDirEntry>> {
            let files = self.files.lock().unwrap();
            Ok(files
                .iter()
                .filter(|f| f.parent() == Some(path))
                .map(|f| SimpleDirEntry {
                    path: f.clone(),
                    is_file: true,
                })
                .collect())
        }

        fn read_dir_recursive(&self, path: &Path) -> io::Result<Vec<SimpleDirEntry>> {
            let files = self.files.lock().unwrap();
            Ok(files
                .iter()
                .filter(|f| f.starts_with(path))
                .map(|f| SimpleDirEntry {
                    path: f.clone(),
                    is_file: true,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockFileSystemOps;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_dir_all_tolerates_missing_directory() {
        let ops = StdFileSystemOps;
        let result = ops.remove_dir_all(Path::new("/nonexistent/staging-dir"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_remove_dir_all_deletes_recursively() {
        let temp_dir = tempdir().unwrap();
        let staging = temp_dir.path().join("staging");
        std::fs::create_dir_all(staging.join("nested")).unwrap();
        std::fs::write(staging.join("nested/file.bin"), b"x").unwrap();

        let ops = StdFileSystemOps;
        ops.remove_dir_all(&staging, Some(Duration::from_secs(1)))
            .unwrap();
        assert!(!staging.exists());
    }

    #[test]
    fn test_move_file_creates_parent_directories() {
        let temp_dir = tempdir().unwrap();
        let from = temp_dir.path().join("a.chd");
        std::fs::write(&from, b"x").unwrap();
        let to = temp_dir.path().join("success/sub/a.chd");

        let ops = StdFileSystemOps;
        ops.move_file(&from, &to).unwrap();
        assert!(to.exists());
        assert!(!from.exists());
    }

    #[test]
    fn test_mock_tracks_deletions() {
        let mock = MockFileSystemOps::new();
        mock.add_file("/data/game.cue");
        mock.add_file("/data/track01.bin");

        mock.remove_file(Path::new("/data/game.cue")).unwrap();
        assert!(mock.was_deleted("/data/game.cue"));
        assert!(!mock.was_deleted("/data/track01.bin"));
        assert!(mock.exists(Path::new("/data/track01.bin")));
    }
}
