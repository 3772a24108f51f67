//! Work directories
//!
//! Each worker unit owns one directory for its whole lifetime. It is emptied
//! before every job, then the job's input files are written into it and the
//! supervised programs run inside it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A work directory could not be emptied
#[derive(Debug, Error)]
#[error("failed to clean {path} ({failed} entr(ies) left): {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    /// Number of entries that could not be removed
    pub failed: usize,
    /// First error encountered
    #[source]
    pub source: io::Error,
}

/// A file name that would resolve outside the work directory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid file name '{0}': must be a plain name inside the work directory")]
pub struct InvalidFileName(pub String);

/// Directory exclusively owned by one worker unit
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a file directly inside the directory
    ///
    /// Only a single plain path component is accepted: no separators, no
    /// `..`, no absolute paths.
    pub fn entry(&self, name: &str) -> Result<PathBuf, InvalidFileName> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => Err(InvalidFileName(name.to_string())),
        }
    }

    #[cfg(test)]
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Removes every entry inside the directory, creating it if absent
    ///
    /// All entries are attempted before the first failure is reported.
    pub fn reset(&self) -> Result<(), CleanupError> {
        self.clear_with(|path, is_dir| {
            if is_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            }
        })
    }

    fn clear_with<F>(&self, remove: F) -> Result<(), CleanupError>
    where
        F: Fn(&Path, bool) -> io::Result<()>,
    {
        let cleanup_error = |source: io::Error, failed: usize| CleanupError {
            path: self.root.clone(),
            failed,
            source,
        };

        fs::create_dir_all(&self.root).map_err(|e| cleanup_error(e, 0))?;
        let entries = fs::read_dir(&self.root).map_err(|e| cleanup_error(e, 0))?;

        let mut first_error = None;
        let mut failed = 0;

        for entry in entries {
            let result = entry.and_then(|entry| {
                let is_dir = entry.file_type()?.is_dir();
                remove(&entry.path(), is_dir)
            });

            if let Err(e) = result {
                warn!("Failed to remove entry in {}: {}", self.root.display(), e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(source) => Err(cleanup_error(source, failed)),
            None => {
                debug!("Work directory {} is clean", self.root.display());
                Ok(())
            }
        }
    }

    /// Writes an input file, replacing any file of the same name
    pub fn write_input(&self, name: &str, content: &str) -> io::Result<PathBuf> {
        let path = self
            .entry(name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_removes_leftovers() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkDir::new(tmp.path().join("thread-0"));

        dir.write_input("scenario.json", "{}").unwrap();
        dir.write_input("simulation_output.txt", "log").unwrap();
        fs::create_dir_all(dir.file("nested")).unwrap();

        dir.reset().unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_twice_on_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkDir::new(tmp.path());

        dir.reset().unwrap();
        dir.reset().unwrap();

        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_reset_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkDir::new(tmp.path().join("a").join("b"));

        dir.reset().unwrap();

        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_write_input_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkDir::new(tmp.path().join("thread-1"));

        dir.write_input("post.py", "print(1)").unwrap();
        let path = dir.write_input("post.py", "print(2)").unwrap();

        assert_eq!(path, dir.file("post.py"));
        assert_eq!(fs::read_to_string(path).unwrap(), "print(2)");
    }

    #[test]
    fn test_entry_accepts_plain_names_only() {
        let dir = WorkDir::new("/jobs/thread-0");

        assert_eq!(
            dir.entry("my scenario.json").unwrap(),
            PathBuf::from("/jobs/thread-0/my scenario.json")
        );
        assert_eq!(dir.entry("cyclus.h5").unwrap(), PathBuf::from("/jobs/thread-0/cyclus.h5"));

        for name in ["", ".", "..", "../x.json", "/tmp/x.json", "a/b.json", "cyclus./../x"] {
            assert_eq!(dir.entry(name), Err(InvalidFileName(name.to_string())), "{}", name);
        }
    }

    #[test]
    fn test_write_input_refuses_to_leave_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkDir::new(tmp.path().join("thread-0"));

        let err = dir.write_input("../escaped.json", "{}").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!tmp.path().join("escaped.json").exists());
    }

    #[test]
    fn test_cleanup_attempts_every_entry_then_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WorkDir::new(tmp.path());
        for name in ["locked-a", "free-1", "locked-b", "free-2"] {
            dir.write_input(name, "x").unwrap();
        }

        let err = dir
            .clear_with(|path, _| {
                let name = path.file_name().unwrap().to_string_lossy();
                if name.starts_with("locked") {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
                } else {
                    fs::remove_file(path)
                }
            })
            .unwrap_err();

        assert_eq!(err.failed, 2);
        assert_eq!(err.path, tmp.path());
        assert_eq!(err.source.kind(), io::ErrorKind::PermissionDenied);
        assert!(!dir.file("free-1").exists());
        assert!(!dir.file("free-2").exists());
        assert!(dir.file("locked-a").exists());
        assert!(dir.file("locked-b").exists());
    }
}
