//! Filesystem abstraction and record file naming.
//!
//! Records are appended as JSON lines to hourly files named
//! `records_YYYYMMDDHH.jsonl` so a long session never produces one huge file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{TimeZone, Utc};
use thiserror::Error;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("path error: {0}")]
    Path(String),
}

/// Trait for filesystem operations.
/// Abstracted for testing with mock implementations.
pub trait Filesystem: Send + Sync {
    /// Append data to a file, creating it (and its parent) if needed.
    fn append_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create directory and parents if needed.
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn append_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        // sync_data skips the metadata sync; enough for append-only files
        file.sync_data()?;

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(path)?;
        Ok(())
    }
}

/// In-memory filesystem for tests.
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<RwLock<HashSet<PathBuf>>>,
    failing_appends: Arc<AtomicUsize>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all files in the mock filesystem.
    pub fn files(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.files.read().unwrap().clone()
    }

    /// Get content of a specific file.
    pub fn get_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(path).cloned()
    }

    /// Get content of a specific file as text.
    pub fn get_text(&self, path: &Path) -> Option<String> {
        self.get_file(path)
            .map(|data| String::from_utf8_lossy(&data).to_string())
    }

    /// Add a file directly (for test setup).
    pub fn add_file(&self, path: PathBuf, data: Vec<u8>) {
        self.files.write().unwrap().insert(path, data);
    }

    /// Make the next `count` appends fail with an IO error.
    pub fn fail_next_appends(&self, count: usize) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }
}

impl Filesystem for MockFilesystem {
    fn append_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let should_fail = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated append failure: {}", path.display()),
            )));
        }

        let mut files = self.files.write().unwrap();
        files
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path) || self.dirs.read().unwrap().contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.dirs.write().unwrap().insert(path.to_path_buf());
        Ok(())
    }
}

/// Hourly record filename for a Unix millisecond timestamp.
/// Format: records_YYYYMMDDHH.jsonl
pub fn records_filename(ts_unix_ms: u64) -> String {
    let secs = (ts_unix_ms / 1000) as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| format!("records_{}.jsonl", dt.format("%Y%m%d%H")))
        .unwrap_or_else(|| format!("records_{}.jsonl", secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ===========================================
    // Hourly naming
    // ===========================================

    #[test]
    fn test_records_filename_format() {
        // 2024-01-01 00:00:00 UTC
        assert_eq!(records_filename(1_704_067_200_000), "records_2024010100.jsonl");
    }

    #[test]
    fn test_records_filename_same_hour() {
        // 2024-01-01 00:59:59.999 UTC
        assert_eq!(records_filename(1_704_070_799_999), "records_2024010100.jsonl");
    }

    #[test]
    fn test_records_filename_next_hour() {
        assert_eq!(records_filename(1_704_070_800_000), "records_2024010101.jsonl");
    }

    #[test]
    fn test_records_filename_epoch() {
        assert_eq!(records_filename(0), "records_1970010100.jsonl");
    }

    // ===========================================
    // MockFilesystem
    // ===========================================

    #[test]
    fn test_mock_append_creates_then_appends() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/records.jsonl");

        fs.append_atomic(&path, b"one\n").expect("append");
        fs.append_atomic(&path, b"two\n").expect("append");

        assert_eq!(fs.get_text(&path).as_deref(), Some("one\ntwo\n"));
    }

    #[test]
    fn test_mock_fail_next_appends() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/records.jsonl");
        fs.fail_next_appends(2);

        assert!(fs.append_atomic(&path, b"a\n").is_err());
        assert!(fs.append_atomic(&path, b"b\n").is_err());
        fs.append_atomic(&path, b"c\n").expect("third append succeeds");

        assert_eq!(fs.get_text(&path).as_deref(), Some("c\n"));
    }

    #[test]
    fn test_mock_exists_tracks_dirs_and_files() {
        let fs = MockFilesystem::new();
        let dir = PathBuf::from("/tmp/out");
        assert!(!fs.exists(&dir));

        fs.create_dir_all(&dir).expect("mkdir");
        assert!(fs.exists(&dir));

        fs.add_file(dir.join("a.csv"), vec![]);
        assert!(fs.exists(&dir.join("a.csv")));
    }

    #[test]
    fn test_mock_clone_shares_state() {
        let fs = MockFilesystem::new();
        let other = fs.clone();
        fs.add_file(PathBuf::from("/x"), b"1".to_vec());
        assert!(other.exists(Path::new("/x")));
    }

    // ===========================================
    // RealFilesystem
    // ===========================================

    #[test]
    fn test_real_fs_append_creates_parent_dirs() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let path = dir.path().join("nested").join("records.jsonl");

        fs.append_atomic(&path, b"line1\n").expect("append");
        fs.append_atomic(&path, b"line2\n").expect("append");

        assert_eq!(fs::read_to_string(&path).expect("read"), "line1\nline2\n");
    }

    #[test]
    fn test_real_fs_append_keeps_existing_content() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let path = dir.path().join("summary.csv");
        fs::write(&path, "header\n").expect("seed");

        fs.append_atomic(&path, b"row\n").expect("append");

        assert_eq!(fs::read_to_string(&path).expect("read"), "header\nrow\n");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_real_fs_create_dir_all() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let nested = dir.path().join("a").join("b");

        fs.create_dir_all(&nested).expect("mkdir");
        assert!(fs.exists(&nested));
    }

    /// Appending, probing and mkdir are the whole surface callers need.
    struct RejectingFs;

    impl Filesystem for RejectingFs {
        fn append_atomic(&self, path: &Path, _data: &[u8]) -> Result<(), FsError> {
            Err(FsError::Path(format!("read-only: {}", path.display())))
        }

        fn exists(&self, _path: &Path) -> bool {
            false
        }

        fn create_dir_all(&self, _path: &Path) -> Result<(), FsError> {
            Ok(())
        }
    }

    #[test]
    fn test_minimal_filesystem_impl() {
        let fs: &dyn Filesystem = &RejectingFs;
        fs.create_dir_all(Path::new("/out")).expect("mkdir");
        let err = fs.append_atomic(Path::new("/out/a.jsonl"), b"x\n").unwrap_err();
        assert!(err.to_string().contains("read-only: /out/a.jsonl"));
    }

    #[test]
    fn test_filesystem_trait_object() {
        let fs: Box<dyn Filesystem> = Box::new(MockFilesystem::new());
        assert!(!fs.exists(Path::new("/anything")));
    }
}
