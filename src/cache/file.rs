//! File-backed review store
//!
//! Persists the snapshot as a JSON document, by default in an XDG-compliant
//! cache directory (`~/.cache/reviewcache/` on Linux). Writes go through a
//! uniquely named temp file that is synced and renamed over the target, so a
//! crash or a concurrent writer never leaves a half-written snapshot on disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use super::{select_reviews, status_of, validate_reviews, CacheStatus, ReviewStore, StoreError};
use crate::clock::Clock;
use crate::data::{ReadOptions, Review, ReviewSnapshot};

/// File name of the snapshot inside the cache directory
const SNAPSHOT_FILE: &str = "reviews.json";

/// Writes `bytes` to `path` via a synced temp file and a rename
///
/// Creates the parent directory if it is missing.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reads the snapshot at `path`; a missing file is an empty snapshot
fn read_snapshot(path: &Path) -> Result<ReviewSnapshot, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ReviewSnapshot::default()),
        Err(e) => Err(e.into()),
    }
}

/// Review store that survives restarts
///
/// Reads go back to the file, so a snapshot committed or cleared by another
/// process is seen right away. The last readable snapshot is kept in memory
/// and served if the file cannot be parsed. Within a process the write lock
/// is held across the file write and the in-memory swap.
pub struct FileReviewStore {
    /// Where the snapshot lives on disk
    path: PathBuf,
    snapshot: RwLock<ReviewSnapshot>,
    clock: Arc<dyn Clock>,
}

impl FileReviewStore {
    /// Default snapshot path under the XDG cache directory
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "reviewcache")?;
        Some(project_dirs.cache_dir().join(SNAPSHOT_FILE))
    }

    /// Snapshot path inside a custom directory
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(SNAPSHOT_FILE)
    }

    /// Opens the store at `path`, loading any snapshot already there
    ///
    /// A missing file is an empty store. A file that cannot be parsed is
    /// logged and treated as empty; the next successful refresh overwrites it.
    pub fn open(path: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let snapshot = match read_snapshot(&path) {
            Ok(snapshot) => snapshot,
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable review cache"
                );
                ReviewSnapshot::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            snapshot: RwLock::new(snapshot),
            clock,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The snapshot on disk, or the last readable one
    fn current(&self) -> ReviewSnapshot {
        match read_snapshot(&self.path) {
            Ok(snapshot) => {
                *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot.clone();
                snapshot
            }
            Err(e) => {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "serving last readable reviews"
                );
                self.snapshot.read().unwrap_or_else(|e| e.into_inner()).clone()
            }
        }
    }
}

impl ReviewStore for FileReviewStore {
    fn replace(&self, reviews: Vec<Review>) -> Result<(), StoreError> {
        validate_reviews(&reviews)?;

        let next = ReviewSnapshot {
            reviews,
            cached_at: self.clock.now(),
        };
        let json = serde_json::to_vec_pretty(&next)?;

        let mut current = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        write_atomic(&self.path, &json)?;
        tracing::info!(
            count = next.reviews.len(),
            path = %self.path.display(),
            "review cache replaced"
        );
        *current = next;
        Ok(())
    }

    fn read(&self, options: ReadOptions) -> Vec<Review> {
        select_reviews(&self.current(), options)
    }

    fn status(&self) -> CacheStatus {
        status_of(&self.current(), self.clock.now())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut current = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *current = ReviewSnapshot::default();
        tracing::info!(path = %self.path.display(), "review cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::review;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn create_test_store() -> (FileReviewStore, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = FileReviewStore::open(FileReviewStore::path_in(temp_dir.path()), clock.clone())
            .expect("open should succeed");
        (store, clock, temp_dir)
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let (store, _clock, _temp_dir) = create_test_store();
        let status = store.status();
        assert_eq!(status.count, 0);
        assert_eq!(status.cached_at, 0);
        assert!(store.read(ReadOptions::default()).is_empty());
    }

    #[test]
    fn test_replace_writes_file_and_stamps_time() {
        let (store, clock, temp_dir) = create_test_store();

        store
            .replace(vec![review("Ana", 5, 100), review("Ben", 4, 200)])
            .expect("replace should succeed");

        let path = store.path().to_path_buf();
        assert_eq!(path, temp_dir.path().join("reviews.json"));
        assert!(path.exists(), "Snapshot file should exist");
        let files = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 1, "Temp file should be renamed away");

        let content = fs::read_to_string(&path).expect("Should read file");
        assert!(content.contains("\"Ana\""));
        assert!(content.contains("\"cached_at\""));

        let status = store.status();
        assert_eq!(status.count, 2);
        assert_eq!(status.cached_at, clock.now());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let (store, clock, temp_dir) = create_test_store();
        store
            .replace(vec![review("Ana", 5, 100)])
            .expect("replace should succeed");
        drop(store);

        let reopened = FileReviewStore::open(FileReviewStore::path_in(temp_dir.path()), clock)
            .expect("reopen should succeed");
        let reviews = reopened.read(ReadOptions::default());
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author_name, "Ana");
    }

    #[test]
    fn test_invalid_batch_leaves_file_untouched() {
        let (store, clock, temp_dir) = create_test_store();
        store
            .replace(vec![review("Ana", 5, 100)])
            .expect("replace should succeed");
        let path = temp_dir.path().join("reviews.json");
        let before_file = fs::read_to_string(&path).unwrap();
        let before_status = store.status();

        clock.advance(60);
        let result = store.replace(vec![review("Ben", 3, 1), review("Cy", 9, 2)]);

        assert!(matches!(result, Err(StoreError::InvalidReview { index: 1, .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), before_file);
        assert_eq!(store.status().cached_at, before_status.cached_at);
        assert_eq!(store.read(ReadOptions::default())[0].author_name, "Ana");
    }

    #[test]
    fn test_clear_removes_file_and_is_idempotent() {
        let (store, _clock, temp_dir) = create_test_store();
        store
            .replace(vec![review("Ana", 5, 100)])
            .expect("replace should succeed");

        store.clear().expect("clear should succeed");
        assert!(!temp_dir.path().join("reviews.json").exists());
        assert_eq!(store.status().count, 0);
        assert_eq!(store.status().age_hours, 0.0);

        store.clear().expect("second clear should succeed");
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = FileReviewStore::path_in(temp_dir.path());
        fs::write(&path, "{ not json").unwrap();

        let store = FileReviewStore::open(path, Arc::new(ManualClock::new(0))).unwrap();
        assert_eq!(store.status().count, 0);
    }

    #[test]
    fn test_replace_creates_directory_if_missing() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("cache");
        let store = FileReviewStore::open(
            FileReviewStore::path_in(&nested),
            Arc::new(ManualClock::new(10)),
        )
        .unwrap();

        store.replace(vec![review("Ana", 5, 1)]).unwrap();
        assert!(nested.join("reviews.json").exists());
    }

    #[test]
    fn test_is_valid_tracks_age() {
        let (store, clock, _temp_dir) = create_test_store();
        assert!(!store.is_valid(24.0), "Empty store is never valid");

        store.replace(vec![review("Ana", 5, 100)]).unwrap();
        assert!(store.is_valid(24.0));

        clock.advance(25 * 3600);
        assert!(!store.is_valid(24.0));
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        if let Some(path) = FileReviewStore::default_path() {
            assert!(path.to_string_lossy().contains("reviewcache"));
            assert!(path.ends_with("reviews.json"));
        }
        // Passes if there is no home directory (e.g., in CI)
    }

    #[test]
    fn test_second_instance_sees_replace_and_clear() {
        let (writer, clock, temp_dir) = create_test_store();
        let path = FileReviewStore::path_in(temp_dir.path());
        let reader = FileReviewStore::open(path, clock.clone()).unwrap();

        writer.replace(vec![review("Ana", 5, 100)]).unwrap();
        assert_eq!(reader.status().count, 1);
        assert_eq!(reader.read(ReadOptions::default())[0].author_name, "Ana");

        writer.clear().unwrap();
        assert_eq!(reader.status().count, 0);
        assert!(reader.read(ReadOptions::default()).is_empty());
    }

    #[test]
    fn test_file_corrupted_later_serves_last_snapshot() {
        let (store, _clock, temp_dir) = create_test_store();
        store.replace(vec![review("Ana", 5, 100)]).unwrap();

        fs::write(temp_dir.path().join("reviews.json"), "{ truncated").unwrap();

        assert_eq!(store.status().count, 1);
    }
}
