//! File-backed storage: one JSON file per key in a directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs_err as fs;
use tokio::sync::broadcast;

use crate::storage::ChangeFeed;
use crate::{SnapshotStorage, StorageChange, StoreError, WriterId};

/// Persists each key as `<dir>/<key>.json`.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write leaves either the old value or the new one, never a torn
/// file.
///
/// Change notifications only reach cores sharing this same
/// `FileStorage` value (wrap it in an `Arc`). Writes from other processes
/// are picked up the next time the key is read.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    feed: ChangeFeed,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            feed: ChangeFeed::new(),
        }
    }

    /// The directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`. Characters outside
    /// `[A-Za-z0-9._-]` are replaced with `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl SnapshotStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8], writer: WriterId) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, &path)?;
        tracing::trace!(path = %path.display(), bytes = value.len(), "snapshot file written");
        self.feed.notify(key, writer);
        Ok(())
    }

    fn remove(&self, key: &str, writer: WriterId) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                self.feed.notify(key, writer);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
