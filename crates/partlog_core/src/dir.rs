//! On-disk segment directory.
//!
//! This module handles the file system layout of a log:
//!
//! ```text
//! <log_path>/
//! ├─ LOCK                          # Advisory lock for single-writer
//! ├─ seg-0000000000000000.wal      # Oldest retained segment
//! ├─ seg-0000000000000001.wal
//! └─ seg-0000000000000002.wal      # Active segment
//! ```
//!
//! New segments are written as `seg-<index>.wal.tmp`, synced and renamed
//! into place, so a listed segment always has its header.

use crate::error::{CoreError, CoreResult};
use crate::wal::SegmentDirectory;
use fs2::FileExt;
use partlog_storage::{FileBackend, StorageBackend};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const SEGMENT_PREFIX: &str = "seg-";
const SEGMENT_SUFFIX: &str = ".wal";
const TEMP_SUFFIX: &str = ".tmp";

/// Segment directory backed by files.
///
/// # Thread Safety
///
/// The directory holds an exclusive lock on `LOCK` for its lifetime. Only
/// one `FsSegmentDirectory` can exist per path at a time, across processes.
///
/// # Example
///
/// ```rust,ignore
/// use partlog_core::{FsSegmentDirectory, WalConfig, WalManager};
/// use std::sync::Arc;
///
/// let dir = Arc::new(FsSegmentDirectory::open(Path::new("wal"), true)?);
/// let wal = WalManager::open(dir, WalConfig::default())?;
/// ```
#[derive(Debug)]
pub struct FsSegmentDirectory {
    path: PathBuf,
    _lock_file: File,
}

impl FsSegmentDirectory {
    /// Opens or creates a log directory and takes its lock.
    ///
    /// Leftover temporary segments from an interrupted rotation are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_argument(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_argument(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked);
        }

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };
        dir.remove_temp_files()?;
        Ok(dir)
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of segment `index`.
    #[must_use]
    pub fn segment_path(&self, index: u64) -> PathBuf {
        self.path
            .join(format!("{SEGMENT_PREFIX}{index:016}{SEGMENT_SUFFIX}"))
    }

    fn temp_path(&self, index: u64) -> PathBuf {
        self.path.join(format!(
            "{SEGMENT_PREFIX}{index:016}{SEGMENT_SUFFIX}{TEMP_SUFFIX}"
        ))
    }

    fn remove_temp_files(&self) -> CoreResult<()> {
        let mut removed = false;
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(SEGMENT_PREFIX) && name.ends_with(TEMP_SUFFIX) {
                debug!(file = name, "removing unpublished segment");
                fs::remove_file(entry.path())?;
                removed = true;
            }
        }
        if removed {
            self.sync_directory()?;
        }
        Ok(())
    }

    fn existing_segment(&self, index: u64) -> CoreResult<PathBuf> {
        let path = self.segment_path(index);
        if !path.exists() {
            return Err(CoreError::SegmentMissing { index });
        }
        Ok(path)
    }

    /// Syncs the directory so that creations, renames and deletions are durable.
    ///
    /// Windows NTFS journals metadata, so there is no explicit directory
    /// fsync there.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

impl SegmentDirectory for FsSegmentDirectory {
    fn list_segments(&self) -> CoreResult<Vec<u64>> {
        let mut indexes = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_segment_name) {
                indexes.push(index);
            }
        }
        indexes.sort_unstable();
        Ok(indexes)
    }

    fn open_for_read(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>> {
        let path = self.existing_segment(index)?;
        match FileBackend::open_read_only(&path) {
            Ok(backend) => Ok(Box::new(backend)),
            // removed between the existence check and the open
            Err(partlog_storage::StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::SegmentMissing { index })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_segment(&self, index: u64, header: &[u8]) -> CoreResult<Box<dyn StorageBackend>> {
        let path = self.segment_path(index);
        if path.exists() {
            return Err(CoreError::invalid_argument(format!(
                "segment {index} already exists"
            )));
        }

        let temp = self.temp_path(index);
        let mut file = File::create(&temp)?;
        file.write_all(header)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &path)?;
        self.sync_directory()?;

        Ok(Box::new(FileBackend::open(&path)?))
    }

    fn open_for_append(&self, index: u64) -> CoreResult<Box<dyn StorageBackend>> {
        let path = self.existing_segment(index)?;
        Ok(Box::new(FileBackend::open(&path)?))
    }

    fn remove(&self, index: u64) -> CoreResult<()> {
        let path = self.existing_segment(index)?;
        fs::remove_file(&path)?;
        self.sync_directory()?;
        Ok(())
    }
}
