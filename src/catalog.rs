use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, DirEntry};
use tracing::{debug, trace};

use crate::errors::ScanError;

/// Regular file found during a scan.
///
/// Immutable snapshot taken at scan time, recomputed every cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Path to the file.
    pub path: PathBuf,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Modification timestamp.
    pub modified_at: DateTime<Utc>,
}

/// Files reachable under a set of target directories, in discovery order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileCatalog {
    files: Vec<FileRecord>,
}

impl FileCatalog {
    /// Build catalog from already collected records.
    pub fn from_records(files: Vec<FileRecord>) -> Self {
        Self { files }
    }

    /// Walk every root recursively and collect regular files.
    ///
    /// Symlinks and other non-regular entries are excluded.
    /// Unreadable subdirectories and entries are skipped, but a root
    /// which cannot be opened fails the whole scan.
    pub async fn scan<P>(roots: &[P]) -> Result<Self, ScanError>
    where
        P: AsRef<Path>,
    {
        let mut files = vec![];
        let mut seen = HashSet::new();

        for root in roots {
            let root = root.as_ref();
            debug!("scanning target directory '{}'", root.display());
            let entries = fs::read_dir(root).await.map_err(|source| ScanError {
                path: root.to_path_buf(),
                source,
            })?;

            let mut pending = vec![entries];
            while let Some(mut entries) = pending.pop() {
                loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(err) => {
                            debug!("skipping unreadable directory entry: {}", err);
                            break;
                        }
                    };

                    let path = entry.path();
                    let file_type = match entry.file_type().await {
                        Ok(file_type) => file_type,
                        Err(err) => {
                            debug!("skipping '{}': {}", path.display(), err);
                            continue;
                        }
                    };

                    if file_type.is_dir() {
                        match fs::read_dir(&path).await {
                            Ok(sub) => pending.push(sub),
                            Err(err) => debug!("skipping directory '{}': {}", path.display(), err),
                        }
                    } else if file_type.is_file() {
                        // Nested or repeated roots must not produce duplicate records
                        if !seen.insert(path.clone()) {
                            continue;
                        }
                        if let Some(record) = Self::record(&entry).await {
                            files.push(record);
                        }
                    } else {
                        trace!("not a regular file: '{}'", path.display());
                    }
                }
            }
        }

        debug!("scanned {} files", files.len());
        Ok(Self { files })
    }

    async fn record(entry: &DirEntry) -> Option<FileRecord> {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!("failed to stat '{}': {}", path.display(), err);
                return None;
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(err) => {
                debug!("no modification time for '{}': {}", path.display(), err);
                return None;
            }
        };
        Some(FileRecord {
            path,
            size_bytes: metadata.len(),
            modified_at: DateTime::<Utc>::from(modified),
        })
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn into_files(self) -> Vec<FileRecord> {
        self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file sizes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.size_bytes).sum()
    }
}

/// Directory tree fixtures. Helps in testing filesystem-related code.
#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};

    use rstest::fixture;
    use tempfile::TempDir;

    /// Temporary directory tree. Removed on drop.
    pub(crate) struct TreeFixture {
        pub tmp: TempDir,
    }

    impl TreeFixture {
        pub fn new() -> Self {
            Self {
                tmp: tempfile::tempdir().unwrap(),
            }
        }

        pub fn root(&self) -> &Path {
            self.tmp.path()
        }

        pub fn path(&self, relative: &str) -> PathBuf {
            self.tmp.path().join(relative)
        }

        /// Create directory (and parents) relative to root.
        pub fn dir(&self, relative: &str) -> PathBuf {
            let path = self.path(relative);
            fs::create_dir_all(&path).unwrap();
            path
        }

        /// Write `size` zero bytes to file, modified `age` ago.
        pub fn file(&self, relative: &str, size: usize, age: Duration) -> PathBuf {
            let path = self.path(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, vec![0u8; size]).unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::now() - age)
                .unwrap();
            path
        }
    }

    #[fixture]
    pub fn tree() -> TreeFixture {
        TreeFixture::new()
    }

    pub const HOUR: Duration = Duration::from_secs(3600);
}
