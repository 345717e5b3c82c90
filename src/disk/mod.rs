//! Disk usage statistics.
//!
//! [`DiskStats`] is the only capability the monitor needs from the operating system.
//! [`system()`] returns the implementation for the current platform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{ConfigError, DiskUsageError};
use crate::threshold::UsageSnapshot;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixDiskStats;
#[cfg(windows)]
pub use windows::WindowsDiskStats;

/// Source of filesystem usage statistics.
pub trait DiskStats: Send + Sync {
    /// Usage of the filesystem containing `path`.
    fn disk_usage(&self, path: &Path) -> Result<UsageSnapshot, DiskUsageError>;

    /// Check that all `paths` reside on one filesystem.
    ///
    /// Fewer than two paths always pass.
    fn same_filesystem(&self, paths: &[PathBuf]) -> Result<(), ConfigError>;
}

/// Disk statistics of the current platform.
pub fn system() -> Arc<dyn DiskStats> {
    #[cfg(unix)]
    {
        Arc::new(UnixDiskStats)
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsDiskStats)
    }
    #[cfg(not(any(unix, windows)))]
    {
        Arc::new(UnsupportedDiskStats)
    }
}

/// Used on platforms without disk statistics support.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedDiskStats;

impl DiskStats for UnsupportedDiskStats {
    fn disk_usage(&self, _path: &Path) -> Result<UsageSnapshot, DiskUsageError> {
        Err(DiskUsageError::Unsupported)
    }

    fn same_filesystem(&self, _paths: &[PathBuf]) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Compare `key` of every path with the key of the first one.
fn check_same<K, F>(paths: &[PathBuf], mut key: F) -> Result<(), ConfigError>
where
    K: PartialEq,
    F: FnMut(&Path) -> Result<K, ConfigError>,
{
    let Some((first, rest)) = paths.split_first() else {
        return Ok(());
    };
    let first_key = key(first)?;
    for path in rest {
        if key(path)? != first_key {
            return Err(ConfigError::DifferentFilesystems {
                first: first.clone(),
                other: path.clone(),
            });
        }
    }
    Ok(())
}
