use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::{check_same, DiskStats};
use crate::errors::{ConfigError, DiskUsageError};
use crate::threshold::UsageSnapshot;

/// Volume statistics from `fs2` (`GetDiskFreeSpaceExW`).
///
/// Free space is the space available to the calling user.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsDiskStats;

impl DiskStats for WindowsDiskStats {
    fn disk_usage(&self, path: &Path) -> Result<UsageSnapshot, DiskUsageError> {
        let io_error = |source| DiskUsageError::Io {
            path: path.to_path_buf(),
            source,
        };
        let total = fs2::total_space(path).map_err(io_error)?;
        let available = fs2::available_space(path).map_err(io_error)?;

        Ok(UsageSnapshot::new(total, available))
    }

    fn same_filesystem(&self, paths: &[PathBuf]) -> Result<(), ConfigError> {
        check_same(paths, |path| {
            let absolute = std::path::absolute(path).map_err(|source| ConfigError::Stat {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(volume(&absolute))
        })
    }
}

/// Volume prefix of an absolute path, e.g. `C:` or `\\server\share`.
fn volume(path: &Path) -> Option<OsString> {
    match path.components().next() {
        Some(Component::Prefix(prefix)) => Some(prefix.as_os_str().to_ascii_uppercase()),
        _ => None,
    }
}
