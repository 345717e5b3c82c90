use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::sys::statvfs::statvfs;

use super::{check_same, DiskStats};
use crate::errors::{ConfigError, DiskUsageError};
use crate::threshold::UsageSnapshot;

/// `statvfs(3)` based statistics.
///
/// Free space is the space available to unprivileged users.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixDiskStats;

impl DiskStats for UnixDiskStats {
    #[allow(clippy::unnecessary_cast)]
    fn disk_usage(&self, path: &Path) -> Result<UsageSnapshot, DiskUsageError> {
        let stat = statvfs(path).map_err(|errno| DiskUsageError::Io {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        })?;

        let fragment = if stat.fragment_size() > 0 {
            stat.fragment_size() as u64
        } else {
            stat.block_size() as u64
        };
        let total = (stat.blocks() as u64).saturating_mul(fragment);
        let free = (stat.blocks_available() as u64).saturating_mul(fragment);

        Ok(UsageSnapshot::new(total, free))
    }

    fn same_filesystem(&self, paths: &[PathBuf]) -> Result<(), ConfigError> {
        check_same(paths, |path| {
            std::fs::metadata(path)
                .map(|metadata| metadata.dev())
                .map_err(|source| ConfigError::Stat {
                    path: path.to_path_buf(),
                    source,
                })
        })
    }
}
