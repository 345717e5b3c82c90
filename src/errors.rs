//! Error types.

use std::io;
use std::path::PathBuf;

/// Target directory could not be scanned.
///
/// Aborts the current cycle of the location owning the directory.
#[derive(thiserror::Error, Debug)]
#[error("failed to scan target directory '{}'", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Single file could not be deleted.
///
/// Recorded in [`ReclamationResult`][crate::ReclamationResult], never aborts a cycle.
#[derive(thiserror::Error, Debug)]
#[error("failed to delete '{}': {source}", path.display())]
pub struct DeletionError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Every eligible file was processed, but the budget is still not met.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deleted all eligible files but still need {shortfall} bytes")]
pub struct InsufficientReclamation {
    /// Bytes still owed.
    pub shortfall: u64,
}

/// Disk usage statistics are not available for a path.
#[derive(thiserror::Error, Debug)]
pub enum DiskUsageError {
    #[error("failed to get disk usage for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("disk usage is not supported on this platform")]
    Unsupported,
}

/// Byte size or duration string cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitParseError {
    #[error("empty byte size string")]
    EmptyByteSize,

    #[error("invalid byte size format: {0}")]
    InvalidByteSize(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

/// Configuration or policy is not usable.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Unit(#[from] UnitParseError),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("no locations defined in configuration")]
    NoLocations,

    #[error("location has no target directories")]
    NoTargetDirs,

    #[error("failed to stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("paths '{}' and '{}' are on different filesystems", first.display(), other.display())]
    DifferentFilesystems { first: PathBuf, other: PathBuf },

    #[error("both partition and target directory are required")]
    MissingArguments,
}

/// Reclamation cycle of one location failed.
///
/// Local to that cycle: the next scheduled cycle retries independently.
#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error("disk usage error: {0}")]
    DiskUsage(#[from] DiskUsageError),

    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
}
