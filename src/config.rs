//! Configuration files.
//!
//! Configuration is either a single TOML file or a directory of `*.toml` files,
//! loaded in file name order and merged into one [`Config`]:
//!
//! ```toml
//! [global]
//! check_interval = "5m"
//! min_free_percent = 20.0
//! min_free_bytes = "10GB"
//!
//! [[location]]
//! target_dirs = ["/var/cache/app"]
//! dry_run = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tokio::fs;
use tracing::info;

use crate::errors::{ConfigError, UnitParseError};
use crate::monitor::Location;
use crate::threshold::ReclamationPolicy;
use crate::units::{parse_bytes, parse_duration, ByteSize, HumanDuration};

/// Default interval between two checks of one location.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default minimum percentage of free space.
pub const DEFAULT_MIN_FREE_PERCENT: f64 = 10.0;

const APPLICATION: &str = "partition-vacuum";

/// Default settings applied to every location.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    pub check_interval: Duration,
    pub dry_run: bool,
    pub human_readable: bool,
    pub min_free_percent: f64,
    pub min_free_bytes: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            dry_run: false,
            human_readable: false,
            min_free_percent: DEFAULT_MIN_FREE_PERCENT,
            min_free_bytes: 0,
        }
    }
}

/// Set of target directories monitored as a unit.
///
/// Unset fields fall back to [`GlobalConfig`]. Byte sizes and durations are
/// kept as written and parsed on resolution, so a malformed value invalidates
/// only its own location.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    /// Path whose filesystem is measured. Defaults to the first target directory.
    pub partition: Option<PathBuf>,

    #[serde(default)]
    pub target_dirs: Vec<PathBuf>,

    pub min_free_percent: Option<f64>,

    /// Integer bytes or a string with unit, e.g. `"5GB"`.
    pub min_free_bytes: Option<toml::Value>,

    /// Duration string, e.g. `"30s"`.
    pub check_interval: Option<toml::Value>,

    pub dry_run: Option<bool>,
}

/// Merged configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub locations: Vec<LocationConfig>,
}

/// Contents of a single configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    global: GlobalSection,

    #[serde(default, rename = "location")]
    locations: Vec<LocationConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GlobalSection {
    check_interval: Option<HumanDuration>,
    dry_run: Option<bool>,
    human_readable: Option<bool>,
    min_free_percent: Option<f64>,
    min_free_bytes: Option<ByteSize>,
}

impl Config {
    /// Load configuration from a file or a directory of `*.toml` files.
    ///
    /// Files in a directory are loaded in file name order. Global values set
    /// in later files override earlier ones, locations are appended.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut config = Self::default();
        let metadata = fs::metadata(path).await.map_err(io_error)?;
        if metadata.is_dir() {
            for file in toml_files(path).await? {
                info!("loading config file '{}'", file.display());
                config.merge(read_file(&file).await?);
            }
        } else {
            config.merge(read_file(path).await?);
        }

        if config.locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }
        Ok(config)
    }

    /// Parse configuration from TOML text, merged onto defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let mut config = Self::default();
        config.merge(toml::from_str(text)?);
        Ok(config)
    }

    fn merge(&mut self, file: ConfigFile) {
        let global = file.global;
        if let Some(interval) = global.check_interval {
            self.global.check_interval = interval.as_duration();
        }
        if let Some(dry_run) = global.dry_run {
            self.global.dry_run = dry_run;
        }
        if let Some(human_readable) = global.human_readable {
            self.global.human_readable = human_readable;
        }
        if let Some(percent) = global.min_free_percent {
            self.global.min_free_percent = percent;
        }
        if let Some(bytes) = global.min_free_bytes {
            self.global.min_free_bytes = bytes.as_u64();
        }
        self.locations.extend(file.locations);
    }

    /// Resolve every configured location against global defaults.
    ///
    /// Invalid locations are returned as errors, valid ones are unaffected by them.
    pub fn resolve_locations(&self) -> impl Iterator<Item = Result<Location, ConfigError>> + '_ {
        self.locations
            .iter()
            .map(|location| self.resolve(location))
    }

    fn resolve(&self, location: &LocationConfig) -> Result<Location, ConfigError> {
        let global = &self.global;
        let min_free_bytes = match &location.min_free_bytes {
            Some(value) => byte_size(value)?,
            None => global.min_free_bytes,
        };
        let interval = match &location.check_interval {
            Some(value) => duration(value)?,
            None => global.check_interval,
        };
        let policy = ReclamationPolicy::builder()
            .min_free_percent(location.min_free_percent.unwrap_or(global.min_free_percent))
            .min_free_bytes(min_free_bytes)
            .dry_run(location.dry_run.unwrap_or(global.dry_run))
            .build()
            .map_err(|err| ConfigError::InvalidPolicy(err.to_string()))?;

        Ok(Location::new(
            location.partition.clone(),
            location.target_dirs.clone(),
            policy,
            interval,
        )?
        .human_readable(global.human_readable))
    }
}

fn byte_size(value: &toml::Value) -> Result<u64, UnitParseError> {
    match value {
        toml::Value::Integer(bytes) => u64::try_from(*bytes)
            .map_err(|_| UnitParseError::InvalidByteSize(bytes.to_string())),
        toml::Value::String(text) => parse_bytes(text),
        other => Err(UnitParseError::InvalidByteSize(other.to_string())),
    }
}

fn duration(value: &toml::Value) -> Result<Duration, UnitParseError> {
    match value {
        toml::Value::String(text) => parse_duration(text),
        other => Err(UnitParseError::InvalidDuration(other.to_string())),
    }
}

async fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Regular `*.toml` files directly inside `dir`, sorted by name.
async fn toml_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir).await.map_err(io_error)?;
    let mut files = vec![];
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "toml") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Per-user configuration directory, e.g. `~/.config/partition-vacuum` on Linux.
fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Candidate configuration paths, in priority order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = user_config_dir().into_iter().collect();
    if cfg!(unix) {
        paths.push(Path::new("/etc").join(APPLICATION));
    }
    paths
}

/// First existing default configuration path.
pub fn discover_config_path() -> Option<PathBuf> {
    default_config_paths().into_iter().find(|path| path.exists())
}
