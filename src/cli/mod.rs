use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use partition_vacuum::config::{self, DEFAULT_MIN_FREE_PERCENT};
use partition_vacuum::errors::ConfigError;
use partition_vacuum::units::{ByteSize, HumanDuration};
use partition_vacuum::{disk, Config, Daemon, Location, ReclamationPolicy};

/// CLI interface of Partition Vacuum.
///
/// Without `--config` the default configuration locations are checked first.
/// If none exists, a single location is built from command line flags.
#[derive(Parser, Clone, Debug)]
#[command(about = "Partition Vacuum: keeps free disk space above a threshold")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Path to the partition to monitor (e.g. `/`).
    #[arg(long, value_name = "PATH")]
    partition: Option<PathBuf>,

    /// Path to the directory to clean up (e.g. `/var/log/app`).
    #[arg(long, alias = "targetDir", value_name = "PATH")]
    target_dir: Option<PathBuf>,

    /// Minimum percentage of free space to maintain.
    #[arg(
        long,
        alias = "minFreePercent",
        value_name = "PERCENT",
        default_value_t = DEFAULT_MIN_FREE_PERCENT
    )]
    min_free_percent: f64,

    /// Minimum free space to maintain (e.g. `10GB`).
    #[arg(long, alias = "minFreeBytes", value_name = "SIZE")]
    min_free_bytes: Option<ByteSize>,

    /// How often to check disk usage (e.g. `30s`, `5m`, `1h30m`).
    #[arg(long, alias = "checkInterval", value_name = "DURATION", default_value = "1m")]
    check_interval: HumanDuration,

    /// Simulate deletion without actually removing files.
    #[arg(long, alias = "dryRun")]
    dry_run: bool,

    /// Show sizes in human-readable format.
    #[arg(short = 'H', long)]
    human_readable: bool,

    /// Path to configuration file or directory.
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print version and exit.
    #[arg(short = 'v', long)]
    version: bool,
}

impl Cli {
    pub async fn execute(&self) -> anyhow::Result<()> {
        if self.version {
            println!("Partition Vacuum version {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        match self.config.clone().or_else(config::discover_config_path) {
            Some(path) => self.run_config_mode(&path).await,
            None => self.run_legacy_mode().await,
        }
    }

    /// Monitor a single location described by command line flags.
    async fn run_legacy_mode(&self) -> anyhow::Result<()> {
        let (Some(partition), Some(target_dir)) = (&self.partition, &self.target_dir) else {
            return Err(ConfigError::MissingArguments)
                .context("use --partition and --target-dir, or provide --config (see --help)");
        };

        let policy = ReclamationPolicy::builder()
            .min_free_percent(self.min_free_percent)
            .min_free_bytes(self.min_free_bytes.unwrap_or_default().as_u64())
            .dry_run(self.dry_run)
            .build()
            .map_err(|err| ConfigError::InvalidPolicy(err.to_string()))
            .context("invalid policy")?;
        let location = Location::new(
            Some(partition.clone()),
            vec![target_dir.clone()],
            policy,
            self.check_interval.as_duration(),
        )
        .context("invalid location")?
        .human_readable(self.human_readable);

        let disk = disk::system();
        location
            .validate(disk.as_ref())
            .context("invalid location")?;

        info!("starting Partition Vacuum daemon (legacy mode)");
        info!("monitoring partition: {}", partition.display());
        info!("target directory: {}", target_dir.display());
        info!("minimum free space: {:.2}%", self.min_free_percent);
        if let Some(bytes) = self.min_free_bytes {
            info!("minimum free bytes: {}", bytes);
        }
        info!("check interval: {}", self.check_interval);
        if self.dry_run {
            info!("DRY RUN MODE ENABLED");
        }

        run_daemon(vec![location], disk).await;
        Ok(())
    }

    /// Monitor every valid location from configuration.
    ///
    /// Invalid locations are skipped. Fails only if no location is valid.
    async fn run_config_mode(&self, path: &Path) -> anyhow::Result<()> {
        let source = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        info!("using configuration source: {}", source.display());

        let config = Config::load(path)
            .await
            .context("failed to load config")?;
        info!("starting Partition Vacuum daemon (config mode)");

        let disk = disk::system();
        let mut locations = vec![];
        for (idx, resolved) in config.resolve_locations().enumerate() {
            match resolved.and_then(|location| location.validate(disk.as_ref()).map(|_| location)) {
                Ok(location) => locations.push(location),
                Err(err) => error!("skipping location #{}: {}", idx + 1, err),
            }
        }
        if locations.is_empty() {
            anyhow::bail!("no valid locations to monitor");
        }

        run_daemon(locations, disk).await;
        Ok(())
    }
}

async fn run_daemon(locations: Vec<Location>, disk: std::sync::Arc<dyn disk::DiskStats>) {
    let daemon = Daemon::start(locations, disk);
    daemon
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn test_verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["partition-vacuum"]).unwrap();
        assert_eq!(cli.min_free_percent, DEFAULT_MIN_FREE_PERCENT);
        assert_eq!(cli.check_interval.as_duration(), Duration::from_secs(60));
        assert!(!cli.dry_run);
        assert!(cli.min_free_bytes.is_none());
    }

    #[test]
    fn test_legacy_flag_aliases() {
        let cli = Cli::try_parse_from([
            "partition-vacuum",
            "--partition",
            "/",
            "--targetDir",
            "/var/log/app",
            "--minFreePercent",
            "20",
            "--minFreeBytes",
            "5GB",
            "--checkInterval",
            "30s",
            "--dryRun",
            "-H",
        ])
        .unwrap();
        assert_eq!(cli.partition, Some(PathBuf::from("/")));
        assert_eq!(cli.target_dir, Some(PathBuf::from("/var/log/app")));
        assert_eq!(cli.min_free_percent, 20.0);
        assert_eq!(cli.min_free_bytes, Some(ByteSize(5 * 1024 * 1024 * 1024)));
        assert_eq!(cli.check_interval.as_duration(), Duration::from_secs(30));
        assert!(cli.dry_run);
        assert!(cli.human_readable);
    }

    #[test]
    fn test_invalid_byte_size_rejected() {
        assert!(Cli::try_parse_from(["partition-vacuum", "--min-free-bytes", "lots"]).is_err());
    }

    #[tokio::test]
    async fn test_legacy_mode_requires_arguments() {
        let cli = Cli::try_parse_from(["partition-vacuum", "--partition", "/"]).unwrap();
        let err = cli.run_legacy_mode().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingArguments)
        ));
    }

    #[tokio::test]
    async fn test_config_mode_without_valid_locations() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("config.toml");
        tokio::fs::write(&file, "[[location]]\ntarget_dirs = []\n")
            .await
            .unwrap();
        let cli = Cli::try_parse_from(["partition-vacuum"]).unwrap();

        let err = cli.run_config_mode(&file).await.unwrap_err();

        assert!(err.to_string().contains("no valid locations"));
    }
}
