//! Monitor loop.
//!
//! Every [`Location`] is monitored by its own [`Monitor`] task.
//! Tasks share no state and report every cycle to the [`Daemon`] through a channel.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn run(location: partition_vacuum::Location) {
//! use partition_vacuum::{disk, Daemon};
//!
//! let daemon = Daemon::start(vec![location], disk::system());
//!
//! // Run until interrupted, finishing in-flight cycles
//! daemon
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! # }
//! ```

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::catalog::FileCatalog;
use crate::disk::DiskStats;
use crate::errors::{ConfigError, CycleError, DiskUsageError};
use crate::executor::{ReclamationExecutor, ReclamationResult};
use crate::planner::ReclamationPlan;
use crate::pruner::{DirectoryPruner, PruneReport};
use crate::threshold::{self, ReclamationPolicy, ThresholdDecision, UsageSnapshot};
use crate::units::format_bytes;

/// Target directories monitored as a unit, with their policy.
///
/// All target directories are expected to share one filesystem, see [`Location::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Path whose filesystem is measured.
    pub partition: PathBuf,

    /// Directories to reclaim space from.
    pub target_dirs: Vec<PathBuf>,

    pub policy: ReclamationPolicy,

    /// Interval between two cycles.
    pub check_interval: Duration,

    /// Print sizes in logs in human-readable form.
    pub human_readable: bool,
}

impl Location {
    /// Create new location.
    ///
    /// If `partition` is not set, the first target directory is measured.
    pub fn new(
        partition: Option<PathBuf>,
        target_dirs: Vec<PathBuf>,
        policy: ReclamationPolicy,
        check_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let Some(first) = target_dirs.first() else {
            return Err(ConfigError::NoTargetDirs);
        };
        if check_interval.is_zero() {
            return Err(ConfigError::InvalidPolicy(
                "check interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            partition: partition.unwrap_or_else(|| first.clone()),
            target_dirs,
            policy,
            check_interval,
            human_readable: false,
        })
    }

    pub fn human_readable(mut self, human_readable: bool) -> Self {
        self.human_readable = human_readable;
        self
    }

    /// Label used in logs and reports.
    pub fn name(&self) -> String {
        self.partition.display().to_string()
    }

    /// Check that all target directories reside on one filesystem.
    ///
    /// Free space accounting is meaningless otherwise, so this must pass
    /// before the location is monitored.
    pub fn validate(&self, disk: &dyn DiskStats) -> Result<(), ConfigError> {
        disk.same_filesystem(&self.target_dirs)
    }

    fn bytes(&self, bytes: u64) -> String {
        if self.human_readable {
            format_bytes(bytes)
        } else {
            bytes.to_string()
        }
    }
}

/// Successful cycle outcome.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Free space satisfies the policy, nothing was done.
    Sufficient {
        usage: UsageSnapshot,
        decision: ThresholdDecision,
    },

    /// Reclamation pipeline was run.
    Reclaimed {
        usage: UsageSnapshot,
        decision: ThresholdDecision,
        result: ReclamationResult,
        pruned: PruneReport,
    },
}

/// Report of a single cycle, sent from a monitor task to the daemon.
#[derive(Debug)]
pub struct CycleReport {
    /// [`Location::name`] of the monitored location.
    pub location: String,

    pub human_readable: bool,

    pub outcome: Result<CycleOutcome, CycleError>,
}

impl CycleReport {
    /// Log the report summary.
    pub fn log(&self) {
        let bytes = |bytes: u64| {
            if self.human_readable {
                format_bytes(bytes)
            } else {
                format!("{} bytes", bytes)
            }
        };

        match &self.outcome {
            Ok(CycleOutcome::Sufficient { .. }) => {
                debug!("[{}] no cleanup needed", self.location);
            }
            Ok(CycleOutcome::Reclaimed { result, pruned, .. }) => {
                let prefix = if result.dry_run { "[DRY RUN] " } else { "" };
                if !result.errors.is_empty() {
                    warn!(
                        "[{}] {} files failed to delete",
                        self.location,
                        result.errors.len()
                    );
                }
                match result.ensure_budget_met() {
                    Ok(_) => info!(
                        "[{}] {}cleanup completed successfully: freed {} in {} files, removed {} empty directories",
                        self.location,
                        prefix,
                        bytes(result.bytes_freed),
                        result.files_deleted,
                        pruned.removed.len()
                    ),
                    Err(err) => warn!(
                        "[{}] {}error during cleanup: {}",
                        self.location, prefix, err
                    ),
                }
            }
            Err(err) => error!("[{}] cycle failed: {}", self.location, err),
        }
    }
}

/// Periodically checks one location and reclaims space when needed.
pub struct Monitor {
    location: Location,
    disk: Arc<dyn DiskStats>,
}

impl Monitor {
    pub fn new(location: Location, disk: Arc<dyn DiskStats>) -> Self {
        Self { location, disk }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Run a single cycle: measure, evaluate and reclaim if needed.
    ///
    /// Scan, deletion and pruning are performed sequentially.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let location = &self.location;
        let name = location.name();

        let usage = self.disk_usage().await?;
        let decision = threshold::evaluate(&usage, &location.policy);
        info!(
            "[{}] disk usage: total={}, free={} ({:.2}%), used={}",
            name,
            location.bytes(usage.total_bytes),
            location.bytes(usage.free_bytes),
            decision.free_percent,
            location.bytes(usage.used_bytes),
        );

        if !decision.needs_reclamation {
            info!("[{}] free space is sufficient", name);
            return Ok(CycleOutcome::Sufficient { usage, decision });
        }

        info!(
            "[{}] free space is below minimum (target free {}), initiating cleanup of {}",
            name,
            location.bytes(decision.target_free_bytes),
            location.bytes(decision.budget),
        );

        let dry_run = location.policy.dry_run;
        if dry_run {
            info!("[{}] dry run: no files will be removed", name);
        }

        let catalog = FileCatalog::scan(&location.target_dirs).await?;
        let plan = ReclamationPlan::new(catalog, decision.budget);
        debug!(
            "[{}] planned {} files ({} bytes)",
            name,
            plan.files().len(),
            plan.planned_bytes()
        );

        let result = ReclamationExecutor::new(dry_run)
            .human_readable(location.human_readable)
            .execute(&plan)
            .await;
        let pruned = DirectoryPruner::new(dry_run)
            .prune(&location.target_dirs)
            .await;

        Ok(CycleOutcome::Reclaimed {
            usage,
            decision,
            result,
            pruned,
        })
    }

    /// Query disk statistics on the blocking thread pool.
    ///
    /// Statistics calls block, and may hang on unresponsive mounts.
    async fn disk_usage(&self) -> Result<UsageSnapshot, DiskUsageError> {
        let disk = self.disk.clone();
        let partition = self.location.partition.clone();
        task::spawn_blocking(move || disk.disk_usage(&partition))
            .await
            .unwrap_or_else(|err| {
                Err(DiskUsageError::Io {
                    path: self.location.partition.clone(),
                    source: io::Error::other(err),
                })
            })
    }

    /// Run cycles every [`Location::check_interval`] until `shutdown` turns `true`.
    ///
    /// The first cycle runs immediately. Cycles never overlap: if one overruns
    /// the interval, the next starts right after it. A running cycle is never
    /// interrupted by shutdown.
    pub async fn run_every(
        self,
        mut shutdown: watch::Receiver<bool>,
        reports: mpsc::UnboundedSender<CycleReport>,
    ) {
        let mut interval = time::interval(self.location.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }

            let report = CycleReport {
                location: self.location.name(),
                human_readable: self.location.human_readable,
                outcome: self.run_cycle().await,
            };
            if reports.send(report).is_err() {
                break;
            }
        }
        debug!("[{}] monitor stopped", self.location.name());
    }
}

/// Runs one [`Monitor`] task per location.
pub struct Daemon {
    tasks: JoinSet<()>,
    shutdown: watch::Sender<bool>,
    reports: mpsc::UnboundedReceiver<CycleReport>,
}

impl Daemon {
    /// Spawn monitors for all `locations`.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(locations: Vec<Location>, disk: Arc<dyn DiskStats>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (reports_tx, reports) = mpsc::unbounded_channel();

        let mut tasks = JoinSet::new();
        for location in locations {
            info!(
                "starting monitor for partition '{}' (directories: {:?})",
                location.partition.display(),
                location.target_dirs
            );
            let monitor = Monitor::new(location, disk.clone());
            tasks.spawn(monitor.run_every(shutdown_rx.clone(), reports_tx.clone()));
        }

        Self {
            tasks,
            shutdown,
            reports,
        }
    }

    /// Receive next cycle report from any location.
    ///
    /// Returns `None` when all monitors have stopped.
    pub async fn next_report(&mut self) -> Option<CycleReport> {
        self.reports.recv().await
    }

    /// Log reports until `signal` completes, then shut down.
    pub async fn run_until<F>(mut self, signal: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("shutdown requested");
                    break;
                }
                report = self.reports.recv() => match report {
                    Some(report) => report.log(),
                    None => break,
                },
            }
        }
        self.shutdown().await;
    }

    /// Stop scheduling new cycles and wait for in-flight cycles to finish.
    pub async fn shutdown(mut self) {
        // Error means all monitors have already stopped
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!("monitor task failed: {}", err);
            }
        }
        while let Ok(report) = self.reports.try_recv() {
            report.log();
        }
        info!("all monitors stopped");
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use crate::disk::DiskStats;
    use crate::errors::{ConfigError, DiskUsageError};
    use crate::threshold::UsageSnapshot;

    /// Disk reporting fixed usage, or failing if there is none.
    pub(crate) struct FakeDisk {
        pub usage: Option<UsageSnapshot>,
        pub same_filesystem: bool,

        /// Time every usage query blocks the calling thread.
        pub delay: Duration,
    }

    impl FakeDisk {
        pub fn new(total: u64, free: u64) -> Self {
            Self {
                usage: Some(UsageSnapshot::new(total, free)),
                same_filesystem: true,
                delay: Duration::ZERO,
            }
        }

        pub fn failing() -> Self {
            Self {
                usage: None,
                same_filesystem: true,
                delay: Duration::ZERO,
            }
        }
    }

    impl DiskStats for FakeDisk {
        fn disk_usage(&self, path: &Path) -> Result<UsageSnapshot, DiskUsageError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.usage.ok_or_else(|| DiskUsageError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("fake failure"),
            })
        }

        fn same_filesystem(&self, paths: &[PathBuf]) -> Result<(), ConfigError> {
            match (self.same_filesystem, paths) {
                (false, [first, other, ..]) => Err(ConfigError::DifferentFilesystems {
                    first: first.clone(),
                    other: other.clone(),
                }),
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::FakeDisk;
    use super::*;
    use crate::catalog::fixtures::{tree, TreeFixture, HOUR};
    use rstest::rstest;
    use tracing_test::traced_test;

    fn location(dirs: Vec<PathBuf>, percent: f64, dry_run: bool) -> Location {
        let policy = ReclamationPolicy::builder()
            .min_free_percent(percent)
            .dry_run(dry_run)
            .build()
            .unwrap();
        Location::new(None, dirs, policy, Duration::from_millis(20)).unwrap()
    }

    #[test]
    fn test_location_defaults_partition_to_first_dir() {
        let loc = location(vec![PathBuf::from("/a"), PathBuf::from("/b")], 10.0, false);
        assert_eq!(loc.partition, PathBuf::from("/a"));
        assert_eq!(loc.name(), "/a");
    }

    #[test]
    fn test_location_requires_target_dirs() {
        let err = Location::new(None, vec![], ReclamationPolicy::default(), HOUR).unwrap_err();
        assert!(matches!(err, ConfigError::NoTargetDirs));
    }

    #[test]
    fn test_location_requires_positive_interval() {
        let err = Location::new(
            None,
            vec![PathBuf::from("/a")],
            ReclamationPolicy::default(),
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy(_)));
    }

    #[test]
    fn test_location_validate() {
        let loc = location(vec![PathBuf::from("/a"), PathBuf::from("/b")], 10.0, false);
        let mut disk = FakeDisk::new(100, 50);
        assert!(loc.validate(&disk).is_ok());
        disk.same_filesystem = false;
        assert!(matches!(
            loc.validate(&disk),
            Err(ConfigError::DifferentFilesystems { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_cycle_sufficient(tree: TreeFixture) {
        let file = tree.file("file", 100, HOUR);
        let monitor = Monitor::new(
            location(vec![tree.root().to_path_buf()], 10.0, false),
            Arc::new(FakeDisk::new(1000, 500)),
        );

        let outcome = monitor.run_cycle().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Sufficient { .. }));
        assert!(file.exists());
        assert!(logs_contain("free space is sufficient"));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_cycle_multiple_directories(tree: TreeFixture) {
        let dir1 = tree.dir("dir1");
        let dir2 = tree.dir("dir2");
        let old = tree.file("dir1/old.txt", 100, 3 * HOUR);
        let mid = tree.file("dir2/sub/mid.txt", 100, 2 * HOUR);
        let new = tree.file("dir1/new.txt", 100, HOUR);

        // 10% of 10000 is 1000, free 850: budget is 150 bytes
        let monitor = Monitor::new(
            location(vec![dir1.clone(), dir2.clone()], 10.0, false),
            Arc::new(FakeDisk::new(10_000, 850)),
        );

        let outcome = monitor.run_cycle().await.unwrap();

        let CycleOutcome::Reclaimed {
            decision,
            result,
            pruned,
            ..
        } = outcome
        else {
            panic!("expected reclamation");
        };
        assert_eq!(decision.budget, 150);
        assert!(!old.exists());
        assert!(!mid.exists());
        assert!(new.exists());
        assert_eq!(result.bytes_freed, 200);
        assert!(result.budget_met());
        assert_eq!(pruned.removed, vec![tree.path("dir2/sub")]);
        assert!(dir1.exists());
        assert!(dir2.exists());
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_cycle_dry_run(tree: TreeFixture) {
        let file = tree.file("file1.txt", 7, HOUR);
        let monitor = Monitor::new(
            location(vec![tree.root().to_path_buf()], 10.0, true),
            Arc::new(FakeDisk::new(10_000, 0)),
        );

        let outcome = monitor.run_cycle().await.unwrap();

        let CycleOutcome::Reclaimed { result, .. } = outcome else {
            panic!("expected reclamation");
        };
        assert!(file.exists());
        assert!(result.dry_run);
        assert_eq!(result.bytes_still_needed, 993);
        assert!(logs_contain("[DRY RUN] would delete"));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_cycle_disk_usage_error(tree: TreeFixture) {
        let monitor = Monitor::new(
            location(vec![tree.root().to_path_buf()], 10.0, false),
            Arc::new(FakeDisk::failing()),
        );

        let err = monitor.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::DiskUsage(_)));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_cycle_slow_disk_does_not_block_runtime(tree: TreeFixture) {
        let mut disk = FakeDisk::new(1000, 500);
        disk.delay = Duration::from_millis(500);
        let monitor = Monitor::new(
            location(vec![tree.root().to_path_buf()], 10.0, false),
            Arc::new(disk),
        );
        let started = time::Instant::now();

        let (outcome, timer_fired) = tokio::join!(monitor.run_cycle(), async {
            time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });

        assert!(matches!(outcome, Ok(CycleOutcome::Sufficient { .. })));
        assert!(timer_fired < Duration::from_millis(400));
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_cycle_scan_error(tree: TreeFixture) {
        let monitor = Monitor::new(
            location(vec![tree.path("missing")], 10.0, false),
            Arc::new(FakeDisk::new(1000, 0)),
        );

        let err = monitor.run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::Scan(_)));
    }

    #[rstest]
    #[tokio::test]
    #[traced_test]
    async fn test_daemon_reports_and_shuts_down(tree: TreeFixture) {
        let ok_dir = tree.dir("ok");
        let locations = vec![
            location(vec![ok_dir], 10.0, false),
            location(vec![tree.path("missing")], 10.0, false),
        ];
        let mut daemon = Daemon::start(locations, Arc::new(FakeDisk::new(1000, 0)));

        let mut failed = 0;
        let mut reclaimed = 0;
        // Each location ticks every 20ms, collect a few cycles of both
        while failed < 2 || reclaimed < 2 {
            let report = daemon.next_report().await.expect("monitors are running");
            match report.outcome {
                Ok(CycleOutcome::Reclaimed { .. }) => reclaimed += 1,
                Err(CycleError::Scan(_)) => failed += 1,
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        tokio::time::timeout(Duration::from_secs(5), daemon.shutdown())
            .await
            .expect("daemon shuts down");
        assert!(logs_contain("all monitors stopped"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_daemon_run_until_signal() {
        let tmp = tempfile::tempdir().unwrap();
        let daemon = Daemon::start(
            vec![location(vec![tmp.path().to_path_buf()], 10.0, false)],
            Arc::new(FakeDisk::new(1000, 900)),
        );

        tokio::time::timeout(
            Duration::from_secs(5),
            daemon.run_until(tokio::time::sleep(Duration::from_millis(100))),
        )
        .await
        .expect("daemon stops after signal");
        assert!(logs_contain("shutdown requested"));
        assert!(logs_contain("free space is sufficient"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_daemon_without_locations() {
        let mut daemon = Daemon::start(vec![], Arc::new(FakeDisk::new(1, 1)));
        assert!(daemon.next_report().await.is_none());
        daemon.shutdown().await;
    }
}
