//! # Partition Vacuum
//!
//! Keeps free space on monitored filesystems above a threshold by deleting
//! the oldest files under configured target directories.
//!
//! Every cycle of a [`Location`] measures free space, evaluates its
//! [`ReclamationPolicy`] and, if needed, runs the reclamation pipeline:
//! [`FileCatalog`] → [`ReclamationPlan`] → [`ReclamationExecutor`] → [`DirectoryPruner`].
//! Nothing is cached between cycles.
//!
//! ## Example
//!
//! ```rust
//! # async fn test(target_dir: &str) {
//! use partition_vacuum::threshold::{self, UsageSnapshot};
//! use partition_vacuum::{FileCatalog, ReclamationExecutor, ReclamationPlan, ReclamationPolicy};
//!
//! let policy = ReclamationPolicy::builder()
//!     .min_free_percent(10.0)
//!     .dry_run(true)
//!     .build()
//!     .unwrap();
//!
//! // 5% free: 50 bytes must be freed to reach 10%
//! let decision = threshold::evaluate(&UsageSnapshot::new(1000, 50), &policy);
//!
//! let catalog = FileCatalog::scan(&[target_dir]).await.unwrap();
//! let plan = ReclamationPlan::new(catalog, decision.budget);
//! let result = ReclamationExecutor::new(policy.dry_run).execute(&plan).await;
//! println!("would free {} bytes", result.bytes_freed);
//! # }
//! ```

mod catalog;
mod executor;
mod monitor;
mod planner;
mod pruner;

pub mod config;
pub mod disk;
pub mod errors;
pub mod threshold;
pub mod units;

pub use catalog::{FileCatalog, FileRecord};
pub use config::Config;
pub use executor::{ReclamationExecutor, ReclamationResult};
pub use monitor::{CycleOutcome, CycleReport, Daemon, Location, Monitor};
pub use planner::ReclamationPlan;
pub use pruner::{DirectoryPruner, PruneReport};
pub use threshold::{ReclamationPolicy, ThresholdDecision, UsageSnapshot};

// Re-exports of public API arguments from extern crates
#[doc(no_inline)]
pub use chrono::{DateTime, Utc};
