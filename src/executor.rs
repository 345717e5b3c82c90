use std::path::PathBuf;

use tokio::fs;
use tracing::{error, info};

use crate::errors::{DeletionError, InsufficientReclamation};
use crate::planner::ReclamationPlan;
use crate::units::format_bytes;

/// Outcome of executing a [`ReclamationPlan`].
#[derive(Debug, Default)]
pub struct ReclamationResult {
    /// Sum of sizes of deleted (or, in dry run, would-be deleted) files.
    pub bytes_freed: u64,

    /// Bytes still needed to reach the budget.
    pub bytes_still_needed: u64,

    /// Number of deleted files.
    pub files_deleted: usize,

    /// Paths of deleted files in deletion order.
    pub deleted: Vec<PathBuf>,

    /// Files which failed to delete.
    pub errors: Vec<DeletionError>,

    /// Whether this result was simulated.
    pub dry_run: bool,
}

impl ReclamationResult {
    /// Whether the whole budget was freed.
    pub fn budget_met(&self) -> bool {
        self.bytes_still_needed == 0
    }

    /// Fails with the shortfall if the budget was not met.
    pub fn ensure_budget_met(&self) -> Result<(), InsufficientReclamation> {
        if self.budget_met() {
            Ok(())
        } else {
            Err(InsufficientReclamation {
                shortfall: self.bytes_still_needed,
            })
        }
    }
}

/// Deletes planned files sequentially.
///
/// A failed deletion is recorded and the executor proceeds to the next file.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReclamationExecutor {
    dry_run: bool,
    human_readable: bool,
}

impl ReclamationExecutor {
    /// Create new executor. In `dry_run` mode the filesystem is never modified.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            human_readable: false,
        }
    }

    /// Print sizes in log messages in human-readable form.
    pub fn human_readable(mut self, human_readable: bool) -> Self {
        self.human_readable = human_readable;
        self
    }

    /// Execute `plan` until its budget is freed or the plan is exhausted.
    pub async fn execute(&self, plan: &ReclamationPlan) -> ReclamationResult {
        let budget = plan.budget();
        let mut result = ReclamationResult {
            dry_run: self.dry_run,
            ..Default::default()
        };

        for file in plan.files() {
            if result.bytes_freed >= budget {
                break;
            }

            let size = self.size(file.size_bytes);
            if self.dry_run {
                info!("[DRY RUN] would delete '{}' ({})", file.path.display(), size);
            } else if let Err(source) = fs::remove_file(&file.path).await {
                error!("failed to delete '{}': {}", file.path.display(), source);
                result.errors.push(DeletionError {
                    path: file.path.clone(),
                    source,
                });
                continue;
            } else {
                info!("deleted '{}' ({})", file.path.display(), size);
            }

            result.bytes_freed = result.bytes_freed.saturating_add(file.size_bytes);
            result.files_deleted += 1;
            result.deleted.push(file.path.clone());
        }

        result.bytes_still_needed = budget.saturating_sub(result.bytes_freed);
        result
    }

    fn size(&self, bytes: u64) -> String {
        if self.human_readable {
            format_bytes(bytes)
        } else {
            format!("{} bytes", bytes)
        }
    }
}
