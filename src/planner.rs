//! Eviction planning.
//!
//! Files are selected greedily oldest-first until the running sum reaches the budget.
//! This deliberately prefers older files over a smaller set of deletions.

use crate::catalog::{FileCatalog, FileRecord};

/// Ordered files to delete in one cycle, oldest first.
///
/// Computed fresh every cycle from a new scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReclamationPlan {
    budget: u64,
    files: Vec<FileRecord>,
}

impl ReclamationPlan {
    /// Build the plan for `budget` bytes out of `catalog`.
    ///
    /// Returns the minimal oldest-first prefix whose total size reaches `budget`
    /// (the file crossing the budget is included), or the whole catalog if it's too small.
    /// Files with identical modification time keep their discovery order.
    pub fn new(catalog: FileCatalog, budget: u64) -> Self {
        if budget == 0 {
            return Self {
                budget,
                files: vec![],
            };
        }

        let mut files = catalog.into_files();
        files.sort_by_key(|file| file.modified_at);

        let mut selected = 0u64;
        let take = files
            .iter()
            .position(|file| {
                selected = selected.saturating_add(file.size_bytes);
                selected >= budget
            })
            .map_or(files.len(), |idx| idx + 1);
        files.truncate(take);

        Self { budget, files }
    }

    /// Number of bytes this plan was built for.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of sizes of all planned files.
    pub fn planned_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.size_bytes).sum()
    }
}
