use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

/// Directories removed by [`DirectoryPruner`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Removed (or, in dry run, would-be removed) directories, deepest first.
    pub removed: Vec<PathBuf>,

    /// Whether this report was simulated.
    pub dry_run: bool,
}

/// Removes empty directories under target directories.
///
/// Runs a single deepest-first pass, so a parent emptied by removal of its
/// children is removed in the same pass. Roots themselves are never removed.
///
/// In dry run only directories which are empty at evaluation time are reported.
/// Directories which would become empty after the simulated deletions are not.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryPruner {
    dry_run: bool,
}

impl DirectoryPruner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Prune empty directories under every root.
    pub async fn prune<P>(&self, roots: &[P]) -> PruneReport
    where
        P: AsRef<Path>,
    {
        let roots: Vec<&Path> = roots.iter().map(AsRef::as_ref).collect();
        let mut dirs = vec![];
        for root in &roots {
            collect_dirs(root, &mut dirs).await;
        }
        // Deepest first: children are always visited before their parents
        dirs.sort_by(|left, right| {
            right
                .components()
                .count()
                .cmp(&left.components().count())
                .then_with(|| left.cmp(right))
        });
        dirs.dedup();
        dirs.retain(|dir| !roots.contains(&dir.as_path()));

        let mut report = PruneReport {
            dry_run: self.dry_run,
            ..Default::default()
        };
        for dir in dirs {
            if self.dry_run {
                if is_dir_empty(&dir).await {
                    info!("[DRY RUN] would remove empty directory '{}'", dir.display());
                    report.removed.push(dir);
                }
                continue;
            }

            // Removal fails if the directory is not empty, which is exactly what we want
            match fs::remove_dir(&dir).await {
                Ok(_) => {
                    info!("removed empty directory '{}'", dir.display());
                    report.removed.push(dir);
                }
                Err(err) => debug!("kept directory '{}': {}", dir.display(), err),
            }
        }
        report
    }
}

/// Collect all directories below `root`, excluding `root` itself and symlinked directories.
async fn collect_dirs(root: &Path, dirs: &mut Vec<PathBuf>) {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                debug!("failed to read directory '{}': {}", dir.display(), err);
                continue;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {
                    let path = entry.path();
                    dirs.push(path.clone());
                    pending.push(path);
                }
                _ => {}
            }
        }
    }
}

/// Unreadable directories are considered empty.
async fn is_dir_empty(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => !matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => true,
    }
}
