//! Snapshot manager trait definition.
//!
//! Each step attempt works on a fresh copy of the current baseline. Approval
//! promotes the copy to be the next baseline, rejection removes it, and a
//! retry leaves it in place for inspection while the next attempt starts
//! again from the unchanged baseline.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("baseline {} does not exist or is not a directory", .0.display())]
    BaselineMissing(PathBuf),

    #[error("working directory {} overlaps baseline {}", working.display(), baseline.display())]
    OverlapsBaseline { working: PathBuf, baseline: PathBuf },

    #[error("working directory {} no longer exists", .0.display())]
    WorkingMissing(PathBuf),

    #[error("snapshot I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-step working copies of the source tree.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait SnapshotManager: Send + Sync {
    /// Create a fresh working copy of `baseline` for `step_id`, replacing any
    /// stale copy from an earlier attempt. Returns the working path.
    fn prepare(
        &self,
        step_id: &str,
        baseline: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, SnapshotError>> + Send;

    /// The working copy becomes the new baseline. Returns its path.
    fn promote(
        &self,
        working: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, SnapshotError>> + Send;

    /// Abandon and remove the working copy.
    fn discard(
        &self,
        working: &Path,
    ) -> impl std::future::Future<Output = Result<(), SnapshotError>> + Send;

    /// Leave the working copy for inspection.
    fn retain(
        &self,
        working: &Path,
    ) -> impl std::future::Future<Output = Result<(), SnapshotError>> + Send;
}
