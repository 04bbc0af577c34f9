//! Local filesystem snapshot manager.
//!
//! Working copies live under `<workspace_root>/<step id>`. Copies are plain
//! recursive copies made on a blocking thread. Promotion moves nothing: the
//! working tree itself becomes the next baseline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use reforge_core::snapshot::{SnapshotError, SnapshotManager};

/// Snapshot manager backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalSnapshotManager {
    workspace_root: PathBuf,
    exclude: HashSet<String>,
}

impl LocalSnapshotManager {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            exclude: HashSet::new(),
        }
    }

    /// Entry names skipped at every depth while copying (e.g. `.git`, `target`).
    pub fn with_exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Working path for a step: `<workspace_root>/<sanitized step id>`.
    pub fn working_path(&self, step_id: &str) -> PathBuf {
        self.workspace_root.join(sanitize_step_id(step_id))
    }
}

/// Map a step id onto a single safe path component.
///
/// The mapping is injective: `_` is doubled, any other byte outside
/// `[A-Za-z0-9.-]` becomes `_xx` (lowercase hex), and a leading `.` is
/// escaped so the result is never `.`, `..` or hidden. An empty id maps to `_`.
fn sanitize_step_id(step_id: &str) -> String {
    if step_id.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(step_id.len());
    for (i, byte) in step_id.bytes().enumerate() {
        match byte {
            b'_' => out.push_str("__"),
            b'.' if i == 0 => out.push_str("_2e"),
            b'.' | b'-' => out.push(byte as char),
            b if b.is_ascii_alphanumeric() => out.push(b as char),
            b => out.push_str(&format!("_{b:02x}")),
        }
    }
    out
}

/// Canonical form of a path that may not exist yet: the longest existing
/// ancestor is canonicalized and the remaining components are appended.
fn resolve_lenient(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

impl SnapshotManager for LocalSnapshotManager {
    async fn prepare(&self, step_id: &str, baseline: &Path) -> Result<PathBuf, SnapshotError> {
        let baseline_meta = tokio::fs::metadata(baseline).await;
        if !matches!(&baseline_meta, Ok(meta) if meta.is_dir()) {
            return Err(SnapshotError::BaselineMissing(baseline.to_path_buf()));
        }

        let working = self.working_path(step_id);
        let baseline_root = baseline
            .canonicalize()
            .map_err(|e| SnapshotError::io(baseline, e))?;
        if overlaps(&resolve_lenient(&working), &baseline_root) {
            return Err(SnapshotError::OverlapsBaseline {
                working,
                baseline: baseline.to_path_buf(),
            });
        }

        if tokio::fs::symlink_metadata(&working).await.is_ok() {
            tracing::debug!(step_id = %step_id, "removing stale working copy {}", working.display());
            remove_path(&working).await?;
        }
        tokio::fs::create_dir_all(&self.workspace_root)
            .await
            .map_err(|e| SnapshotError::io(&self.workspace_root, e))?;

        let exclude = self.exclude.clone();
        let target = working.clone();
        let copied = tokio::task::spawn_blocking(move || {
            copy_tree(&baseline_root, &baseline_root, &target, &exclude)
        })
        .await
        .map_err(|e| SnapshotError::io(&working, std::io::Error::other(e)))??;

        tracing::info!(
            step_id = %step_id,
            files = copied,
            "prepared working copy {}",
            working.display()
        );
        Ok(working)
    }

    async fn promote(&self, working: &Path) -> Result<PathBuf, SnapshotError> {
        match tokio::fs::metadata(working).await {
            Ok(meta) if meta.is_dir() => {
                tracing::info!("promoted {} to baseline", working.display());
                Ok(working.to_path_buf())
            }
            _ => Err(SnapshotError::WorkingMissing(working.to_path_buf())),
        }
    }

    async fn discard(&self, working: &Path) -> Result<(), SnapshotError> {
        if tokio::fs::symlink_metadata(working).await.is_err() {
            tracing::debug!("working copy {} already gone", working.display());
            return Ok(());
        }
        remove_path(working).await?;
        tracing::info!("discarded working copy {}", working.display());
        Ok(())
    }

    async fn retain(&self, working: &Path) -> Result<(), SnapshotError> {
        tracing::info!("retained working copy {} for inspection", working.display());
        Ok(())
    }
}

async fn remove_path(path: &Path) -> Result<(), SnapshotError> {
    let meta = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|e| SnapshotError::io(path, e))?;
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    result.map_err(|e| SnapshotError::io(path, e))
}

/// Recursively copy `src` into `dst`. Returns the number of files copied.
fn copy_tree(
    root: &Path,
    src: &Path,
    dst: &Path,
    exclude: &HashSet<String>,
) -> Result<u64, SnapshotError> {
    std::fs::create_dir_all(dst).map_err(|e| SnapshotError::io(dst, e))?;
    let entries = std::fs::read_dir(src).map_err(|e| SnapshotError::io(src, e))?;

    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::io(src, e))?;
        let name = entry.file_name();
        if exclude.contains(name.to_string_lossy().as_ref()) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type().map_err(|e| SnapshotError::io(&from, e))?;

        if file_type.is_symlink() {
            copy_symlink(root, &from, &to)?;
        } else if file_type.is_dir() {
            copied += copy_tree(root, &from, &to, exclude)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| SnapshotError::io(&from, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(root: &Path, from: &Path, to: &Path) -> Result<(), SnapshotError> {
    let target = std::fs::read_link(from).map_err(|e| SnapshotError::io(from, e))?;
    let parent = from.parent().unwrap_or(root);
    let inside = parent
        .join(&target)
        .canonicalize()
        .map(|resolved| resolved.starts_with(root))
        .unwrap_or(false);

    if !inside {
        tracing::warn!(
            "skipping symlink {} -> {}: target leaves the baseline",
            from.display(),
            target.display()
        );
        return Ok(());
    }
    std::os::unix::fs::symlink(&target, to).map_err(|e| SnapshotError::io(to, e))
}

#[cfg(not(unix))]
fn copy_symlink(_root: &Path, from: &Path, _to: &Path) -> Result<(), SnapshotError> {
    tracing::warn!("skipping symlink {}: not supported on this platform", from.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn baseline_with_files(tmp: &TempDir) -> PathBuf {
        let base = tmp.path().join("baseline");
        std::fs::create_dir_all(base.join("src/nested")).unwrap();
        std::fs::create_dir_all(base.join(".git")).unwrap();
        std::fs::write(base.join("A.txt"), "alpha").unwrap();
        std::fs::write(base.join("src/nested/lib.rs"), "fn main() {}").unwrap();
        std::fs::write(base.join(".git/HEAD"), "ref").unwrap();
        base
    }

    #[tokio::test]
    async fn test_prepare_copies_baseline_recursively() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let working = snapshots.prepare("s1", &base).await.unwrap();

        assert_eq!(working, tmp.path().join("work/s1"));
        assert_eq!(std::fs::read_to_string(working.join("A.txt")).unwrap(), "alpha");
        assert!(working.join("src/nested/lib.rs").is_file());
        assert!(working.join(".git/HEAD").is_file());
    }

    #[tokio::test]
    async fn test_prepare_skips_excluded_names() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots =
            LocalSnapshotManager::new(tmp.path().join("work")).with_exclude([".git", "target"]);

        let working = snapshots.prepare("s1", &base).await.unwrap();

        assert!(!working.join(".git").exists());
        assert!(working.join("A.txt").exists());
    }

    #[tokio::test]
    async fn test_prepare_wipes_stale_working_copy() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let first = snapshots.prepare("s1", &base).await.unwrap();
        std::fs::write(first.join("stale.txt"), "left over").unwrap();
        std::fs::write(first.join("A.txt"), "edited").unwrap();

        let second = snapshots.prepare("s1", &base).await.unwrap();

        assert_eq!(first, second);
        assert!(!second.join("stale.txt").exists());
        assert_eq!(std::fs::read_to_string(second.join("A.txt")).unwrap(), "alpha");
    }

    #[tokio::test]
    async fn test_prepare_fails_when_baseline_missing() {
        let tmp = TempDir::new().unwrap();
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let err = snapshots
            .prepare("s1", &tmp.path().join("nope"))
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::BaselineMissing(_)));
        assert!(!tmp.path().join("work/s1").exists());
    }

    #[tokio::test]
    async fn test_prepare_refuses_working_path_inside_baseline() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(&base);

        let err = snapshots.prepare("src", &base).await.unwrap_err();

        assert!(matches!(err, SnapshotError::OverlapsBaseline { .. }));
        assert!(base.join("src/nested/lib.rs").exists());
    }

    #[tokio::test]
    async fn test_prepare_refuses_working_path_equal_to_baseline() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(tmp.path());

        let err = snapshots.prepare("baseline", &base).await.unwrap_err();

        assert!(matches!(err, SnapshotError::OverlapsBaseline { .. }));
        assert!(base.join("A.txt").exists());
    }

    #[tokio::test]
    async fn test_promote_returns_working_tree_as_new_baseline() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let working = snapshots.prepare("s1", &base).await.unwrap();
        let promoted = snapshots.promote(&working).await.unwrap();

        assert_eq!(promoted, working);
        assert!(promoted.join("A.txt").exists());
    }

    #[tokio::test]
    async fn test_promote_fails_when_working_copy_is_gone() {
        let tmp = TempDir::new().unwrap();
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let err = snapshots
            .promote(&tmp.path().join("work/s1"))
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::WorkingMissing(_)));
    }

    #[tokio::test]
    async fn test_discard_removes_and_retain_keeps() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let kept = snapshots.prepare("keep", &base).await.unwrap();
        snapshots.retain(&kept).await.unwrap();
        assert!(kept.join("A.txt").exists());

        let dropped = snapshots.prepare("drop", &base).await.unwrap();
        snapshots.discard(&dropped).await.unwrap();
        assert!(!dropped.exists());
        // Second discard is a no-op.
        snapshots.discard(&dropped).await.unwrap();

        assert!(base.join("A.txt").exists());
    }

    #[test]
    fn test_step_ids_map_to_one_component() {
        assert_eq!(sanitize_step_id("s1"), "s1");
        assert_eq!(sanitize_step_id("port/parser"), "port_2fparser");
        assert_eq!(sanitize_step_id("port_parser"), "port__parser");
        assert_eq!(sanitize_step_id("../etc"), "_2e._2fetc");
        assert_eq!(sanitize_step_id(".."), "_2e.");
        assert_eq!(sanitize_step_id("v1.2"), "v1.2");
        assert_eq!(sanitize_step_id(""), "_");
    }

    #[test]
    fn test_distinct_step_ids_never_share_a_component() {
        let ids = ["a/b", "a_b", "a_2fb", "a__b", "a b", "_", "", ".", "_2e", "é", "_c3_a9"];
        let mapped: HashSet<String> = ids.iter().map(|id| sanitize_step_id(id)).collect();
        assert_eq!(mapped.len(), ids.len());
    }

    #[tokio::test]
    async fn test_promoted_step_does_not_collide_with_similar_id() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let first = snapshots.prepare("a/b", &base).await.unwrap();
        std::fs::write(first.join("A.txt"), "from a/b").unwrap();
        let promoted = snapshots.promote(&first).await.unwrap();

        let second = snapshots.prepare("a_b", &promoted).await.unwrap();

        assert_ne!(second, promoted);
        assert_eq!(std::fs::read_to_string(second.join("A.txt")).unwrap(), "from a/b");
        assert!(promoted.join("A.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_inside_baseline_are_kept_and_escaping_ones_skipped() {
        let tmp = TempDir::new().unwrap();
        let base = baseline_with_files(&tmp);
        std::fs::write(tmp.path().join("outside.txt"), "secret").unwrap();
        std::os::unix::fs::symlink("A.txt", base.join("alias.txt")).unwrap();
        std::os::unix::fs::symlink("../outside.txt", base.join("escape.txt")).unwrap();
        let snapshots = LocalSnapshotManager::new(tmp.path().join("work"));

        let working = snapshots.prepare("s1", &base).await.unwrap();

        let alias = working.join("alias.txt");
        assert!(std::fs::symlink_metadata(&alias).unwrap().is_symlink());
        assert_eq!(std::fs::read_to_string(&alias).unwrap(), "alpha");
        assert!(std::fs::symlink_metadata(working.join("escape.txt")).is_err());
    }
}
