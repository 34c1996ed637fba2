//! Per-fetch scratch directory

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{FetchError, Result};

/// File name the downloaded archive is stored under
pub const ARCHIVE_FILE_NAME: &str = "chart.tgz";

const WORKSPACE_PREFIX: &str = "helmpeek-chart-";

/// Uniquely named directory owned by a single fetch
///
/// The directory and everything in it is removed when the workspace is
/// dropped, whether the fetch succeeded or not. Removal failures are logged
/// and never surface as errors.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a workspace under `root`, or the system temp dir when `None`
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let parent = root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&parent)
            .map_err(|source| FetchError::Workspace {
                root: parent.display().to_string(),
                source,
            })?;

        tracing::debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Where the retrieved archive is written
    pub fn archive_path(&self) -> PathBuf {
        self.path().join(ARCHIVE_FILE_NAME)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "removed workspace"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(Some(root.path())).unwrap();
        let path = workspace.path().to_path_buf();

        std::fs::create_dir_all(path.join("nested/deeper")).unwrap();
        std::fs::write(workspace.archive_path(), b"data").unwrap();
        assert!(path.exists());

        drop(workspace);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_workspaces_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(Some(root.path())).unwrap();
        let b = Workspace::create(Some(root.path())).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(
            a.path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(WORKSPACE_PREFIX)
        );
    }

    #[test]
    fn test_create_in_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let err = Workspace::create(Some(&root.path().join("missing"))).unwrap_err();
        assert!(matches!(err, FetchError::Workspace { .. }));
    }

    #[test]
    fn test_drop_tolerates_removed_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(Some(root.path())).unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();
        drop(workspace);
    }
}
