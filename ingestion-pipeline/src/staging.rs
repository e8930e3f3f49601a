//! Per-job scratch directories for uploaded files.

use std::path::{Path, PathBuf};

use common::{error::AppError, utils::ingest_limits::is_plain_file_name};
use tempfile::TempDir;
use tracing::{debug, warn};

fn staging_error(context: &str, err: &std::io::Error) -> AppError {
    AppError::Staging(format!("{context}: {err}"))
}

/// Hands out isolated workspaces below one staging root.
#[derive(Debug, Clone)]
pub struct StagingManager {
    root: PathBuf,
}

impl StagingManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh directory named after the job plus a random suffix.
    pub async fn acquire(&self, job_id: &str) -> Result<Workspace, AppError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| staging_error("Failed to create staging root", &e))?;

        let root = self.root.clone();
        let prefix = format!("job-{job_id}-");
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await?
        .map_err(|e| staging_error("Failed to create workspace", &e))?;

        debug!(job_id, path = %dir.path().display(), "Workspace acquired");
        Ok(Workspace {
            job_id: job_id.to_string(),
            dir,
        })
    }

    /// Removes the workspace and everything in it.
    pub async fn release(&self, workspace: Workspace) -> Result<(), AppError> {
        let Workspace { job_id, dir } = workspace;
        let path = dir.path().to_path_buf();

        tokio::task::spawn_blocking(move || dir.close())
            .await?
            .map_err(|e| {
                warn!(job_id = %job_id, path = %path.display(), error = %e, "Failed to remove workspace");
                staging_error("Failed to remove workspace", &e)
            })?;

        debug!(job_id = %job_id, path = %path.display(), "Workspace released");
        Ok(())
    }
}

/// A job's exclusive scratch directory.
///
/// Released explicitly through [`StagingManager::release`]; a workspace that is
/// dropped instead (early return, panic, aborted task) is removed on drop.
#[derive(Debug)]
pub struct Workspace {
    job_id: String,
    dir: TempDir,
}

impl Workspace {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes one file directly inside the workspace, replacing any earlier file of
    /// the same name.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        if !is_plain_file_name(name) {
            return Err(AppError::Validation(format!(
                "File name '{name}' must not contain path components"
            )));
        }

        let path = self.dir.path().join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| staging_error(&format!("Failed to stage '{name}'"), &e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_creates_distinct_directories_per_job() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(root.path().join("staging"));

        let first = staging.acquire("job-a").await.unwrap();
        let second = staging.acquire("job-a").await.unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(staging.root()));
        assert!(first
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .starts_with("job-job-a-"));
    }

    #[tokio::test]
    async fn release_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(root.path());
        let workspace = staging.acquire("job-1").await.unwrap();
        let path = workspace.path().to_path_buf();
        workspace.put("a.txt", b"alpha").await.unwrap();

        staging.release(workspace).await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropped_workspace_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(root.path());
        let workspace = staging.acquire("job-2").await.unwrap();
        let path = workspace.path().to_path_buf();

        drop(workspace);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn put_overwrites_and_rejects_path_components() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingManager::new(root.path());
        let workspace = staging.acquire("job-3").await.unwrap();

        workspace.put("a.txt", b"first").await.unwrap();
        let path = workspace.put("a.txt", b"second").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");

        for name in ["../escape.txt", "nested/a.txt", "..", ""] {
            assert!(
                matches!(workspace.put(name, b"x").await, Err(AppError::Validation(_))),
                "{name} should be rejected"
            );
        }

        staging.release(workspace).await.unwrap();
    }
}
