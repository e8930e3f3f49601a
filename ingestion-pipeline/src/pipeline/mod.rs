mod config;
mod folder;
mod job;
mod result;
mod state;


pub use config::IndexingConfig;
pub use folder::{ingest_folder, scan_folder, ExtensionFilter, FolderScan};
pub use job::{FileError, JobHandle, JobKind, JobStatus, UploadedFile};
pub use result::{
    FileProcessingDetail, FolderIndexingResult, FolderIndexingStats, IndexingStatus,
};
pub use state::JobState;

use std::{collections::HashSet, panic::AssertUnwindSafe, path::PathBuf, sync::Arc};

use chrono::Utc;
use common::{error::AppError, utils::ingest_limits::is_plain_file_name};
use futures::FutureExt;
use retrieval_pipeline::RetrievalEngine;
use tokio::sync::{watch, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::staging::{StagingManager, Workspace};

use self::{
    job::{IngestionJob, JobSources},
    state::{compute_next_state, JobTransition},
};

/// Accepts indexing requests and runs them as tracked background jobs.
#[derive(Clone)]
pub struct IndexingOrchestrator {
    engine: Arc<dyn RetrievalEngine>,
    staging: StagingManager,
    limiter: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl IndexingOrchestrator {
    pub fn new(engine: Arc<dyn RetrievalEngine>, config: IndexingConfig) -> Self {
        Self {
            engine,
            staging: StagingManager::new(config.staging_root),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_files.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    pub fn staging(&self) -> &StagingManager {
        &self.staging
    }

    /// Number of jobs that have been accepted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn index_single(&self, file: UploadedFile) -> Result<JobHandle, AppError> {
        ensure_plain_name(&file.name)?;
        Ok(self.submit(IngestionJob::new(
            JobKind::SingleFile,
            JobSources::Uploads(vec![file]),
        )))
    }

    /// Validates the folder synchronously, then ingests it in the background.
    pub async fn index_folder(
        &self,
        folder_path: &str,
        recursive: bool,
        extensions: &[String],
    ) -> Result<JobHandle, AppError> {
        let path = validate_folder(folder_path).await?;
        Ok(self.submit(IngestionJob::new(
            JobKind::Folder,
            JobSources::Folder {
                path,
                recursive,
                filter: ExtensionFilter::new(extensions),
            },
        )))
    }

    pub fn index_batch(&self, files: Vec<UploadedFile>) -> Result<JobHandle, AppError> {
        if files.is_empty() {
            return Err(AppError::Validation(
                "No files provided for batch indexing".to_string(),
            ));
        }
        for file in &files {
            ensure_plain_name(&file.name)?;
        }
        Ok(self.submit(IngestionJob::new(
            JobKind::Batch,
            JobSources::Uploads(files),
        )))
    }

    fn submit(&self, job: IngestionJob) -> JobHandle {
        let (status_tx, status_rx) = watch::channel(JobStatus::pending(&job));
        let handle = JobHandle::new(job.id.clone(), status_rx);
        let runner = JobRunner {
            engine: Arc::clone(&self.engine),
            staging: self.staging.clone(),
            limiter: Arc::clone(&self.limiter),
        };

        info!(job_id = %job.id, kind = job.kind.as_str(), "ingestion job accepted");
        self.tracker.spawn(runner.run(job, status_tx));
        handle
    }

    /// Stops accepting jobs and waits for the running ones to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(in_flight = self.tracker.len(), "waiting for ingestion jobs");
        self.tracker.wait().await;
    }
}

fn ensure_plain_name(name: &str) -> Result<(), AppError> {
    if is_plain_file_name(name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid file name '{name}'")))
    }
}

async fn validate_folder(folder_path: &str) -> Result<PathBuf, AppError> {
    let trimmed = folder_path.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "folder_path must not be empty".to_string(),
        ));
    }

    let path = PathBuf::from(trimmed);
    if !path.is_absolute() {
        return Err(AppError::Validation(format!(
            "folder_path '{trimmed}' must be an absolute path"
        )));
    }

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => Ok(path),
        Ok(_) => Err(AppError::Validation(format!(
            "'{trimmed}' is not a directory"
        ))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound(
            format!("Folder '{trimmed}' does not exist"),
        )),
        Err(err) => Err(err.into()),
    }
}

fn apply_transition(
    status: &watch::Sender<JobStatus>,
    event: JobTransition,
    update: impl FnOnce(&mut JobStatus),
) {
    status.send_modify(|current| match compute_next_state(current.state, event) {
        Ok(next) => {
            current.state = next;
            update(current);
        }
        Err(err) => error!(job_id = %current.job_id, error = %err, "rejected job transition"),
    });
}

fn file_errors(result: &FolderIndexingResult) -> Vec<FileError> {
    result
        .failed_files()
        .map(|detail| FileError {
            file_name: detail.file_name.clone(),
            error: detail.error.clone().unwrap_or_default(),
        })
        .collect()
}

struct JobRunner {
    engine: Arc<dyn RetrievalEngine>,
    staging: StagingManager,
    limiter: Arc<Semaphore>,
}

impl JobRunner {
    #[tracing::instrument(skip_all, fields(job_id = %job.id, kind = job.kind.as_str()))]
    async fn run(self, job: IngestionJob, status: watch::Sender<JobStatus>) {
        let IngestionJob { id, sources, .. } = job;

        apply_transition(&status, JobTransition::Start, |current| {
            current.started_at = Some(Utc::now());
        });

        let outcome = AssertUnwindSafe(self.execute(&id, sources))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(AppError::InternalError(
                    "ingestion job panicked".to_string(),
                ))
            });

        Self::finish(&status, outcome);
    }

    async fn execute(
        &self,
        job_id: &str,
        sources: JobSources,
    ) -> Result<FolderIndexingResult, AppError> {
        match sources {
            JobSources::Folder {
                path,
                recursive,
                filter,
            } => ingest_folder(&self.engine, &self.limiter, &path, recursive, &filter).await,
            JobSources::Uploads(files) => {
                let workspace = self.staging.acquire(job_id).await?;
                let outcome = self.ingest_uploads(&workspace, files).await;
                if let Err(err) = self.staging.release(workspace).await {
                    warn!(error = %err, "workspace cleanup failed");
                }
                outcome
            }
        }
    }

    async fn ingest_uploads(
        &self,
        workspace: &Workspace,
        files: Vec<UploadedFile>,
    ) -> Result<FolderIndexingResult, AppError> {
        let mut seen = HashSet::new();
        for file in files {
            if !seen.insert(file.name.clone()) {
                warn!(file = %file.name, "duplicate file name in upload, last write wins");
            }
            workspace.put(&file.name, &file.bytes).await?;
        }

        ingest_folder(
            &self.engine,
            &self.limiter,
            workspace.path(),
            false,
            &ExtensionFilter::default(),
        )
        .await
    }

    fn finish(status: &watch::Sender<JobStatus>, outcome: Result<FolderIndexingResult, AppError>) {
        let finished_at = Some(Utc::now());

        match outcome {
            Ok(result) if result.status == IndexingStatus::Failed => {
                warn!(failed = result.stats.files_failed, "ingestion job failed");
                apply_transition(status, JobTransition::Fail, |current| {
                    current.finished_at = finished_at;
                    current.error = Some(result.message.clone());
                    current.file_errors = file_errors(&result);
                    current.result = Some(result);
                });
            }
            Ok(result) => {
                info!(
                    processed = result.stats.files_processed,
                    failed = result.stats.files_failed,
                    "ingestion job succeeded"
                );
                apply_transition(status, JobTransition::Succeed, |current| {
                    current.finished_at = finished_at;
                    current.file_errors = file_errors(&result);
                    current.result = Some(result);
                });
            }
            Err(err) => {
                error!(error = %err, "ingestion job failed");
                apply_transition(status, JobTransition::Fail, |current| {
                    current.finished_at = finished_at;
                    current.error = Some(err.to_string());
                });
            }
        }
    }
}
