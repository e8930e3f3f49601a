use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use super::{folder::ExtensionFilter, result::FolderIndexingResult, state::JobState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SingleFile,
    Folder,
    Batch,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::SingleFile => "single_file",
            JobKind::Folder => "folder",
            JobKind::Batch => "batch",
        }
    }
}

/// A file received over the wire, staged before ingestion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum JobSources {
    /// A caller-owned directory, ingested in place.
    Folder {
        path: PathBuf,
        recursive: bool,
        filter: ExtensionFilter,
    },
    /// Uploaded payloads, written to a workspace in submission order.
    Uploads(Vec<UploadedFile>),
}

#[derive(Debug)]
pub(crate) struct IngestionJob {
    pub id: String,
    pub kind: JobKind,
    pub sources: JobSources,
}

impl IngestionJob {
    pub fn new(kind: JobKind, sources: JobSources) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file_name: String,
    pub error: String,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<FolderIndexingResult>,
    pub error: Option<String>,
    pub file_errors: Vec<FileError>,
}

impl JobStatus {
    pub(crate) fn pending(job: &IngestionJob) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            state: JobState::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            file_errors: Vec::new(),
        }
    }
}

/// Returned on submission; observes the job until it terminates.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: String,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub(crate) fn new(job_id: String, status: watch::Receiver<JobStatus>) -> Self {
        Self { job_id, status }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Waits for a terminal state and returns the final snapshot.
    pub async fn wait(mut self) -> JobStatus {
        if let Ok(status) = self
            .status
            .wait_for(|status| status.state.is_terminal())
            .await
        {
            return status.clone();
        }
        self.status.borrow().clone()
    }
}
