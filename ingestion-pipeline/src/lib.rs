#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod staging;

pub use pipeline::{
    ExtensionFilter, FolderIndexingResult, IndexingConfig, IndexingOrchestrator, IndexingStatus,
    JobHandle, JobKind, JobState, JobStatus, UploadedFile,
};
pub use staging::{StagingManager, Workspace};
