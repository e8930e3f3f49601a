use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use common::error::AppError;
use futures::future::join_all;
use retrieval_pipeline::RetrievalEngine;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::result::{
    overall_status, FileProcessingDetail, FolderIndexingResult, FolderIndexingStats,
    IndexingStatus,
};

/// Case-insensitive file-name suffix filter. An empty filter accepts every file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .collect();
        Self { suffixes }
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    pub fn matches(&self, path: &Path) -> bool {
        if self.suffixes.is_empty() {
            return true;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        self.suffixes.iter().any(|suffix| name.ends_with(suffix))
    }
}

#[derive(Debug, Default)]
pub struct FolderScan {
    pub files: Vec<PathBuf>,
    pub skipped: usize,
}

/// Lists regular files below `root`, sorted by path.
pub async fn scan_folder(
    root: &Path,
    recursive: bool,
    filter: &ExtensionFilter,
) -> Result<FolderScan, AppError> {
    let mut scan = FolderScan::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                if filter.matches(&path) {
                    scan.files.push(path);
                } else {
                    scan.skipped = scan.skipped.saturating_add(1);
                }
            }
        }
    }

    scan.files.sort();
    Ok(scan)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn ingest_file(
    engine: &dyn RetrievalEngine,
    limiter: &Semaphore,
    root: &Path,
    path: PathBuf,
) -> FileProcessingDetail {
    let file_path = path
        .strip_prefix(root)
        .unwrap_or(path.as_path())
        .to_string_lossy()
        .into_owned();
    let file_name = display_name(&path);

    let outcome = match limiter.acquire().await {
        Ok(_permit) => engine.ingest_document(&path).await,
        Err(_) => Err(AppError::InternalError(
            "Ingestion limiter closed".to_string(),
        )),
    };

    match outcome {
        Ok(()) => FileProcessingDetail {
            file_path,
            file_name,
            status: IndexingStatus::Success,
            error: None,
        },
        Err(err) => {
            warn!(file = %file_path, error = %err, "File ingestion failed");
            FileProcessingDetail {
                file_path,
                file_name,
                status: IndexingStatus::Failed,
                error: Some(err.to_string()),
            }
        }
    }
}

/// Ingests every matching file below `root`, one engine call per file.
///
/// Files are submitted together but each holds a `limiter` permit while the engine
/// works on it. A failing file is recorded and does not stop the others.
pub async fn ingest_folder(
    engine: &Arc<dyn RetrievalEngine>,
    limiter: &Semaphore,
    root: &Path,
    recursive: bool,
    filter: &ExtensionFilter,
) -> Result<FolderIndexingResult, AppError> {
    let started = Instant::now();
    let scan = scan_folder(root, recursive, filter).await?;

    let file_results = join_all(
        scan.files
            .into_iter()
            .map(|path| ingest_file(engine.as_ref(), limiter, root, path)),
    )
    .await;

    let files_failed = file_results
        .iter()
        .filter(|detail| detail.status == IndexingStatus::Failed)
        .count();
    let stats = FolderIndexingStats {
        total_files: file_results.len(),
        files_processed: file_results.len().saturating_sub(files_failed),
        files_failed,
        files_skipped: scan.skipped,
    };
    let status = overall_status(&stats);
    let message = match status {
        IndexingStatus::Success if stats.total_files == 0 => {
            "No matching files found".to_string()
        }
        IndexingStatus::Success => format!("Indexed {} files", stats.files_processed),
        IndexingStatus::Partial => format!(
            "Indexed {} of {} files",
            stats.files_processed, stats.total_files
        ),
        IndexingStatus::Failed => format!("All {} files failed", stats.total_files),
    };

    info!(
        folder = %root.display(),
        processed = stats.files_processed,
        failed = stats.files_failed,
        skipped = stats.files_skipped,
        "Folder ingestion finished"
    );

    Ok(FolderIndexingResult {
        status,
        message,
        folder_path: root.display().to_string(),
        recursive,
        stats,
        processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        file_results,
    })
}
