use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStatus {
    Success,
    Failed,
    Partial,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderIndexingStats {
    pub total_files: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    /// Files present in the folder but excluded by the extension filter.
    pub files_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProcessingDetail {
    /// Path relative to the ingested folder.
    pub file_path: String,
    pub file_name: String,
    pub status: IndexingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderIndexingResult {
    pub status: IndexingStatus,
    pub message: String,
    pub folder_path: String,
    pub recursive: bool,
    pub stats: FolderIndexingStats,
    pub processing_time_ms: u64,
    pub file_results: Vec<FileProcessingDetail>,
}

impl FolderIndexingResult {
    pub fn failed_files(&self) -> impl Iterator<Item = &FileProcessingDetail> {
        self.file_results
            .iter()
            .filter(|detail| detail.status == IndexingStatus::Failed)
    }
}

/// Overall status from per-file outcomes. An empty folder counts as success.
pub fn overall_status(stats: &FolderIndexingStats) -> IndexingStatus {
    if stats.files_failed == 0 {
        IndexingStatus::Success
    } else if stats.files_processed == 0 {
        IndexingStatus::Failed
    } else {
        IndexingStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(processed: usize, failed: usize) -> FolderIndexingStats {
        FolderIndexingStats {
            total_files: processed + failed,
            files_processed: processed,
            files_failed: failed,
            files_skipped: 0,
        }
    }

    #[test]
    fn status_follows_file_outcomes() {
        assert_eq!(overall_status(&stats(0, 0)), IndexingStatus::Success);
        assert_eq!(overall_status(&stats(3, 0)), IndexingStatus::Success);
        assert_eq!(overall_status(&stats(2, 1)), IndexingStatus::Partial);
        assert_eq!(overall_status(&stats(0, 2)), IndexingStatus::Failed);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&IndexingStatus::Partial).unwrap(),
            "\"partial\""
        );
    }
}
