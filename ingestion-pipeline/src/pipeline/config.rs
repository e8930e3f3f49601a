use std::path::PathBuf;

use common::{backends::ResolvedConfig, utils::config::AppConfig};

#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Files in flight across all jobs.
    pub max_concurrent_files: usize,
    pub staging_root: PathBuf,
}

impl IndexingConfig {
    pub fn from_config(config: &AppConfig, resolved: &ResolvedConfig) -> Self {
        Self {
            max_concurrent_files: resolved.max_concurrent_files,
            staging_root: config.staging_dir(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 1,
            staging_root: std::env::temp_dir().join("rag_storage").join("staging"),
        }
    }
}
