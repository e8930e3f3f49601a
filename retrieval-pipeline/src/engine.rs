use std::path::Path;

use async_trait::async_trait;
use common::error::AppError;

use crate::{query::EngineQuery, result::QueryResult};

/// Readiness report of the retrieval engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHealth {
    pub status: String,
    /// Storage roles where the engine runs a different implementation than configured.
    pub wiring_mismatches: Vec<String>,
}

impl EngineHealth {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            wiring_mismatches: Vec::new(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Contract every retrieval engine adapter fulfils.
///
/// Folder ingestion is not part of the contract. The indexing orchestrator walks folders
/// and calls [`RetrievalEngine::ingest_document`] once per file.
#[async_trait]
pub trait RetrievalEngine: Send + Sync {
    async fn initialize(&self) -> Result<(), AppError>;

    async fn ingest_document(&self, path: &Path) -> Result<(), AppError>;

    async fn query(&self, query: EngineQuery) -> Result<QueryResult, AppError>;

    async fn health(&self) -> Result<EngineHealth, AppError>;
}
