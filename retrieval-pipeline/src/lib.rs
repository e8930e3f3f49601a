pub mod engine;
pub mod lightrag;
pub mod normalizer;
pub mod query;
pub mod result;

use std::sync::Arc;

use common::{backends::ResolvedConfig, error::AppError, utils::config::AppConfig};
use tracing::instrument;

pub use engine::{EngineHealth, RetrievalEngine};
pub use lightrag::LightRagEngine;
pub use normalizer::{normalize, ContentBlock, QueryRequest};
pub use query::{ContentDescriptor, ConversationTurn, EngineQuery, QueryMode};
pub use result::{QueryData, QueryMetadata, QueryResult};

/// Builds the retrieval engine for the resolved backend wiring.
pub fn build_engine(
    config: &AppConfig,
    resolved: Arc<ResolvedConfig>,
) -> Result<Arc<dyn RetrievalEngine>, AppError> {
    Ok(Arc::new(LightRagEngine::from_config(config, resolved)?))
}

/// Normalizes a query request and runs it against the engine.
///
/// Invalid requests are rejected before the engine is contacted.
#[instrument(skip_all, fields(mode = request.mode.as_deref().unwrap_or("naive")))]
pub async fn answer_query(
    engine: &dyn RetrievalEngine,
    request: QueryRequest,
) -> Result<QueryResult, AppError> {
    let query = normalize(request)?;
    engine.query(query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    #[derive(Default)]
    struct CountingEngine {
        queries: AtomicUsize,
    }

    #[async_trait]
    impl RetrievalEngine for CountingEngine {
        async fn initialize(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn ingest_document(&self, _path: &Path) -> Result<(), AppError> {
            Ok(())
        }

        async fn query(&self, query: EngineQuery) -> Result<QueryResult, AppError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(QueryResult::success(format!("{} via {}", query.text, query.mode)))
        }

        async fn health(&self) -> Result<EngineHealth, AppError> {
            Ok(EngineHealth::healthy())
        }
    }

    #[tokio::test]
    async fn invalid_mode_never_reaches_the_engine() {
        let engine = CountingEngine::default();
        let mut request = QueryRequest::text("hello");
        request.mode = Some("telepathic".into());

        let err = answer_query(&engine, request).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidMode(_)));
        assert_eq!(engine.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_query_is_dispatched_once() {
        let engine = CountingEngine::default();
        let mut request = QueryRequest::text("hello");
        request.mode = Some("GLOBAL".into());

        let result = answer_query(&engine, request).await.unwrap();

        assert_eq!(result.message, "hello via global");
        assert_eq!(engine.queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_is_built_from_config() {
        let config = AppConfig::default();
        let resolved = Arc::new(common::backends::resolve(&config).unwrap());

        assert!(build_engine(&config, resolved).is_ok());
    }
}
