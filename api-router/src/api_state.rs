use std::sync::Arc;

use common::{
    backends::ResolvedConfig, error::AppError, proxy::ProxyDispatcher, utils::config::AppConfig,
};
use ingestion_pipeline::{IndexingConfig, IndexingOrchestrator};
use retrieval_pipeline::RetrievalEngine;

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub resolved: Arc<ResolvedConfig>,
    pub engine: Arc<dyn RetrievalEngine>,
    pub orchestrator: IndexingOrchestrator,
    pub proxy: ProxyDispatcher,
}

impl ApiState {
    pub fn new(
        config: &AppConfig,
        resolved: Arc<ResolvedConfig>,
        engine: Arc<dyn RetrievalEngine>,
    ) -> Result<Self, AppError> {
        let orchestrator = IndexingOrchestrator::new(
            Arc::clone(&engine),
            IndexingConfig::from_config(config, &resolved),
        );
        let proxy = ProxyDispatcher::from_config(config)?;

        Ok(Self {
            config: config.clone(),
            resolved,
            engine,
            orchestrator,
            proxy,
        })
    }
}
