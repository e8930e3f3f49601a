//! Knowledge-base tools for MCP clients, served over stdio or streamable HTTP.

use std::sync::Arc;

use common::error::AppError;
use retrieval_pipeline::{answer_query, ContentBlock, QueryRequest, RetrievalEngine};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    },
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api_state::ApiState;

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct KnowledgeBaseQuery {
    /// The user's question or search query.
    pub query: String,
    /// Search mode: "naive" (default, recommended), "local", "global", "hybrid", "mix" or "bypass".
    #[serde(default)]
    pub mode: Option<String>,
    /// Number of chunks to retrieve (default 10, use 20 for a broader search).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Return only the retrieved context without an LLM answer (default true).
    #[serde(default = "default_true")]
    pub only_need_context: bool,
}

impl From<KnowledgeBaseQuery> for QueryRequest {
    fn from(args: KnowledgeBaseQuery) -> Self {
        QueryRequest {
            mode: args.mode,
            top_k: args.top_k,
            only_need_context: Some(args.only_need_context),
            ..QueryRequest::text(args.query)
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct MultimodalKnowledgeBaseQuery {
    /// The user's question or search query.
    pub query: String,
    /// Search mode; "hybrid" works best with multimodal content.
    #[serde(default)]
    pub mode: Option<String>,
    /// Number of chunks to retrieve (default 10).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Path to an image file to include in the query.
    #[serde(default)]
    pub image_path: Option<String>,
    /// Base64-encoded image data, as an alternative to `image_path`.
    #[serde(default)]
    pub image_base64: Option<String>,
    /// CSV-formatted table data, e.g. "col1,col2\nval1,val2".
    #[serde(default)]
    pub table_data: Option<String>,
    #[serde(default)]
    pub table_caption: Option<String>,
    /// LaTeX equation, e.g. "E=mc^2".
    #[serde(default)]
    pub equation_latex: Option<String>,
    #[serde(default)]
    pub equation_caption: Option<String>,
}

impl From<MultimodalKnowledgeBaseQuery> for QueryRequest {
    fn from(args: MultimodalKnowledgeBaseQuery) -> Self {
        let mut blocks = Vec::new();

        let img_path = non_blank(args.image_path);
        let image_data = non_blank(args.image_base64);
        if img_path.is_some() || image_data.is_some() {
            blocks.push(ContentBlock::Image {
                img_path,
                image_data,
                caption: None,
            });
        }
        if let Some(table_data) = non_blank(args.table_data) {
            blocks.push(ContentBlock::Table {
                table_data,
                caption: non_blank(args.table_caption),
            });
        }
        if let Some(latex) = non_blank(args.equation_latex) {
            blocks.push(ContentBlock::Equation {
                latex,
                caption: non_blank(args.equation_caption),
            });
        }

        // Without content blocks this is a plain context search.
        let only_need_context = blocks.is_empty();

        QueryRequest {
            mode: args.mode,
            top_k: args.top_k,
            multimodal_content: blocks,
            only_need_context: Some(only_need_context),
            ..QueryRequest::text(args.query)
        }
    }
}

/// Runs the query and renders the result as the tool's JSON text output.
///
/// Rejected queries and engine failures become tool errors so the client model can
/// react to them.
async fn run_query(
    engine: &dyn RetrievalEngine,
    request: QueryRequest,
) -> Result<CallToolResult, McpError> {
    match answer_query(engine, request).await {
        Ok(result) => {
            let body = serde_json::to_string(&result)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(body)]))
        }
        Err(err) if err.is_client_error() => {
            Ok(CallToolResult::error(vec![Content::text(err.to_string())]))
        }
        Err(err) => {
            warn!(error = %err, "knowledge base tool query failed");
            Ok(CallToolResult::error(vec![Content::text(
                "Knowledge base query failed",
            )]))
        }
    }
}

#[derive(Clone)]
pub struct KnowledgeBaseTools {
    engine: Arc<dyn RetrievalEngine>,
    tool_router: ToolRouter<KnowledgeBaseTools>,
}

#[tool_router]
impl KnowledgeBaseTools {
    pub fn new(engine: Arc<dyn RetrievalEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Search the knowledge base for relevant document chunks. Start with mode=\"naive\" and top_k=10; if nothing relevant comes back, ask before retrying with mode=\"hybrid\" and top_k=20."
    )]
    async fn query_knowledge_base(
        &self,
        Parameters(args): Parameters<KnowledgeBaseQuery>,
    ) -> Result<CallToolResult, McpError> {
        run_query(self.engine.as_ref(), args.into()).await
    }

    #[tool(
        description = "Query the knowledge base with an image, a table or an equation alongside the question. Use mode=\"hybrid\" and descriptive captions for best results."
    )]
    async fn query_knowledge_base_multimodal(
        &self,
        Parameters(args): Parameters<MultimodalKnowledgeBaseQuery>,
    ) -> Result<CallToolResult, McpError> {
        run_query(self.engine.as_ref(), args.into()).await
    }
}

#[tool_handler]
impl ServerHandler for KnowledgeBaseTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Retrieval over the indexed document collection. Use query_knowledge_base for text questions and query_knowledge_base_multimodal when the question carries an image, table or equation.".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Streamable HTTP endpoint, one tool set per session.
pub fn streamable_http_service(
    app_state: &ApiState,
) -> StreamableHttpService<KnowledgeBaseTools, LocalSessionManager> {
    let engine = Arc::clone(&app_state.engine);
    StreamableHttpService::new(
        move || Ok(KnowledgeBaseTools::new(Arc::clone(&engine))),
        LocalSessionManager::default().into(),
        Default::default(),
    )
}

/// Serves the tools over stdin/stdout until the client disconnects.
pub async fn serve_stdio(engine: Arc<dyn RetrievalEngine>) -> Result<(), AppError> {
    let service = KnowledgeBaseTools::new(engine)
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| AppError::InternalError(format!("MCP stdio handshake failed: {e}")))?;
    info!("MCP tools serving over stdio");

    let reason = service.waiting().await?;
    info!(?reason, "MCP stdio session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use retrieval_pipeline::{EngineHealth, EngineQuery, QueryResult};

    #[derive(Default)]
    struct RecordingEngine {
        calls: AtomicUsize,
        last: std::sync::Mutex<Option<EngineQuery>>,
        broken: bool,
    }

    #[async_trait]
    impl RetrievalEngine for RecordingEngine {
        async fn initialize(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn ingest_document(&self, _path: &Path) -> Result<(), AppError> {
            Ok(())
        }

        async fn query(&self, query: EngineQuery) -> Result<QueryResult, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = query.text.clone();
            *self.last.lock().unwrap() = Some(query);
            if self.broken {
                return Err(AppError::Engine("upstream key sk-secret refused".into()));
            }
            Ok(QueryResult::success(format!("context for '{text}'")))
        }

        async fn health(&self) -> Result<EngineHealth, AppError> {
            Ok(EngineHealth::healthy())
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        serde_json::to_string(result).unwrap()
    }

    #[test]
    fn text_tool_defaults_to_context_only_naive_search() {
        let args: KnowledgeBaseQuery =
            serde_json::from_value(serde_json::json!({ "query": "main findings?" })).unwrap();
        let request = QueryRequest::from(args);

        assert_eq!(request.top_k, 10);
        assert_eq!(request.only_need_context, Some(true));
        assert!(request.mode.is_none());
        assert!(request.multimodal_content.is_empty());
    }

    #[test]
    fn multimodal_tool_builds_blocks_and_asks_for_an_answer() {
        let args: MultimodalKnowledgeBaseQuery = serde_json::from_value(serde_json::json!({
            "query": "compare",
            "mode": "hybrid",
            "table_data": "Method,Accuracy\nRAG,95%",
            "table_caption": "Performance",
            "equation_latex": "E=mc^2",
            "image_path": "   ",
        }))
        .unwrap();
        let request = QueryRequest::from(args);

        assert_eq!(request.multimodal_content.len(), 2);
        assert!(matches!(
            &request.multimodal_content[0],
            ContentBlock::Table { caption: Some(caption), .. } if caption == "Performance"
        ));
        assert!(matches!(
            &request.multimodal_content[1],
            ContentBlock::Equation { latex, caption: None } if latex == "E=mc^2"
        ));
        assert_eq!(request.only_need_context, Some(false));
    }

    #[test]
    fn multimodal_tool_without_content_falls_back_to_context_search() {
        let args: MultimodalKnowledgeBaseQuery =
            serde_json::from_value(serde_json::json!({ "query": "plain" })).unwrap();
        let request = QueryRequest::from(args);

        assert!(request.multimodal_content.is_empty());
        assert_eq!(request.only_need_context, Some(true));
    }

    #[tokio::test]
    async fn tool_returns_engine_result_as_json_text() {
        let engine = Arc::new(RecordingEngine::default());
        let tools = KnowledgeBaseTools::new(engine.clone());

        let result = tools
            .query_knowledge_base(Parameters(KnowledgeBaseQuery {
                query: "what is rag?".into(),
                mode: Some("hybrid".into()),
                top_k: 20,
                only_need_context: true,
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert!(text_of(&result).contains("context for 'what is rag?'"));
        let seen = engine.last.lock().unwrap().clone().unwrap();
        assert_eq!(seen.top_k, 20);
        assert!(seen.only_need_context);
    }

    #[tokio::test]
    async fn invalid_mode_is_a_tool_error_without_engine_call() {
        let engine = Arc::new(RecordingEngine::default());
        let tools = KnowledgeBaseTools::new(engine.clone());

        let result = tools
            .query_knowledge_base(Parameters(KnowledgeBaseQuery {
                query: "q".into(),
                mode: Some("telepathic".into()),
                top_k: 10,
                only_need_context: true,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert!(text_of(&result).contains("telepathic"));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn engine_failure_is_reported_without_details() {
        let engine = Arc::new(RecordingEngine {
            broken: true,
            ..Default::default()
        });
        let tools = KnowledgeBaseTools::new(engine);

        let result = tools
            .query_knowledge_base_multimodal(Parameters(MultimodalKnowledgeBaseQuery {
                query: "q".into(),
                mode: None,
                top_k: 10,
                image_path: None,
                image_base64: None,
                table_data: None,
                table_caption: None,
                equation_latex: Some("a^2+b^2=c^2".into()),
                equation_caption: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert!(!text_of(&result).contains("sk-secret"));
    }
}
