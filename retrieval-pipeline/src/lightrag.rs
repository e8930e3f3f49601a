//! Adapter driving a LightRAG-compatible HTTP server.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{backends::ResolvedConfig, error::AppError, utils::config::AppConfig};
use reqwest::multipart::{Form, Part};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    engine::{EngineHealth, RetrievalEngine},
    query::{ContentDescriptor, ConversationTurn, EngineQuery, QueryMode},
    result::{QueryData, QueryMetadata, QueryResult},
};

pub struct LightRagEngine {
    client: reqwest::Client,
    upload_client: reqwest::Client,
    base_url: String,
    resolved: Arc<ResolvedConfig>,
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

#[derive(Serialize)]
#[allow(clippy::struct_excessive_bools)]
struct QueryBody<'a> {
    query: &'a str,
    mode: QueryMode,
    top_k: usize,
    chunk_top_k: usize,
    enable_rerank: bool,
    include_references: bool,
    only_need_context: bool,
    only_need_prompt: bool,
    stream: bool,
    #[serde(skip_serializing_if = "is_empty")]
    conversation_history: &'a [ConversationTurn],
    #[serde(skip_serializing_if = "is_empty")]
    multimodal_content: &'a [ContentDescriptor],
}

impl<'a> QueryBody<'a> {
    fn new(query: &'a EngineQuery) -> Self {
        Self {
            query: &query.text,
            mode: query.mode,
            top_k: query.top_k,
            chunk_top_k: query.chunk_top_k,
            enable_rerank: query.enable_rerank,
            include_references: query.include_references,
            only_need_context: query.only_need_context,
            only_need_prompt: query.only_need_prompt,
            stream: false,
            conversation_history: &query.conversation_history,
            multimodal_content: &query.content,
        }
    }

    fn for_answer(mut self) -> Self {
        self.only_need_context = false;
        self
    }
}

#[derive(Deserialize)]
struct QueryDataResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: QueryData,
    #[serde(default)]
    metadata: Option<QueryMetadata>,
}

#[derive(Deserialize)]
struct AnswerResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    configuration: HashMap<String, Value>,
}

impl LightRagEngine {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        upload_timeout: Duration,
        resolved: Arc<ResolvedConfig>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            upload_client: reqwest::Client::builder()
                .timeout(upload_timeout)
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            resolved,
        })
    }

    pub fn from_config(config: &AppConfig, resolved: Arc<ResolvedConfig>) -> Result<Self, AppError> {
        Self::new(
            &config.lightrag_api_url,
            Duration::from_secs(config.lightrag_timeout),
            Duration::from_secs(config.lightrag_stream_timeout),
            resolved,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(
        url: &str,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, AppError> {
        let response =
            response.map_err(|e| AppError::Engine(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Engine(format!(
                "{url} answered {status}: {}",
                body.trim()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Engine(format!("Unexpected response from {url}: {e}")))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &QueryBody<'_>,
    ) -> Result<T, AppError> {
        let url = self.url(path);
        let response = self.client.post(&url).json(body).send().await;
        Self::decode(&url, response).await
    }

    fn wiring_mismatches(&self, configuration: &HashMap<String, Value>) -> Vec<String> {
        self.resolved
            .storage_wiring()
            .into_iter()
            .filter_map(|(role, expected)| {
                let actual = configuration.get(role).and_then(Value::as_str)?;
                (actual != expected)
                    .then(|| format!("{role}: configured {expected}, engine runs {actual}"))
            })
            .collect()
    }
}

#[async_trait]
impl RetrievalEngine for LightRagEngine {
    async fn initialize(&self) -> Result<(), AppError> {
        let health = self.health().await?;
        if !health.is_healthy() {
            return Err(AppError::Engine(format!(
                "Engine at {} reports status '{}'",
                self.base_url, health.status
            )));
        }

        for mismatch in &health.wiring_mismatches {
            warn!(mismatch = %mismatch, "Engine storage wiring differs from configuration");
        }
        info!(url = %self.base_url, "Retrieval engine ready");
        Ok(())
    }

    #[instrument(skip_all, fields(file = %path.display()))]
    async fn ingest_document(&self, path: &Path) -> Result<(), AppError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AppError::Validation(format!("'{}' has no usable file name", path.display()))
            })?
            .to_string();

        let bytes = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime.essence_str())?;
        let form = Form::new().part("file", part);

        let url = self.url("/documents/upload");
        let response = self.upload_client.post(&url).multipart(form).send().await;
        let upload: UploadResponse = Self::decode(&url, response).await?;

        match upload.status.as_str() {
            "success" => {
                debug!(track_id = ?upload.track_id, "Document accepted by engine");
                Ok(())
            }
            "duplicated" => {
                warn!(file = %file_name, "Engine already holds this document, skipping");
                Ok(())
            }
            other => Err(AppError::Engine(format!(
                "Engine rejected '{file_name}' ({other}): {}",
                upload.message
            ))),
        }
    }

    #[instrument(skip_all, fields(mode = %query.mode, multimodal = query.is_multimodal()))]
    async fn query(&self, query: EngineQuery) -> Result<QueryResult, AppError> {
        let body = QueryBody::new(&query);

        if query.only_need_prompt {
            let prompt: AnswerResponse = self.post_json("/query", &body).await?;
            return Ok(QueryResult {
                metadata: Some(QueryMetadata {
                    query_mode: query.mode.to_string(),
                    prompt: Some(prompt.response),
                    ..QueryMetadata::default()
                }),
                ..QueryResult::success("Prompt assembled")
            });
        }

        let context: QueryDataResponse = self.post_json("/query/data", &body).await?;
        if context.status != "success" {
            return Err(AppError::Engine(if context.message.is_empty() {
                "Context retrieval failed".to_string()
            } else {
                context.message
            }));
        }

        let mut result = QueryResult {
            data: Some(context.data),
            metadata: context.metadata,
            ..QueryResult::success(context.message)
        };

        if !query.only_need_context {
            let answer: AnswerResponse = self.post_json("/query", &body.for_answer()).await?;
            result.answer = Some(answer.response);
        }

        Ok(result)
    }

    async fn health(&self) -> Result<EngineHealth, AppError> {
        let url = self.url("/health");
        let response = self.client.get(&url).send().await;
        let health: HealthResponse = Self::decode(&url, response).await?;

        Ok(EngineHealth {
            status: health.status,
            wiring_mismatches: self.wiring_mismatches(&health.configuration),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use axum::{
        extract::{Multipart, State},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use common::backends::resolve;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Downstream {
        data_calls: AtomicUsize,
        answer_calls: AtomicUsize,
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        last_answer_body: Mutex<Option<Value>>,
    }

    async fn query_data(State(state): State<Arc<Downstream>>) -> Json<Value> {
        state.data_calls.fetch_add(1, Ordering::SeqCst);
        Json(json!({
            "status": "success",
            "message": "Query executed successfully",
            "data": {
                "entities": [{"entity_name": "Rust", "entity_type": "language"}],
                "relationships": [],
                "chunks": [{"content": "Rust is fast", "file_path": "a.txt", "chunk_id": "c1", "reference_id": "1"}],
                "references": [{"reference_id": "1", "file_path": "a.txt"}]
            },
            "metadata": {"query_mode": "naive"}
        }))
    }

    async fn answer(State(state): State<Arc<Downstream>>, Json(body): Json<Value>) -> Json<Value> {
        state.answer_calls.fetch_add(1, Ordering::SeqCst);
        let reply = if body["only_need_prompt"] == json!(true) {
            "PROMPT"
        } else {
            "Rust is a systems language"
        };
        *state.last_answer_body.lock().unwrap() = Some(body);
        Json(json!({ "response": reply }))
    }

    async fn upload(
        State(state): State<Arc<Downstream>>,
        mut multipart: Multipart,
    ) -> Json<Value> {
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("file") {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.unwrap().to_vec();
                let status = if name.starts_with("reject") {
                    "failure"
                } else {
                    "success"
                };
                state.uploads.lock().unwrap().push((name, bytes));
                return Json(json!({"status": status, "message": "ok", "track_id": "t-1"}));
            }
        }
        Json(json!({"status": "failure", "message": "no file"}))
    }

    async fn health() -> Json<Value> {
        Json(json!({
            "status": "healthy",
            "configuration": {
                "vector_storage": "NanoVectorDBStorage",
                "graph_storage": "PGGraphStorage",
                "kv_storage": "PGKVStorage"
            }
        }))
    }

    async fn spawn(state: Arc<Downstream>) -> String {
        let app = Router::new()
            .route("/query/data", post(query_data))
            .route("/query", post(answer))
            .route("/documents/upload", post(upload))
            .route("/health", get(health))
            .route(
                "/broken/health",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn engine(base: &str) -> LightRagEngine {
        let resolved = Arc::new(resolve(&AppConfig::default()).unwrap());
        LightRagEngine::new(
            base,
            Duration::from_secs(5),
            Duration::from_secs(5),
            resolved,
        )
        .unwrap()
    }

    fn query(only_need_context: bool, only_need_prompt: bool) -> EngineQuery {
        EngineQuery {
            text: "what is rust?".into(),
            mode: QueryMode::Naive,
            content: Vec::new(),
            top_k: 40,
            chunk_top_k: 20,
            enable_rerank: true,
            include_references: true,
            only_need_context,
            only_need_prompt,
            conversation_history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn context_query_skips_answer_generation() {
        let state = Arc::new(Downstream::default());
        let base = spawn(Arc::clone(&state)).await;

        let result = engine(&base).query(query(true, false)).await.unwrap();

        assert!(result.is_success());
        assert!(result.answer.is_none());
        let data = result.data.unwrap();
        assert_eq!(data.chunks.len(), 1);
        assert_eq!(data.entities[0].entity_name, "Rust");
        assert_eq!(state.data_calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.answer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answer_query_fetches_context_and_answer() {
        let state = Arc::new(Downstream::default());
        let base = spawn(Arc::clone(&state)).await;

        let result = engine(&base).query(query(false, false)).await.unwrap();

        assert_eq!(result.answer.as_deref(), Some("Rust is a systems language"));
        assert!(result.data.is_some());
        assert_eq!(state.answer_calls.load(Ordering::SeqCst), 1);
        let body = state.last_answer_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["only_need_context"], json!(false));
        assert_eq!(body["stream"], json!(false));
        assert!(body.get("multimodal_content").is_none());
    }

    #[tokio::test]
    async fn prompt_query_returns_prompt_in_metadata() {
        let state = Arc::new(Downstream::default());
        let base = spawn(Arc::clone(&state)).await;

        let result = engine(&base).query(query(false, true)).await.unwrap();

        assert_eq!(
            result.metadata.and_then(|m| m.prompt).as_deref(),
            Some("PROMPT")
        );
        assert!(result.data.is_none());
        assert_eq!(state.data_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn multimodal_content_is_sent_to_the_engine() {
        let state = Arc::new(Downstream::default());
        let base = spawn(Arc::clone(&state)).await;
        let mut q = query(false, false);
        q.content.push(ContentDescriptor::Equation {
            latex: "E=mc^2".into(),
            equation_caption: None,
        });

        engine(&base).query(q).await.unwrap();

        let body = state.last_answer_body.lock().unwrap().clone().unwrap();
        assert_eq!(
            body["multimodal_content"],
            json!([{"type": "equation", "latex": "E=mc^2"}])
        );
    }

    #[tokio::test]
    async fn ingest_uploads_file_under_its_name() {
        let state = Arc::new(Downstream::default());
        let base = spawn(Arc::clone(&state)).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, b"# Notes").await.unwrap();

        engine(&base).ingest_document(&path).await.unwrap();

        let uploads = state.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "notes.md");
        assert_eq!(uploads[0].1, b"# Notes");
    }

    #[tokio::test]
    async fn rejected_upload_is_an_engine_error() {
        let state = Arc::new(Downstream::default());
        let base = spawn(Arc::clone(&state)).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reject.pdf");
        tokio::fs::write(&path, b"%PDF").await.unwrap();

        let err = engine(&base).ingest_document(&path).await.unwrap_err();

        assert!(matches!(err, AppError::Engine(msg) if msg.contains("reject.pdf")));
    }

    #[tokio::test]
    async fn health_reports_wiring_mismatches() {
        let state = Arc::new(Downstream::default());
        let base = spawn(state).await;

        let health = engine(&base).health().await.unwrap();

        assert!(health.is_healthy());
        assert_eq!(
            health.wiring_mismatches,
            vec!["vector_storage: configured PGVectorStorage, engine runs NanoVectorDBStorage"
                .to_string()]
        );
    }

    #[tokio::test]
    async fn error_status_is_an_engine_error() {
        let state = Arc::new(Downstream::default());
        let base = spawn(state).await;

        let err = engine(&format!("{base}/broken")).health().await.unwrap_err();

        assert!(matches!(err, AppError::Engine(msg) if msg.contains("500")));
    }
}
