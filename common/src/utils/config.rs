use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// How the knowledge-base tools are exposed to MCP clients.
#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    /// JSON-RPC over the process's stdin/stdout, next to the HTTP server.
    #[default]
    Stdio,
    /// Older HTTP clients; served by the same `/mcp` endpoint, whose GET stream is SSE.
    Sse,
    /// Served on `/mcp` through the streamable HTTP transport.
    Streamable,
}

impl McpTransport {
    pub fn is_http(self) -> bool {
        matches!(self, McpTransport::Sse | McpTransport::Streamable)
    }
}

/// Raw process configuration as read from the `config` file and the environment.
///
/// Every storage-related value is kept exactly as supplied (including the deprecated
/// variables); turning it into a consistent backend wiring is the job of
/// [`crate::backends::resolve`].
#[derive(Clone, Deserialize, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    // Server
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
    #[serde(default = "default_ingest_max_files")]
    pub ingest_max_files: usize,
    #[serde(default = "default_ingest_max_file_bytes")]
    pub ingest_max_file_bytes: usize,
    #[serde(default)]
    pub mcp_transport: McpTransport,

    // Postgres, shared by every postgres-family backend
    #[serde(default = "default_postgres_value")]
    pub postgres_user: String,
    #[serde(default = "default_postgres_value")]
    pub postgres_password: String,
    #[serde(default = "default_postgres_value")]
    pub postgres_database: String,
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,
    #[serde(default = "default_postgres_port")]
    pub postgres_port: String,

    // LLM provider binding
    #[serde(default = "default_binding")]
    pub llm_binding: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub llm_model_name: Option<String>,
    #[serde(default)]
    pub open_router_api_key: Option<String>,
    #[serde(default)]
    pub openrouter_api_key: Option<String>,
    #[serde(default)]
    pub open_router_api_url: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub chat_model: Option<String>,

    // Embeddings and vision
    #[serde(default = "default_binding")]
    pub embedding_binding: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_max_token_size")]
    pub max_token_size: usize,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    // Storage axes
    #[serde(default)]
    pub vector_storage_type: Option<String>,
    #[serde(default)]
    pub graph_storage_type: Option<String>,
    #[serde(default)]
    pub kv_storage_type: Option<String>,
    #[serde(default)]
    pub doc_status_storage_type: Option<String>,
    /// Deprecated single storage selector.
    #[serde(default)]
    pub rag_storage_type: Option<String>,

    // Backend-specific parameters
    #[serde(default)]
    pub qdrant_url: Option<String>,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default)]
    pub milvus_uri: Option<String>,
    #[serde(default)]
    pub milvus_token: Option<String>,
    #[serde(default)]
    pub neo4j_uri: Option<String>,
    #[serde(default)]
    pub neo4j_username: Option<String>,
    #[serde(default)]
    pub neo4j_password: Option<String>,
    #[serde(default)]
    pub redis_uri: Option<String>,
    #[serde(default)]
    pub mongo_uri: Option<String>,
    #[serde(default)]
    pub mongo_database: Option<String>,
    #[serde(default = "default_vector_index_type")]
    pub vector_index_type: String,
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: u32,
    #[serde(default = "default_hnsw_ef")]
    pub hnsw_ef: u32,

    // Retrieval tuning
    #[serde(default = "default_cosine_threshold")]
    pub cosine_threshold: f32,
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    #[serde(default = "default_true")]
    pub enable_image_processing: bool,
    #[serde(default = "default_true")]
    pub enable_table_processing: bool,
    #[serde(default = "default_true")]
    pub enable_equation_processing: bool,

    // Downstream retrieval service
    #[serde(default = "default_lightrag_api_url")]
    pub lightrag_api_url: String,
    #[serde(default = "default_lightrag_timeout")]
    pub lightrag_timeout: u64,
    #[serde(default = "default_lightrag_stream_timeout")]
    pub lightrag_stream_timeout: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            working_dir: None,
            allowed_origins: default_allowed_origins(),
            ingest_max_body_bytes: default_ingest_max_body_bytes(),
            ingest_max_files: default_ingest_max_files(),
            ingest_max_file_bytes: default_ingest_max_file_bytes(),
            mcp_transport: McpTransport::default(),
            postgres_user: default_postgres_value(),
            postgres_password: default_postgres_value(),
            postgres_database: default_postgres_value(),
            postgres_host: default_postgres_host(),
            postgres_port: default_postgres_port(),
            llm_binding: default_binding(),
            llm_api_key: None,
            llm_base_url: None,
            llm_model_name: None,
            open_router_api_key: None,
            openrouter_api_key: None,
            open_router_api_url: None,
            base_url: None,
            chat_model: None,
            embedding_binding: default_binding(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            max_token_size: default_max_token_size(),
            vision_model: default_vision_model(),
            vector_storage_type: None,
            graph_storage_type: None,
            kv_storage_type: None,
            doc_status_storage_type: None,
            rag_storage_type: None,
            qdrant_url: None,
            qdrant_api_key: None,
            milvus_uri: None,
            milvus_token: None,
            neo4j_uri: None,
            neo4j_username: None,
            neo4j_password: None,
            redis_uri: None,
            mongo_uri: None,
            mongo_database: None,
            vector_index_type: default_vector_index_type(),
            hnsw_m: default_hnsw_m(),
            hnsw_ef: default_hnsw_ef(),
            cosine_threshold: default_cosine_threshold(),
            max_concurrent_files: default_max_concurrent_files(),
            enable_image_processing: true,
            enable_table_processing: true,
            enable_equation_processing: true,
            lightrag_api_url: default_lightrag_api_url(),
            lightrag_timeout: default_lightrag_timeout(),
            lightrag_stream_timeout: default_lightrag_stream_timeout(),
        }
    }
}

impl AppConfig {
    /// Root directory for engine outputs and staging workspaces.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map_or_else(|| std::env::temp_dir().join("rag_storage"), PathBuf::from)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.working_dir().join("staging")
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> String {
    "*".to_string()
}

fn default_ingest_max_body_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_ingest_max_files() -> usize {
    100
}

fn default_ingest_max_file_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_postgres_value() -> String {
    "raganything".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> String {
    "5432".to_string()
}

fn default_binding() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dim() -> usize {
    1536
}

fn default_max_token_size() -> usize {
    8192
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_vector_index_type() -> String {
    "HNSW".to_string()
}

fn default_hnsw_m() -> u32 {
    16
}

fn default_hnsw_ef() -> u32 {
    64
}

fn default_cosine_threshold() -> f32 {
    0.2
}

fn default_max_concurrent_files() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_lightrag_api_url() -> String {
    "http://localhost:9621".to_string()
}

fn default_lightrag_timeout() -> u64 {
    60
}

fn default_lightrag_stream_timeout() -> u64 {
    300
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
