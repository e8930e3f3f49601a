use std::collections::BTreeMap;

use tracing::warn;

use super::{
    kinds::{AxisKind, DocStatusKind, GraphKind, KvKind, VectorKind},
    BackendAxis, ConfigError,
};
use crate::utils::config::AppConfig;

const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
const DEFAULT_MILVUS_URI: &str = "http://localhost:19530";
const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
const DEFAULT_NEO4J_USERNAME: &str = "neo4j";
const DEFAULT_REDIS_URI: &str = "redis://localhost:6379";
const DEFAULT_MONGO_DATABASE: &str = "LightRAG";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Where the kind of an axis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindSource {
    Explicit,
    Legacy,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndexParams {
    pub index_type: String,
    pub hnsw_m: u32,
    pub hnsw_ef: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorBackend {
    PgVector { index: VectorIndexParams },
    Qdrant { url: String, api_key: Option<String> },
    Milvus { uri: String, token: Option<String> },
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphBackend {
    Postgres,
    Neo4j {
        uri: String,
        username: String,
        password: String,
    },
    NetworkX,
    Memgraph {
        uri: String,
        username: Option<String>,
        password: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvBackend {
    Postgres,
    Redis { uri: String },
    Mongo { uri: String, database: String },
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocStatusBackend {
    Postgres,
    Mongo { uri: String, database: String },
    Json,
}

impl VectorBackend {
    pub fn kind(&self) -> VectorKind {
        match self {
            Self::PgVector { .. } => VectorKind::PgVector,
            Self::Qdrant { .. } => VectorKind::Qdrant,
            Self::Milvus { .. } => VectorKind::Milvus,
            Self::Local => VectorKind::Local,
        }
    }
}

impl GraphBackend {
    pub fn kind(&self) -> GraphKind {
        match self {
            Self::Postgres => GraphKind::Postgres,
            Self::Neo4j { .. } => GraphKind::Neo4j,
            Self::NetworkX => GraphKind::NetworkX,
            Self::Memgraph { .. } => GraphKind::Memgraph,
        }
    }
}

impl KvBackend {
    pub fn kind(&self) -> KvKind {
        match self {
            Self::Postgres => KvKind::Postgres,
            Self::Redis { .. } => KvKind::Redis,
            Self::Mongo { .. } => KvKind::Mongo,
            Self::Json => KvKind::Json,
        }
    }
}

impl DocStatusBackend {
    pub fn kind(&self) -> DocStatusKind {
        match self {
            Self::Postgres => DocStatusKind::Postgres,
            Self::Mongo { .. } => DocStatusKind::Mongo,
            Self::Json => DocStatusKind::Json,
        }
    }
}

/// Connection parameters shared by every postgres-family backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresParams {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmBinding {
    pub binding: String,
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingBinding {
    pub binding: String,
    pub model: String,
    pub dim: usize,
    pub max_token_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct MultimodalSwitches {
    pub image: bool,
    pub table: bool,
    pub equation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSources {
    pub vector: KindSource,
    pub graph: KindSource,
    pub kv: KindSource,
    pub doc_status: KindSource,
}

/// The backend wiring for one process. Built once by [`resolve`], never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub vector: VectorBackend,
    pub graph: GraphBackend,
    pub kv: KvBackend,
    pub doc_status: DocStatusBackend,
    pub sources: KindSources,
    /// Present whenever at least one axis uses a postgres-family kind.
    pub postgres: Option<PostgresParams>,
    pub cosine_threshold: f32,
    pub max_concurrent_files: usize,
    pub llm: LlmBinding,
    pub embedding: EmbeddingBinding,
    pub vision_model: String,
    pub multimodal: MultimodalSwitches,
}

/// Resolves the raw configuration into one backend per axis.
///
/// Per axis the explicit variable wins, then the legacy `RAG_STORAGE_TYPE`, then the
/// axis default. Blank values count as absent. The function performs no I/O and yields
/// the same result for the same input.
pub fn resolve(raw: &AppConfig) -> Result<ResolvedConfig, ConfigError> {
    let legacy = present(&raw.rag_storage_type);

    let (vector_kind, vector_source) =
        select_kind::<VectorKind>(present(&raw.vector_storage_type), legacy)?;
    let (graph_kind, graph_source) =
        select_kind::<GraphKind>(present(&raw.graph_storage_type), legacy)?;
    let (kv_kind, kv_source) = select_kind::<KvKind>(present(&raw.kv_storage_type), legacy)?;
    let (doc_status_kind, doc_status_source) =
        select_kind::<DocStatusKind>(present(&raw.doc_status_storage_type), legacy)?;

    let vector = vector_backend(vector_kind, raw);
    let graph = graph_backend(graph_kind, raw)?;
    let kv = kv_backend(kv_kind, raw)?;
    let doc_status = doc_status_backend(doc_status_kind, raw)?;

    let uses_postgres = vector_kind == VectorKind::PgVector
        || graph_kind == GraphKind::Postgres
        || kv_kind == KvKind::Postgres
        || doc_status_kind == DocStatusKind::Postgres;
    let postgres = uses_postgres.then(|| PostgresParams {
        user: raw.postgres_user.clone(),
        password: raw.postgres_password.clone(),
        database: raw.postgres_database.clone(),
        host: raw.postgres_host.clone(),
        port: raw.postgres_port.clone(),
    });

    if !(0.0..=1.0).contains(&raw.cosine_threshold) {
        return Err(ConfigError::OutOfRange {
            parameter: "COSINE_THRESHOLD",
            expected: "between 0.0 and 1.0",
            value: raw.cosine_threshold.to_string(),
        });
    }
    if raw.max_concurrent_files == 0 {
        return Err(ConfigError::OutOfRange {
            parameter: "MAX_CONCURRENT_FILES",
            expected: "at least 1",
            value: raw.max_concurrent_files.to_string(),
        });
    }

    Ok(ResolvedConfig {
        vector,
        graph,
        kv,
        doc_status,
        sources: KindSources {
            vector: vector_source,
            graph: graph_source,
            kv: kv_source,
            doc_status: doc_status_source,
        },
        postgres,
        cosine_threshold: raw.cosine_threshold,
        max_concurrent_files: raw.max_concurrent_files,
        llm: llm_binding(raw),
        embedding: EmbeddingBinding {
            binding: raw.embedding_binding.clone(),
            model: raw.embedding_model.clone(),
            dim: raw.embedding_dim,
            max_token_size: raw.max_token_size,
        },
        vision_model: raw.vision_model.clone(),
        multimodal: MultimodalSwitches {
            image: raw.enable_image_processing,
            table: raw.enable_table_processing,
            equation: raw.enable_equation_processing,
        },
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn first_present<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates.iter().find_map(|value| present(value))
}

fn select_kind<K: AxisKind>(
    explicit: Option<&str>,
    legacy: Option<&str>,
) -> Result<(K, KindSource), ConfigError> {
    if let Some(value) = explicit {
        return Ok((value.parse()?, KindSource::Explicit));
    }

    if let Some(value) = legacy {
        match K::from_legacy(value)? {
            Some(kind) => return Ok((kind, KindSource::Legacy)),
            None => warn!(
                axis = %K::AXIS,
                legacy = value,
                default = %K::DEFAULT,
                "RAG_STORAGE_TYPE does not apply to this axis, using the default"
            ),
        }
    }

    Ok((K::DEFAULT, KindSource::Default))
}

fn missing(axis: BackendAxis, kind: &'static str, parameter: &'static str) -> ConfigError {
    ConfigError::MissingParameter {
        axis,
        kind,
        parameter,
    }
}

fn vector_backend(kind: VectorKind, raw: &AppConfig) -> VectorBackend {
    match kind {
        VectorKind::PgVector => VectorBackend::PgVector {
            index: VectorIndexParams {
                index_type: raw.vector_index_type.clone(),
                hnsw_m: raw.hnsw_m,
                hnsw_ef: raw.hnsw_ef,
            },
        },
        VectorKind::Qdrant => VectorBackend::Qdrant {
            url: present(&raw.qdrant_url)
                .unwrap_or(DEFAULT_QDRANT_URL)
                .to_string(),
            api_key: present(&raw.qdrant_api_key).map(String::from),
        },
        VectorKind::Milvus => VectorBackend::Milvus {
            uri: present(&raw.milvus_uri)
                .unwrap_or(DEFAULT_MILVUS_URI)
                .to_string(),
            token: present(&raw.milvus_token).map(String::from),
        },
        VectorKind::Local => VectorBackend::Local,
    }
}

fn graph_backend(kind: GraphKind, raw: &AppConfig) -> Result<GraphBackend, ConfigError> {
    let uri = present(&raw.neo4j_uri).unwrap_or(DEFAULT_NEO4J_URI).to_string();

    Ok(match kind {
        GraphKind::Postgres => GraphBackend::Postgres,
        GraphKind::Neo4j => GraphBackend::Neo4j {
            uri,
            username: present(&raw.neo4j_username)
                .unwrap_or(DEFAULT_NEO4J_USERNAME)
                .to_string(),
            password: present(&raw.neo4j_password)
                .ok_or_else(|| missing(BackendAxis::Graph, "neo4j", "NEO4J_PASSWORD"))?
                .to_string(),
        },
        GraphKind::NetworkX => GraphBackend::NetworkX,
        GraphKind::Memgraph => GraphBackend::Memgraph {
            uri,
            username: present(&raw.neo4j_username).map(String::from),
            password: present(&raw.neo4j_password).map(String::from),
        },
    })
}

fn mongo_params(raw: &AppConfig, axis: BackendAxis) -> Result<(String, String), ConfigError> {
    let uri = present(&raw.mongo_uri).ok_or_else(|| missing(axis, "mongo", "MONGO_URI"))?;
    let database = present(&raw.mongo_database).unwrap_or(DEFAULT_MONGO_DATABASE);
    Ok((uri.to_string(), database.to_string()))
}

fn kv_backend(kind: KvKind, raw: &AppConfig) -> Result<KvBackend, ConfigError> {
    Ok(match kind {
        KvKind::Postgres => KvBackend::Postgres,
        KvKind::Redis => KvBackend::Redis {
            uri: present(&raw.redis_uri)
                .unwrap_or(DEFAULT_REDIS_URI)
                .to_string(),
        },
        KvKind::Mongo => {
            let (uri, database) = mongo_params(raw, BackendAxis::KeyValue)?;
            KvBackend::Mongo { uri, database }
        }
        KvKind::Json => KvBackend::Json,
    })
}

fn doc_status_backend(
    kind: DocStatusKind,
    raw: &AppConfig,
) -> Result<DocStatusBackend, ConfigError> {
    Ok(match kind {
        DocStatusKind::Postgres => DocStatusBackend::Postgres,
        DocStatusKind::Mongo => {
            let (uri, database) = mongo_params(raw, BackendAxis::DocStatus)?;
            DocStatusBackend::Mongo { uri, database }
        }
        DocStatusKind::Json => DocStatusBackend::Json,
    })
}

fn llm_binding(raw: &AppConfig) -> LlmBinding {
    let api_key = first_present(&[
        &raw.llm_api_key,
        &raw.open_router_api_key,
        &raw.openrouter_api_key,
    ])
    .map(String::from);
    if api_key.is_none() {
        warn!("No LLM credential configured (LLM_API_KEY); engine calls will likely fail");
    }

    LlmBinding {
        binding: raw.llm_binding.clone(),
        host: first_present(&[&raw.llm_base_url, &raw.base_url, &raw.open_router_api_url])
            .unwrap_or(DEFAULT_LLM_BASE_URL)
            .to_string(),
        api_key,
        model: first_present(&[&raw.llm_model_name, &raw.chat_model])
            .unwrap_or(DEFAULT_LLM_MODEL)
            .to_string(),
    }
}

impl ResolvedConfig {
    /// Storage implementation names keyed by the engine's storage role.
    pub fn storage_wiring(&self) -> [(&'static str, &'static str); 4] {
        [
            ("vector_storage", self.vector.kind().storage_name()),
            ("graph_storage", self.graph.kind().storage_name()),
            ("kv_storage", self.kv.kind().storage_name()),
            ("doc_status_storage", self.doc_status.kind().storage_name()),
        ]
    }

    /// Renders the wiring as the environment a LightRAG-compatible engine consumes.
    ///
    /// Contains credentials; never log the result.
    pub fn engine_environment(&self) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();

        env.insert(
            "LIGHTRAG_VECTOR_STORAGE",
            self.vector.kind().storage_name().to_string(),
        );
        env.insert(
            "LIGHTRAG_GRAPH_STORAGE",
            self.graph.kind().storage_name().to_string(),
        );
        env.insert("LIGHTRAG_KV_STORAGE", self.kv.kind().storage_name().to_string());
        env.insert(
            "LIGHTRAG_DOC_STATUS_STORAGE",
            self.doc_status.kind().storage_name().to_string(),
        );

        if let Some(pg) = &self.postgres {
            env.insert("POSTGRES_USER", pg.user.clone());
            env.insert("POSTGRES_PASSWORD", pg.password.clone());
            env.insert("POSTGRES_DATABASE", pg.database.clone());
            env.insert("POSTGRES_HOST", pg.host.clone());
            env.insert("POSTGRES_PORT", pg.port.clone());
        }

        match &self.vector {
            VectorBackend::PgVector { index } => {
                env.insert("POSTGRES_VECTOR_INDEX_TYPE", index.index_type.clone());
                env.insert("POSTGRES_HNSW_M", index.hnsw_m.to_string());
                env.insert("POSTGRES_HNSW_EF", index.hnsw_ef.to_string());
            }
            VectorBackend::Qdrant { url, api_key } => {
                env.insert("QDRANT_URL", url.clone());
                if let Some(key) = api_key {
                    env.insert("QDRANT_API_KEY", key.clone());
                }
            }
            VectorBackend::Milvus { uri, token } => {
                env.insert("MILVUS_URI", uri.clone());
                if let Some(token) = token {
                    env.insert("MILVUS_TOKEN", token.clone());
                }
            }
            VectorBackend::Local => {}
        }

        match &self.graph {
            GraphBackend::Neo4j {
                uri,
                username,
                password,
            } => {
                env.insert("NEO4J_URI", uri.clone());
                env.insert("NEO4J_USERNAME", username.clone());
                env.insert("NEO4J_PASSWORD", password.clone());
            }
            GraphBackend::Memgraph {
                uri,
                username,
                password,
            } => {
                env.insert("NEO4J_URI", uri.clone());
                if let Some(username) = username {
                    env.insert("NEO4J_USERNAME", username.clone());
                }
                if let Some(password) = password {
                    env.insert("NEO4J_PASSWORD", password.clone());
                }
            }
            GraphBackend::Postgres | GraphBackend::NetworkX => {}
        }

        match &self.kv {
            KvBackend::Redis { uri } => {
                env.insert("REDIS_URI", uri.clone());
            }
            KvBackend::Mongo { uri, database } => {
                env.insert("MONGO_URI", uri.clone());
                env.insert("MONGO_DATABASE", database.clone());
            }
            KvBackend::Postgres | KvBackend::Json => {}
        }

        if let DocStatusBackend::Mongo { uri, database } = &self.doc_status {
            env.insert("MONGO_URI", uri.clone());
            env.insert("MONGO_DATABASE", database.clone());
        }

        env.insert("COSINE_THRESHOLD", self.cosine_threshold.to_string());
        env.insert("MAX_PARALLEL_INSERT", self.max_concurrent_files.to_string());

        env.insert("LLM_BINDING", self.llm.binding.clone());
        env.insert("LLM_BINDING_HOST", self.llm.host.clone());
        if let Some(key) = &self.llm.api_key {
            env.insert("LLM_BINDING_API_KEY", key.clone());
        }
        env.insert("LLM_MODEL", self.llm.model.clone());

        env.insert("EMBEDDING_BINDING", self.embedding.binding.clone());
        env.insert("EMBEDDING_MODEL", self.embedding.model.clone());
        env.insert("EMBEDDING_DIM", self.embedding.dim.to_string());
        env.insert("MAX_EMBED_TOKENS", self.embedding.max_token_size.to_string());

        env.insert("VISION_MODEL", self.vision_model.clone());
        env.insert(
            "ENABLE_IMAGE_PROCESSING",
            self.multimodal.image.to_string(),
        );
        env.insert(
            "ENABLE_TABLE_PROCESSING",
            self.multimodal.table.to_string(),
        );
        env.insert(
            "ENABLE_EQUATION_PROCESSING",
            self.multimodal.equation.to_string(),
        );

        env
    }

    /// One-line, secret-free summary suitable for startup logs.
    pub fn describe(&self) -> String {
        format!(
            "vector={} ({}), graph={} ({}), kv={} ({}), doc_status={} ({}), llm={} [{}], embedding={} [{}d]",
            self.vector.kind(),
            self.vector.kind().storage_name(),
            self.graph.kind(),
            self.graph.kind().storage_name(),
            self.kv.kind(),
            self.kv.kind().storage_name(),
            self.doc_status.kind(),
            self.doc_status.kind().storage_name(),
            self.llm.model,
            self.llm.binding,
            self.embedding.model,
            self.embedding.dim,
        )
    }
}
