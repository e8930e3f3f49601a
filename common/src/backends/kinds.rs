use std::{fmt, str::FromStr};

use super::{BackendAxis, ConfigError};

/// A fieldless backend selector for one storage axis.
pub trait AxisKind: Copy + FromStr<Err = ConfigError> + fmt::Display {
    const AXIS: BackendAxis;
    const DEFAULT: Self;

    fn as_str(self) -> &'static str;

    /// Name of the engine storage implementation wired for this kind.
    fn storage_name(self) -> &'static str;

    /// Interprets the deprecated single storage selector for this axis.
    ///
    /// `Ok(None)` means the legacy value does not apply to this axis and the axis
    /// default should be used instead.
    fn from_legacy(value: &str) -> Result<Option<Self>, ConfigError>;
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn unknown(axis: BackendAxis, value: &str) -> ConfigError {
    ConfigError::UnknownBackend {
        axis,
        value: value.to_string(),
    }
}

macro_rules! display_as_str {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorKind {
    PgVector,
    Qdrant,
    Milvus,
    Local,
}

impl FromStr for VectorKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "pgvector" => Ok(Self::PgVector),
            "qdrant" => Ok(Self::Qdrant),
            "milvus" => Ok(Self::Milvus),
            "local" => Ok(Self::Local),
            _ => Err(unknown(Self::AXIS, value)),
        }
    }
}

impl AxisKind for VectorKind {
    const AXIS: BackendAxis = BackendAxis::Vector;
    const DEFAULT: Self = Self::PgVector;

    fn as_str(self) -> &'static str {
        match self {
            Self::PgVector => "pgvector",
            Self::Qdrant => "qdrant",
            Self::Milvus => "milvus",
            Self::Local => "local",
        }
    }

    fn storage_name(self) -> &'static str {
        match self {
            Self::PgVector => "PGVectorStorage",
            Self::Qdrant => "QdrantVectorDBStorage",
            Self::Milvus => "MilvusVectorDBStorage",
            Self::Local => "NanoVectorDBStorage",
        }
    }

    // The legacy selector predates the split into axes and was vector-only, so it is
    // honored verbatim here. It named the postgres family as "postgres".
    fn from_legacy(value: &str) -> Result<Option<Self>, ConfigError> {
        match normalize(value).as_str() {
            "postgres" | "postgresql" => Ok(Some(Self::PgVector)),
            _ => value.parse().map(Some),
        }
    }
}

display_as_str!(VectorKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphKind {
    Postgres,
    Neo4j,
    NetworkX,
    Memgraph,
}

impl FromStr for GraphKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "postgres" => Ok(Self::Postgres),
            "neo4j" => Ok(Self::Neo4j),
            "networkx" => Ok(Self::NetworkX),
            "memgraph" => Ok(Self::Memgraph),
            _ => Err(unknown(Self::AXIS, value)),
        }
    }
}

impl AxisKind for GraphKind {
    const AXIS: BackendAxis = BackendAxis::Graph;
    const DEFAULT: Self = Self::Postgres;

    fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Neo4j => "neo4j",
            Self::NetworkX => "networkx",
            Self::Memgraph => "memgraph",
        }
    }

    fn storage_name(self) -> &'static str {
        match self {
            Self::Postgres => "PGGraphStorage",
            Self::Neo4j => "Neo4JStorage",
            Self::NetworkX => "NetworkXStorage",
            Self::Memgraph => "MemgraphStorage",
        }
    }

    fn from_legacy(value: &str) -> Result<Option<Self>, ConfigError> {
        if is_postgres_alias(value) {
            return Ok(Some(Self::Postgres));
        }
        Ok(value.parse().ok())
    }
}

display_as_str!(GraphKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvKind {
    Postgres,
    Redis,
    Mongo,
    Json,
}

impl FromStr for KvKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "postgres" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            "mongo" => Ok(Self::Mongo),
            "json" => Ok(Self::Json),
            _ => Err(unknown(Self::AXIS, value)),
        }
    }
}

impl AxisKind for KvKind {
    const AXIS: BackendAxis = BackendAxis::KeyValue;
    const DEFAULT: Self = Self::Postgres;

    fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Redis => "redis",
            Self::Mongo => "mongo",
            Self::Json => "json",
        }
    }

    fn storage_name(self) -> &'static str {
        match self {
            Self::Postgres => "PGKVStorage",
            Self::Redis => "RedisKVStorage",
            Self::Mongo => "MongoKVStorage",
            Self::Json => "JsonKVStorage",
        }
    }

    fn from_legacy(value: &str) -> Result<Option<Self>, ConfigError> {
        if is_postgres_alias(value) {
            return Ok(Some(Self::Postgres));
        }
        Ok(value.parse().ok())
    }
}

display_as_str!(KvKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocStatusKind {
    Postgres,
    Mongo,
    Json,
}

impl FromStr for DocStatusKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "postgres" => Ok(Self::Postgres),
            "mongo" => Ok(Self::Mongo),
            "json" => Ok(Self::Json),
            _ => Err(unknown(Self::AXIS, value)),
        }
    }
}

impl AxisKind for DocStatusKind {
    const AXIS: BackendAxis = BackendAxis::DocStatus;
    const DEFAULT: Self = Self::Postgres;

    fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mongo => "mongo",
            Self::Json => "json",
        }
    }

    fn storage_name(self) -> &'static str {
        match self {
            Self::Postgres => "PGDocStatusStorage",
            Self::Mongo => "MongoDocStatusStorage",
            Self::Json => "JsonDocStatusStorage",
        }
    }

    fn from_legacy(value: &str) -> Result<Option<Self>, ConfigError> {
        if is_postgres_alias(value) {
            return Ok(Some(Self::Postgres));
        }
        Ok(value.parse().ok())
    }
}

display_as_str!(DocStatusKind);

/// Legacy spellings that all mean "the postgres family" on non-vector axes.
fn is_postgres_alias(value: &str) -> bool {
    matches!(
        normalize(value).as_str(),
        "postgres" | "postgresql" | "pgvector"
    )
}
