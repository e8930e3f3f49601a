//! Storage backend selection.
//!
//! The retrieval engine persists its state through four independent storage roles
//! (axes). Each axis selects exactly one backend kind; [`resolve`] turns the raw,
//! possibly legacy configuration into a [`ResolvedConfig`] that is built once at
//! startup and shared read-only afterwards.

mod kinds;
mod resolver;

use std::fmt;

use thiserror::Error;

pub use kinds::{AxisKind, DocStatusKind, GraphKind, KvKind, VectorKind};
pub use resolver::{
    resolve, DocStatusBackend, EmbeddingBinding, GraphBackend, KindSource, KindSources, KvBackend,
    LlmBinding, MultimodalSwitches, PostgresParams, ResolvedConfig, VectorBackend,
    VectorIndexParams,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendAxis {
    Vector,
    Graph,
    KeyValue,
    DocStatus,
}

impl BackendAxis {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendAxis::Vector => "vector",
            BackendAxis::Graph => "graph",
            BackendAxis::KeyValue => "kv",
            BackendAxis::DocStatus => "doc_status",
        }
    }
}

impl fmt::Display for BackendAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown {axis} backend '{value}'")]
    UnknownBackend { axis: BackendAxis, value: String },
    #[error("{axis} backend '{kind}' requires {parameter}")]
    MissingParameter {
        axis: BackendAxis,
        kind: &'static str,
        parameter: &'static str,
    },
    #[error("{parameter} must be {expected}, got {value}")]
    OutOfRange {
        parameter: &'static str,
        expected: &'static str,
        value: String,
    },
}
