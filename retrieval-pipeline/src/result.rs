use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityResult {
    pub entity_name: String,
    pub entity_type: String,
    pub description: String,
    pub source_id: String,
    pub file_path: String,
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipResult {
    pub src_id: String,
    pub tgt_id: String,
    pub description: String,
    pub keywords: String,
    pub weight: f64,
    pub source_id: String,
    pub file_path: String,
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkResult {
    pub content: String,
    pub file_path: String,
    pub chunk_id: String,
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceResult {
    pub reference_id: String,
    pub file_path: String,
}

/// Retrieved context backing an answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryData {
    pub entities: Vec<EntityResult>,
    pub relationships: Vec<RelationshipResult>,
    pub chunks: Vec<ChunkResult>,
    pub references: Vec<ReferenceResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordsInfo {
    pub high_level: Vec<String>,
    pub low_level: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingInfo {
    pub total_entities_found: u64,
    pub total_relations_found: u64,
    pub entities_after_truncation: u64,
    pub relations_after_truncation: u64,
    pub merged_chunks_count: u64,
    pub final_chunks_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryMetadata {
    pub query_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<KeywordsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_info: Option<ProcessingInfo>,
    /// The assembled engine prompt, only set for prompt-only queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QueryMetadata>,
}

impl QueryResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            answer: None,
            data: None,
            metadata: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
