use std::fmt;

use common::error::AppError;
use serde::{Deserialize, Serialize};

/// Retrieval strategy understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Local,
    Global,
    Hybrid,
    Mix,
    #[default]
    Naive,
    /// Skips retrieval and sends the query straight to the LLM.
    Bypass,
}

impl QueryMode {
    pub const ALL: [QueryMode; 6] = [
        QueryMode::Local,
        QueryMode::Global,
        QueryMode::Hybrid,
        QueryMode::Mix,
        QueryMode::Naive,
        QueryMode::Bypass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::Local => "local",
            QueryMode::Global => "global",
            QueryMode::Hybrid => "hybrid",
            QueryMode::Mix => "mix",
            QueryMode::Naive => "naive",
            QueryMode::Bypass => "bypass",
        }
    }
}

impl std::str::FromStr for QueryMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| {
                AppError::InvalidMode(format!(
                    "'{value}' is not one of local, global, hybrid, mix, naive, bypass"
                ))
            })
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// One multimodal item attached to a query, in the engine's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentDescriptor {
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        img_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_data: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_caption: Option<String>,
    },
    Table {
        table_data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        table_caption: Option<String>,
    },
    Equation {
        latex: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        equation_caption: Option<String>,
    },
}

/// A validated query, ready for [`crate::RetrievalEngine::query`].
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct EngineQuery {
    pub text: String,
    pub mode: QueryMode,
    pub content: Vec<ContentDescriptor>,
    pub top_k: usize,
    pub chunk_top_k: usize,
    pub enable_rerank: bool,
    pub include_references: bool,
    pub only_need_context: bool,
    pub only_need_prompt: bool,
    pub conversation_history: Vec<ConversationTurn>,
}

impl EngineQuery {
    pub fn is_multimodal(&self) -> bool {
        !self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("HYBRID".parse::<QueryMode>().unwrap(), QueryMode::Hybrid);
        assert_eq!(" mix ".parse::<QueryMode>().unwrap(), QueryMode::Mix);
        for mode in QueryMode::ALL {
            assert_eq!(mode.to_string().parse::<QueryMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_invalid_mode_error() {
        let err = "semantic".parse::<QueryMode>().unwrap_err();
        assert!(matches!(err, AppError::InvalidMode(msg) if msg.contains("semantic")));
    }

    #[test]
    fn descriptors_use_engine_field_names() {
        let table = ContentDescriptor::Table {
            table_data: "a,b\n1,2".into(),
            table_caption: Some("scores".into()),
        };
        let image = ContentDescriptor::Image {
            img_path: Some("/tmp/x.png".into()),
            image_data: None,
            image_caption: None,
        };

        assert_eq!(
            serde_json::to_value(&table).unwrap(),
            serde_json::json!({"type": "table", "table_data": "a,b\n1,2", "table_caption": "scores"})
        );
        assert_eq!(
            serde_json::to_value(&image).unwrap(),
            serde_json::json!({"type": "image", "img_path": "/tmp/x.png"})
        );
    }
}
