use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::error::AppError;
use serde::{Deserialize, Serialize};

use crate::query::{ContentDescriptor, ConversationTurn, EngineQuery, QueryMode};

/// Query payload accepted at the HTTP edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub multimodal_content: Vec<ContentBlock>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_top_k")]
    pub chunk_top_k: usize,
    #[serde(default = "default_true")]
    pub enable_rerank: bool,
    #[serde(default = "default_true")]
    pub include_references: bool,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default)]
    pub only_need_context: Option<bool>,
    #[serde(default)]
    pub only_need_prompt: Option<bool>,
}

fn default_top_k() -> usize {
    40
}

fn default_chunk_top_k() -> usize {
    20
}

fn default_true() -> bool {
    true
}

impl QueryRequest {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: None,
            multimodal_content: Vec::new(),
            top_k: default_top_k(),
            chunk_top_k: default_chunk_top_k(),
            enable_rerank: true,
            include_references: true,
            conversation_history: Vec::new(),
            only_need_context: None,
            only_need_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Image {
        #[serde(default)]
        img_path: Option<String>,
        #[serde(default)]
        image_data: Option<String>,
        #[serde(default, alias = "image_caption")]
        caption: Option<String>,
    },
    Table {
        #[serde(default)]
        table_data: String,
        #[serde(default, alias = "table_caption")]
        caption: Option<String>,
    },
    Equation {
        #[serde(default)]
        latex: String,
        #[serde(default, alias = "equation_caption")]
        caption: Option<String>,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn describe_block(index: usize, block: ContentBlock) -> Result<ContentDescriptor, AppError> {
    match block {
        ContentBlock::Image {
            img_path,
            image_data,
            caption,
        } => {
            let img_path = non_blank(img_path);
            let image_data = non_blank(image_data);
            if img_path.is_none() && image_data.is_none() {
                return Err(AppError::Validation(format!(
                    "Content block {index}: image requires img_path or image_data"
                )));
            }
            if let Some(data) = &image_data {
                STANDARD.decode(data.trim()).map_err(|e| {
                    AppError::Validation(format!(
                        "Content block {index}: image_data is not valid base64: {e}"
                    ))
                })?;
            }
            Ok(ContentDescriptor::Image {
                img_path,
                image_data,
                image_caption: non_blank(caption),
            })
        }
        ContentBlock::Table {
            table_data,
            caption,
        } => {
            if table_data.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "Content block {index}: table_data must not be empty"
                )));
            }
            Ok(ContentDescriptor::Table {
                table_data,
                table_caption: non_blank(caption),
            })
        }
        ContentBlock::Equation { latex, caption } => {
            if latex.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "Content block {index}: latex must not be empty"
                )));
            }
            Ok(ContentDescriptor::Equation {
                latex,
                equation_caption: non_blank(caption),
            })
        }
    }
}

/// Validates a request and converts it into the engine's query contract.
///
/// The mode is checked first, so an unknown mode is always reported as
/// [`AppError::InvalidMode`] regardless of other problems in the request.
pub fn normalize(request: QueryRequest) -> Result<EngineQuery, AppError> {
    let mode = match request.mode.as_deref().map(str::trim) {
        None | Some("") => QueryMode::default(),
        Some(raw) => raw.parse()?,
    };

    let text = request.query.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Query must not be empty".into()));
    }

    let (only_need_context, only_need_prompt) =
        match (request.only_need_context, request.only_need_prompt) {
            (Some(true), Some(true)) => {
                return Err(AppError::Validation(
                    "only_need_context and only_need_prompt cannot both be true".into(),
                ))
            }
            (context, Some(true)) => (context.unwrap_or(false), true),
            (context, _) => (context.unwrap_or(true), false),
        };

    let content = request
        .multimodal_content
        .into_iter()
        .enumerate()
        .map(|(index, block)| describe_block(index, block))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EngineQuery {
        text: text.to_string(),
        mode,
        content,
        top_k: request.top_k,
        chunk_top_k: request.chunk_top_k,
        enable_rerank: request.enable_rerank,
        include_references: request.include_references,
        only_need_context,
        only_need_prompt,
        conversation_history: request.conversation_history,
    })
}
