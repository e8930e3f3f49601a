use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::utils::ingest_limits::validate_upload;
use ingestion_pipeline::UploadedFile;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct IndexFileParams {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
}

#[derive(Debug, TryFromMultipart)]
pub struct IndexBatchParams {
    #[form_data(limit = "unlimited")]
    #[form_data(default)]
    pub files: Vec<FieldData<Bytes>>,
}

#[derive(Debug, Deserialize)]
pub struct IndexFolderRequest {
    pub folder_path: String,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub file_extensions: Option<Vec<String>>,
}

fn default_recursive() -> bool {
    true
}

fn into_uploaded(field: FieldData<Bytes>) -> Result<UploadedFile, ApiError> {
    let name = field
        .metadata
        .file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("Uploaded file has no file name".to_string()))?;

    Ok(UploadedFile::new(name, field.contents))
}

pub async fn index_file(
    State(state): State<ApiState>,
    TypedMultipart(input): TypedMultipart<IndexFileParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file = into_uploaded(input.file)?;
    validate_upload(&state.config, [(file.name.as_str(), file.bytes.len())])?;

    let file_name = file.name.clone();
    info!(file = %file_name, bytes = file.bytes.len(), "Received file for indexing");

    let handle = state.orchestrator.index_single(file)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "File indexing started in background",
            "job_id": handle.job_id(),
            "file_name": file_name,
        })),
    ))
}

pub async fn index_folder(
    State(state): State<ApiState>,
    payload: Result<Json<IndexFolderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::ValidationError(e.body_text()))?;
    let extensions = request.file_extensions.unwrap_or_default();

    info!(
        folder = %request.folder_path,
        recursive = request.recursive,
        extensions = ?extensions,
        "Received folder for indexing"
    );

    let handle = state
        .orchestrator
        .index_folder(&request.folder_path, request.recursive, &extensions)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "Folder indexing started in background",
            "job_id": handle.job_id(),
            "folder_path": request.folder_path,
        })),
    ))
}

pub async fn index_batch(
    State(state): State<ApiState>,
    TypedMultipart(input): TypedMultipart<IndexBatchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let files = input
        .files
        .into_iter()
        .map(into_uploaded)
        .collect::<Result<Vec<_>, _>>()?;

    validate_upload(
        &state.config,
        files.iter().map(|file| (file.name.as_str(), file.bytes.len())),
    )?;

    let file_names: Vec<String> = files.iter().map(|file| file.name.clone()).collect();
    info!(file_count = file_names.len(), "Received batch for indexing");

    let handle = state.orchestrator.index_batch(files)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "Batch indexing started in background",
            "job_id": handle.job_id(),
            "file_count": file_names.len(),
            "file_names": file_names,
        })),
    ))
}
