use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use retrieval_pipeline::{answer_query, QueryRequest, QueryResult};

use crate::{api_state::ApiState, error::ApiError};

pub async fn query(
    State(state): State<ApiState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::ValidationError(e.body_text()))?;
    let result = answer_query(state.engine.as_ref(), request).await?;

    Ok(Json(result))
}
