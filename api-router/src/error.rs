use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{error::AppError, utils::ingest_limits::IngestValidationError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad gateway: {message}")]
    Gateway { status: u16, message: String },
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::InvalidMode(mode) => Self::ValidationError(format!(
                "Invalid query mode '{mode}'. Expected one of: local, global, hybrid, mix, naive, bypass"
            )),
            AppError::Gateway { status, message } => {
                tracing::warn!(?status, %message, "downstream request failed");
                Self::Gateway {
                    status: status.unwrap_or(502),
                    message,
                }
            }
            AppError::Engine(_) => {
                tracing::error!("Retrieval engine error: {:?}", err);
                Self::InternalError("Retrieval engine request failed".to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl From<IngestValidationError> for ApiError {
    fn from(err: IngestValidationError) -> Self {
        match err {
            IngestValidationError::PayloadTooLarge(msg) => Self::PayloadTooLarge(msg),
            IngestValidationError::BadRequest(msg) => Self::ValidationError(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message),
            Self::Gateway { status, message } => (relayed_status(status), message),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                status: "error".to_string(),
            }),
        )
            .into_response()
    }
}

/// Downstream error statuses are relayed; anything else is reported as 502.
fn relayed_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|status| status.is_client_error() || status.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let not_found = AppError::NotFound("folder not found".to_string());
        let api_error = ApiError::from(not_found);
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "folder not found"));

        let validation = AppError::Validation("invalid input".to_string());
        let api_error = ApiError::from(validation);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "invalid input"));

        let mode = AppError::InvalidMode("telepathic".to_string());
        let api_error = ApiError::from(mode);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg.contains("telepathic")));

        let internal_error = AppError::Io(std::io::Error::other("io error"));
        let api_error = ApiError::from(internal_error);
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn gateway_errors_relay_downstream_status() {
        let relayed = ApiError::from(AppError::Gateway {
            status: Some(503),
            message: "busy".to_string(),
        });
        assert_status_code(relayed, StatusCode::SERVICE_UNAVAILABLE);

        let unreachable = ApiError::from(AppError::Gateway {
            status: None,
            message: "connection refused".to_string(),
        });
        assert_status_code(unreachable, StatusCode::BAD_GATEWAY);

        let bogus = ApiError::Gateway {
            status: 200,
            message: "not an error".to_string(),
        };
        assert_status_code(bogus, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn engine_errors_are_sanitized() {
        let api_error = ApiError::from(AppError::Engine("token sk-secret rejected".to_string()));

        assert!(
            matches!(&api_error, ApiError::InternalError(msg) if !msg.contains("sk-secret"))
        );
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ingest_validation_errors_map_to_client_statuses() {
        assert_status_code(
            ApiError::from(IngestValidationError::PayloadTooLarge("big".into())),
            StatusCode::PAYLOAD_TOO_LARGE,
        );
        assert_status_code(
            ApiError::from(IngestValidationError::BadRequest("bad".into())),
            StatusCode::BAD_REQUEST,
        );
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(
            ApiError::InternalError("server error".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(ApiError::NotFound("not found".to_string()), StatusCode::NOT_FOUND);
        assert_status_code(
            ApiError::ValidationError("invalid input".to_string()),
            StatusCode::BAD_REQUEST,
        );
        assert_status_code(
            ApiError::PayloadTooLarge("too big".to_string()),
            StatusCode::PAYLOAD_TOO_LARGE,
        );
    }

    #[test]
    fn test_internal_error_sanitization() {
        let api_error = ApiError::InternalError("db password incorrect".to_string());

        assert_eq!(api_error.to_string(), "Internal server error");
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
