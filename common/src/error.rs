use thiserror::Error;
use tokio::task::JoinError;

use crate::backends::ConfigError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("Invalid query mode: {0}")]
    InvalidMode(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Staging error: {0}")]
    Staging(String),
    #[error("Retrieval engine error: {0}")]
    Engine(String),
    #[error("Gateway error: {message}")]
    Gateway {
        status: Option<u16>,
        message: String,
    },
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Errors caused by the caller's input rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidMode(_) | AppError::Validation(_) | AppError::NotFound(_)
        )
    }
}
