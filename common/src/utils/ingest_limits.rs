use std::path::{Component, Path};

use super::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

/// Checks an upload (one or more named files) against the configured ingest limits.
pub fn validate_upload<'a, I>(config: &AppConfig, files: I) -> Result<(), IngestValidationError>
where
    I: IntoIterator<Item = (&'a str, usize)>,
{
    let mut file_count: usize = 0;

    for (name, size) in files {
        file_count = file_count.saturating_add(1);

        if !is_plain_file_name(name) {
            return Err(IngestValidationError::BadRequest(format!(
                "Invalid file name '{name}'"
            )));
        }

        if size > config.ingest_max_file_bytes {
            return Err(IngestValidationError::PayloadTooLarge(format!(
                "File '{name}' is too large. Maximum allowed is {} bytes",
                config.ingest_max_file_bytes
            )));
        }
    }

    if file_count == 0 {
        return Err(IngestValidationError::BadRequest(
            "No files provided for indexing".to_string(),
        ));
    }

    if file_count > config.ingest_max_files {
        return Err(IngestValidationError::BadRequest(format!(
            "Too many files. Maximum allowed is {}",
            config.ingest_max_files
        )));
    }

    Ok(())
}

/// A file name is accepted only if it is a single normal path component.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return false;
    }

    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
