// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::utils::error::StorageError;
use crate::value::Value;

/// An extraction result together with where and when it was produced.
#[derive(Debug, Serialize)]
pub struct ResultEnvelope<'a> {
    pub source: &'a str,
    pub extracted_at: String,
    pub result: &'a Value,
}

impl<'a> ResultEnvelope<'a> {
    pub fn new(source: &'a str, result: &'a Value) -> Self {
        Self {
            source,
            extracted_at: chrono::Utc::now().to_rfc3339(),
            result,
        }
    }
}

/// Pretty JSON for a bare result.
pub fn render_json(result: &Value) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Pretty JSON for a result wrapped with its source and a timestamp.
pub fn render_json_with_metadata(source: &str, result: &Value) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(&ResultEnvelope::new(source, result))?)
}

/// Writes rendered output to a file, creating parent directories as needed.
pub fn save_result<P: AsRef<Path>>(path: P, rendered: &str) -> Result<PathBuf, StorageError> {
    let file_path = path.as_ref().to_path_buf();

    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(&file_path, rendered)?;
    tracing::info!("Saved result to {}", file_path.display());

    Ok(file_path)
}
