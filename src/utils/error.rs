// src/utils/error.rs
use thiserror::Error;

/// Problems with a rule, reported while it is being compiled.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Rule should have one single root element among value/list/dict, found: {0}")]
    InvalidRoot(String),

    #[error("Extractor with type \"{0}\" could not be found")]
    UnknownKind(String),

    #[error("Rule is missing the required `{0}` pattern")]
    MissingPattern(&'static str),

    #[error("Invalid regular expression /{pattern}/: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown filter \"{0}\"")]
    UnknownFilter(String),

    #[error("Invalid arguments for filter \"{name}\": {reason}")]
    InvalidFilter { name: String, reason: String },

    #[error("Unknown type \"{0}\"")]
    UnknownType(String),

    #[error("Invalid expression {expression:?}: {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Unknown rule format \"{0}\"")]
    UnknownFormat(String),

    #[error("Malformed rule: {0}")]
    Yaml(#[from] serde_yaml::Error), // Rule tree did not match the expected shape

    #[error("Malformed JSON rule: {0}")]
    Json(#[from] serde_json::Error),
}

/// A filter could not transform the captured value.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse {input:?} as {target}")]
    Number { target: &'static str, input: String },

    #[error("Cannot parse {input:?} with format {format:?}: {source}")]
    Date {
        input: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("`{operation}` cannot be applied to a {found} value")]
    Unsupported {
        operation: &'static str,
        found: &'static str,
    },

    #[error("Expression {expression:?} failed: {reason}")]
    Eval { expression: String, reason: String },
}

/// The only error returned by `Extractor::extract`.
///
/// Keeps the rule and a short preview of the text; the rest of the document
/// is dropped.
#[derive(Error, Debug)]
#[error("Failed to extract.\nRule:\n{rule}\nText:\n{preview}")]
pub struct ExtractError {
    pub rule: String,
    pub preview: String,
    #[source]
    pub source: ParseError,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 403 Forbidden, 500

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Fetching document failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
