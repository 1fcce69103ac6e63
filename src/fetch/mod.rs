// src/fetch/mod.rs
pub mod client;
pub mod encoding;

pub use client::{extract_from_url, fetch_document, FetchOptions, DEFAULT_TIMEOUT_SECS};
pub use encoding::decode_document;
