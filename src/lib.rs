// src/lib.rs
//! Extracts values, lists and records from text or HTML with declarative
//! prefix/suffix rules.
//!
//! A rule is a small tree, usually written in YAML:
//!
//! ```
//! let rule = "
//! list:
//!   prefix: <li>
//!   suffix: </li>
//!   type: int
//! ";
//! let result = textminer::extract_str("<ul><li>1</li><li>2,000</li></ul>", rule, Default::default()).unwrap();
//! assert_eq!(result, textminer::Value::List(vec![textminer::Value::Int(1), textminer::Value::Int(2000)]));
//! ```
//!
//! Rules are compiled once into an [`Extractor`] and can then be run over any
//! number of documents.

pub mod extractors;
pub mod fetch;
pub mod filters;
pub mod matchers;
pub mod rules;
pub mod storage;
pub mod utils;
pub mod value;

use serde_yaml::Value as YamlValue;

pub use extractors::{Extractor, ExtractorKind};
pub use fetch::{extract_from_url, fetch_document, FetchOptions};
pub use filters::{Filter, FilterChain};
pub use rules::{parse_rule, RuleFormat};
pub use utils::error::{AppError, ConfigError, ExtractError, FetchError, ParseError};
pub use utils::html::{compact_html, strip_tags};
pub use value::{Record, Value};

/// Compiles a rule tree into a reusable extractor.
pub fn compile(rule: &YamlValue) -> Result<Extractor, ConfigError> {
    Extractor::compile_root(rule)
}

/// Compiles rule text in the given format.
pub fn compile_str(rule_text: &str, format: RuleFormat) -> Result<Extractor, ConfigError> {
    compile(&parse_rule(rule_text, format)?)
}

/// Compiles `rule` and runs it over `text`.
pub fn extract(text: &str, rule: &YamlValue) -> Result<Value, AppError> {
    Ok(compile(rule)?.extract(text)?)
}

/// Decodes and compiles `rule_text`, then runs it over `text`.
pub fn extract_str(text: &str, rule_text: &str, format: RuleFormat) -> Result<Value, AppError> {
    Ok(compile_str(rule_text, format)?.extract(text)?)
}
