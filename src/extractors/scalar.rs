// src/extractors/scalar.rs
use crate::filters::FilterChain;
use crate::matchers::Matcher;
use crate::rules::{describe, RuleNode};
use crate::utils::error::{ConfigError, ParseError};
use crate::value::Value;

use super::{compile_child, descend, Extractor};

/// The prefix/suffix pair that delimits a region.
#[derive(Debug, Clone)]
pub struct Bounds {
    prefix: Matcher,
    suffix: Matcher,
}

impl Bounds {
    pub fn compile(node: &RuleNode) -> Result<Self, ConfigError> {
        let prefix = node
            .prefix
            .as_deref()
            .ok_or(ConfigError::MissingPattern("prefix"))?;
        let suffix = node
            .suffix
            .as_deref()
            .ok_or(ConfigError::MissingPattern("suffix"))?;
        Ok(Self {
            prefix: Matcher::compile(prefix)?,
            suffix: Matcher::compile(suffix)?,
        })
    }

    /// Text strictly between the first prefix at or after `start` and the
    /// first suffix after it, plus the offset where the suffix ends.
    ///
    /// Finding the prefix but not the suffix is a plain miss.
    pub fn search<'t>(&self, text: &'t str, start: usize) -> Option<(&'t str, usize)> {
        let prefix = self.prefix.find(text, start)?;
        let suffix = self.suffix.find(text, prefix.end)?;
        tracing::trace!(
            "Matched prefix at {}..{}, suffix at {}..{}",
            prefix.start,
            prefix.end,
            suffix.start,
            suffix.end
        );
        Some((&text[prefix.end..suffix.start], suffix.end))
    }
}

/// Extracts a single value.
#[derive(Debug, Clone)]
pub struct ScalarExtractor {
    pub(crate) rule: String,
    bounds: Bounds,
    filters: FilterChain,
    child: Option<Box<Extractor>>,
}

impl ScalarExtractor {
    pub fn compile(node: &RuleNode) -> Result<Self, ConfigError> {
        Ok(Self {
            rule: describe(node),
            bounds: Bounds::compile(node)?,
            filters: FilterChain::compile(node)?,
            child: compile_child(node)?,
        })
    }

    /// Searches from `start` and returns the processed value together with
    /// the cursor for the next search.
    ///
    /// On a miss the value is whatever the filters make of null (usually
    /// null) and the cursor stays at `start`.
    pub fn extract_at(&self, text: &str, start: usize) -> Result<(Value, usize), ParseError> {
        let (raw, end) = match self.bounds.search(text, start) {
            Some((captured, end)) => (Value::from(captured), end),
            None => (Value::Null, start),
        };
        let value = self.filters.apply(raw)?;
        let value = descend(self.child.as_deref(), value)?;
        Ok((value, end))
    }

    pub(crate) fn extract_value(&self, text: &str) -> Result<Value, ParseError> {
        self.extract_at(text, 0).map(|(value, _)| value)
    }
}
