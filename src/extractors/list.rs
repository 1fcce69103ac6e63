// src/extractors/list.rs
use crate::filters::FilterChain;
use crate::rules::{describe, RuleNode};
use crate::utils::error::{ConfigError, ParseError};
use crate::value::Value;

use super::scalar::Bounds;
use super::{compile_child, descend, Extractor};

/// Extracts every successive match, in document order.
#[derive(Debug, Clone)]
pub struct ListExtractor {
    pub(crate) rule: String,
    bounds: Bounds,
    filters: FilterChain,
    child: Option<Box<Extractor>>,
}

impl ListExtractor {
    pub fn compile(node: &RuleNode) -> Result<Self, ConfigError> {
        Ok(Self {
            rule: describe(node),
            bounds: Bounds::compile(node)?,
            filters: FilterChain::compile(node)?,
            child: compile_child(node)?,
        })
    }

    /// Each search resumes where the previous suffix ended. The first miss
    /// ends the list, and so does a match that would not move the cursor.
    pub fn extract_items(&self, text: &str) -> Result<Vec<Value>, ParseError> {
        let mut items = Vec::new();
        let mut cursor = 0;
        while let Some((captured, end)) = self.bounds.search(text, cursor) {
            if end <= cursor {
                tracing::debug!("List match at {} does not advance, stopping", cursor);
                break;
            }
            let value = self.filters.apply(Value::from(captured))?;
            items.push(descend(self.child.as_deref(), value)?);
            cursor = end;
        }
        tracing::trace!("List extracted {} item(s)", items.len());
        Ok(items)
    }
}
