// src/matchers/mod.rs
use regex::Regex;

use crate::utils::error::ConfigError;

/// One occurrence of a pattern. Offsets are byte positions in the full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'t> {
    pub matched: &'t str,
    pub start: usize,
    pub end: usize,
}

/// Locates a prefix or suffix pattern in text.
#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    /// Builds a matcher from a pattern spec:
    /// `//text//` is literal text, `/re/` is a regular expression,
    /// anything else is literal text as written.
    pub fn compile(spec: &str) -> Result<Self, ConfigError> {
        if spec.len() >= 4 && spec.starts_with("//") && spec.ends_with("//") {
            return Ok(Matcher::Literal(spec[2..spec.len() - 2].to_string()));
        }
        if spec.len() >= 2 && spec.starts_with('/') && spec.ends_with('/') {
            let pattern = &spec[1..spec.len() - 1];
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            return Ok(Matcher::Regex(regex));
        }
        Ok(Matcher::Literal(spec.to_string()))
    }

    /// Finds the first occurrence at or after `start`.
    ///
    /// A regex only sees `text[start..]`, so `^` anchors at `start`.
    pub fn find<'t>(&self, text: &'t str, start: usize) -> Option<Match<'t>> {
        let haystack = text.get(start..)?;
        let (offset, len) = match self {
            Matcher::Literal(literal) => (haystack.find(literal.as_str())?, literal.len()),
            Matcher::Regex(regex) => {
                let found = regex.find(haystack)?;
                (found.start(), found.len())
            }
        };
        let start = start + offset;
        let end = start + len;
        Some(Match {
            matched: &text[start..end],
            start,
            end,
        })
    }
}
