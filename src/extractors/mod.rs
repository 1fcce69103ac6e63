// src/extractors/mod.rs
pub mod list;
pub mod record;
pub mod scalar;

use std::fmt;
use std::str::FromStr;

use serde_yaml::Value as YamlValue;

use crate::rules::{FieldNode, RuleNode, KIND_KEYS};
use crate::utils::error::{ConfigError, ExtractError, ParseError};
use crate::value::Value;

pub use list::ListExtractor;
pub use record::RecordExtractor;
pub use scalar::{Bounds, ScalarExtractor};

// Longer documents are cut to this many characters in error reports.
const PREVIEW_CHARS: usize = 100;

/// The rule keys `value`, `list` and `dict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Value,
    List,
    Dict,
}

impl FromStr for ExtractorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(ExtractorKind::Value),
            "list" => Ok(ExtractorKind::List),
            "dict" => Ok(ExtractorKind::Dict),
            _ => Err(ConfigError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractorKind::Value => "value",
            ExtractorKind::List => "list",
            ExtractorKind::Dict => "dict",
        })
    }
}

/// A compiled rule. Immutable, so one instance can serve any number of
/// documents, from any number of threads.
#[derive(Debug, Clone)]
pub enum Extractor {
    Scalar(ScalarExtractor),
    List(ListExtractor),
    Record(RecordExtractor),
}

impl Extractor {
    /// Compiles a rule tree whose single root key selects the kind:
    /// `{value: {...}}`, `{list: {...}}` or `{dict: [...]}`.
    pub fn compile_root(rule: &YamlValue) -> Result<Self, ConfigError> {
        let mapping = match rule {
            YamlValue::Mapping(mapping) => mapping,
            other => return Err(ConfigError::InvalidRoot(format!("{:?}", other))),
        };
        let mut entries = mapping.iter();
        let (kind, body) = match (entries.next(), entries.next()) {
            (Some((YamlValue::String(kind), body)), None) => (kind.parse::<ExtractorKind>()?, body),
            _ => {
                let keys = mapping
                    .keys()
                    .map(|k| format!("{:?}", k))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ConfigError::InvalidRoot(format!("[{}]", keys)));
            }
        };
        Self::compile(kind, body)
    }

    /// Compiles the body of a rule for an already known kind.
    pub fn compile(kind: ExtractorKind, body: &YamlValue) -> Result<Self, ConfigError> {
        tracing::debug!("Compiling {} extractor", kind);
        match kind {
            ExtractorKind::Value => {
                let node: RuleNode = serde_yaml::from_value(body.clone())?;
                Ok(Extractor::Scalar(ScalarExtractor::compile(&node)?))
            }
            ExtractorKind::List => {
                let node: RuleNode = serde_yaml::from_value(body.clone())?;
                Ok(Extractor::List(ListExtractor::compile(&node)?))
            }
            ExtractorKind::Dict => {
                let fields: Vec<FieldNode> = serde_yaml::from_value(body.clone())?;
                Ok(Extractor::Record(RecordExtractor::compile(&fields)?))
            }
        }
    }

    pub fn kind(&self) -> ExtractorKind {
        match self {
            Extractor::Scalar(_) => ExtractorKind::Value,
            Extractor::List(_) => ExtractorKind::List,
            Extractor::Record(_) => ExtractorKind::Dict,
        }
    }

    /// The rule this extractor was compiled from, rendered as YAML.
    pub fn rule(&self) -> &str {
        match self {
            Extractor::Scalar(e) => &e.rule,
            Extractor::List(e) => &e.rule,
            Extractor::Record(e) => &e.rule,
        }
    }

    /// Runs the extractor over a whole document.
    pub fn extract(&self, text: &str) -> Result<Value, ExtractError> {
        self.extract_value(text).map_err(|source| {
            let err = ExtractError {
                rule: self.rule().to_string(),
                preview: preview(text),
                source,
            };
            tracing::warn!("{}\nCause: {}", err, err.source);
            err
        })
    }

    pub(crate) fn extract_value(&self, text: &str) -> Result<Value, ParseError> {
        match self {
            Extractor::Scalar(e) => e.extract_value(text),
            Extractor::List(e) => e.extract_items(text).map(Value::List),
            Extractor::Record(e) => e.extract_value(text),
        }
    }
}

/// Compiles the nested extractor of a node, if it has one. When several
/// kinds are present the first of `value`, `list`, `dict` wins.
pub(crate) fn compile_child(node: &RuleNode) -> Result<Option<Box<Extractor>>, ConfigError> {
    debug_assert_eq!(KIND_KEYS, ["value", "list", "dict"]);
    let child = if let Some(value) = &node.value {
        Extractor::Scalar(ScalarExtractor::compile(value)?)
    } else if let Some(list) = &node.list {
        Extractor::List(ListExtractor::compile(list)?)
    } else if let Some(fields) = &node.dict {
        Extractor::Record(RecordExtractor::compile(fields)?)
    } else {
        return Ok(None);
    };
    Ok(Some(Box::new(child)))
}

/// Feeds a filtered value to the child extractor. Null skips the child.
pub(crate) fn descend(child: Option<&Extractor>, value: Value) -> Result<Value, ParseError> {
    match (child, value) {
        (None, value) | (Some(_), value @ Value::Null) => Ok(value),
        (Some(child), Value::Str(text)) => child.extract_value(&text),
        (Some(_), other) => Err(ParseError::Unsupported {
            operation: "nested extraction",
            found: other.type_name(),
        }),
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{} ...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> YamlValue {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_compile_root_selects_kind() {
        let e = Extractor::compile_root(&yaml("value: {prefix: <body>, suffix: </body>}")).unwrap();
        assert_eq!(e.kind(), ExtractorKind::Value);
        let e = Extractor::compile_root(&yaml("list: {prefix: <li>, suffix: </li>}")).unwrap();
        assert_eq!(e.kind(), ExtractorKind::List);
        let e = Extractor::compile_root(&yaml("dict: [{key: a, prefix: x, suffix: y}]")).unwrap();
        assert_eq!(e.kind(), ExtractorKind::Dict);
    }

    #[test]
    fn test_root_must_have_exactly_one_key() {
        let two = yaml("value: {prefix: a, suffix: b}\nlist: {prefix: a, suffix: b}\n");
        assert!(matches!(Extractor::compile_root(&two), Err(ConfigError::InvalidRoot(_))));
        assert!(matches!(Extractor::compile_root(&yaml("{}")), Err(ConfigError::InvalidRoot(_))));
        assert!(matches!(Extractor::compile_root(&YamlValue::Null), Err(ConfigError::InvalidRoot(_))));
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            Extractor::compile_root(&yaml("table: {prefix: a, suffix: b}")),
            Err(ConfigError::UnknownKind(k)) if k == "table"
        ));
        assert!("tuple".parse::<ExtractorKind>().is_err());
    }

    #[test]
    fn test_child_priority() {
        let node: RuleNode = serde_yaml::from_str(
            "{prefix: a, suffix: b, list: {prefix: c, suffix: d}, value: {prefix: e, suffix: f}}",
        )
        .unwrap();
        let child = compile_child(&node).unwrap().unwrap();
        assert_eq!(child.kind(), ExtractorKind::Value);

        let node: RuleNode = serde_yaml::from_str("{prefix: a, suffix: b}").unwrap();
        assert!(compile_child(&node).unwrap().is_none());
    }

    #[test]
    fn test_descend_requires_text() {
        let child = Extractor::compile_root(&yaml("value: {prefix: a, suffix: b}")).unwrap();
        assert_eq!(descend(Some(&child), Value::from("xaYbz")).unwrap(), Value::from("Y"));
        assert_eq!(descend(Some(&child), Value::Null).unwrap(), Value::Null);
        assert!(descend(Some(&child), Value::Int(1)).is_err());
        assert_eq!(descend(None, Value::Int(1)).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_extract_error_carries_rule_and_preview() {
        let e = Extractor::compile_root(&yaml("value: {prefix: <html>, suffix: </html>, filters: [int]}")).unwrap();
        let text = format!("<html>{}</html>", "x".repeat(200));
        let err = e.extract(&text).unwrap_err();
        assert!(err.rule.contains("prefix: <html>"));
        assert!(err.preview.ends_with(" ..."));
        assert_eq!(err.preview.chars().count(), PREVIEW_CHARS + 4);
        assert!(matches!(err.source, ParseError::Number { target: "int", .. }));
    }

    #[test]
    fn test_preview_short_text_kept_whole() {
        assert_eq!(preview("<html>...</html>"), "<html>...</html>");
        let exactly = "é".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exactly), exactly);
    }

    #[test]
    fn test_extractor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Extractor>();
    }
}
