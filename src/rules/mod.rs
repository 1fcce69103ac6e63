// src/rules/mod.rs
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::utils::error::ConfigError;

/// Keys that select an extractor kind, in the order a child is looked up.
pub const KIND_KEYS: [&str; 3] = ["value", "list", "dict"];

/// One node of a rule tree: how to find a region and what to do with it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    /// Shorthand for a trailing coercion filter, e.g. `int` or `date:%d/%m/%Y`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Shorthand for a leading `default(...)` filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<YamlValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<RuleNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Box<RuleNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dict: Option<Vec<FieldNode>>,
}

/// A record field: a scalar rule plus the output key.
#[derive(Debug, Clone, Serialize)]
pub struct FieldNode {
    pub key: String,

    #[serde(flatten)]
    pub rule: RuleNode,
}

// `#[serde(flatten)]` would let misspelled keys through, so the `key` entry
// is split off by hand and the rest must be a valid `RuleNode`.
impl<'de> Deserialize<'de> for FieldNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut entries = Mapping::deserialize(deserializer)?;
        let key = match entries.remove("key") {
            Some(YamlValue::String(key)) => key,
            Some(YamlValue::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "field `key` must be a string, found {:?}",
                    other
                )))
            }
            None => return Err(D::Error::missing_field("key")),
        };
        let rule = serde_yaml::from_value(YamlValue::Mapping(entries)).map_err(D::Error::custom)?;
        Ok(Self { key, rule })
    }
}

/// `int`, `default(0)`, or `{date: ['%d/%m/%Y']}` / `{strip: {chars: '"'}}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Name(String),
    WithArgs(Mapping),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for RuleFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(RuleFormat::Yaml),
            "json" => Ok(RuleFormat::Json),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for RuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleFormat::Yaml => f.write_str("yaml"),
            RuleFormat::Json => f.write_str("json"),
        }
    }
}

/// Decodes rule text into the generic rule tree.
pub fn parse_rule(text: &str, format: RuleFormat) -> Result<YamlValue, ConfigError> {
    let rule: YamlValue = match format {
        RuleFormat::Yaml => serde_yaml::from_str(text)?,
        RuleFormat::Json => serde_json::from_str(text)?,
    };
    tracing::trace!("Parsed {} rule: {:?}", format, rule);
    Ok(rule)
}

/// Renders a rule for diagnostics.
pub(crate) fn describe<T: Serialize + fmt::Debug + ?Sized>(rule: &T) -> String {
    serde_yaml::to_string(rule).unwrap_or_else(|_| format!("{:?}", rule))
}
