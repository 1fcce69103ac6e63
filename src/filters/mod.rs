// src/filters/mod.rs
pub mod expr;

use std::collections::VecDeque;

use chrono::format::ParseErrorKind;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::rules::{FilterSpec, RuleNode};
use crate::utils::error::{ConfigError, ParseError};
use crate::utils::html::strip_tags;
use crate::value::Value;

pub use expr::Expression;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single value transform.
///
/// Every filter except `Default` passes null through untouched.
#[derive(Debug, Clone)]
pub enum Filter {
    Default(Value),
    Bool,
    Date(String),
    DateTime(String),
    Float,
    Int,
    Strip(Option<String>),
    StripHtml,
    Eval(Expression),
    String,
}

type Constructor = fn(&mut FilterArgs) -> Result<Filter, ConfigError>;

// Every filter a rule may name. Lookup happens while compiling, so a typo
// fails before any document is touched.
static FILTERS: &[(&str, Constructor)] = &[
    ("default", build_default),
    ("bool", build_bool),
    ("date", build_date),
    ("datetime", build_datetime),
    ("eval", build_eval),
    ("float", build_float),
    ("int", build_int),
    ("strip", build_strip),
    ("strip_html", build_strip_html),
    ("string", build_string),
];

fn build_bool(_: &mut FilterArgs) -> Result<Filter, ConfigError> {
    Ok(Filter::Bool)
}

fn build_float(_: &mut FilterArgs) -> Result<Filter, ConfigError> {
    Ok(Filter::Float)
}

fn build_int(_: &mut FilterArgs) -> Result<Filter, ConfigError> {
    Ok(Filter::Int)
}

fn build_strip_html(_: &mut FilterArgs) -> Result<Filter, ConfigError> {
    Ok(Filter::StripHtml)
}

fn build_string(_: &mut FilterArgs) -> Result<Filter, ConfigError> {
    Ok(Filter::String)
}

fn build_default(args: &mut FilterArgs) -> Result<Filter, ConfigError> {
    let default_value = args.required("default_value")?;
    Ok(Filter::Default(Value::from(&default_value)))
}

fn build_date(args: &mut FilterArgs) -> Result<Filter, ConfigError> {
    let format = args.optional_string("format")?;
    Ok(Filter::Date(format.unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string())))
}

fn build_datetime(args: &mut FilterArgs) -> Result<Filter, ConfigError> {
    let format = args.optional_string("format")?;
    Ok(Filter::DateTime(format.unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string())))
}

fn build_eval(args: &mut FilterArgs) -> Result<Filter, ConfigError> {
    let expression = args
        .optional_string("expression")?
        .ok_or_else(|| args.invalid("missing argument `expression`"))?;
    Ok(Filter::Eval(Expression::parse(&expression)?))
}

fn build_strip(args: &mut FilterArgs) -> Result<Filter, ConfigError> {
    Ok(Filter::Strip(args.optional_string("chars")?))
}

/// Arguments of one filter spec, positional and/or named.
struct FilterArgs {
    filter: String,
    positional: VecDeque<YamlValue>,
    named: Mapping,
}

impl FilterArgs {
    fn new(filter: &str, args: YamlValue) -> Self {
        let (positional, named) = match args {
            YamlValue::Null => (VecDeque::new(), Mapping::new()),
            YamlValue::Sequence(items) => (items.into(), Mapping::new()),
            YamlValue::Mapping(named) => (VecDeque::new(), named),
            scalar => (VecDeque::from(vec![scalar]), Mapping::new()),
        };
        Self {
            filter: filter.to_string(),
            positional,
            named,
        }
    }

    /// Named argument if given, otherwise the next positional one.
    fn take(&mut self, name: &str) -> Option<YamlValue> {
        self.named
            .remove(name)
            .or_else(|| self.positional.pop_front())
    }

    fn required(&mut self, name: &str) -> Result<YamlValue, ConfigError> {
        self.take(name)
            .ok_or_else(|| self.invalid(&format!("missing argument `{}`", name)))
    }

    fn optional_string(&mut self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.take(name) {
            None | Some(YamlValue::Null) => Ok(None),
            Some(YamlValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.invalid(&format!(
                "argument `{}` must be a string, got {:?}",
                name, other
            ))),
        }
    }

    fn finish(self) -> Result<(), ConfigError> {
        if !self.positional.is_empty() || !self.named.is_empty() {
            let extra = self
                .named
                .keys()
                .map(|k| format!("{:?}", k))
                .chain(self.positional.iter().map(|v| format!("{:?}", v)))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(self.invalid(&format!("unexpected argument(s): {}", extra)));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidFilter {
            name: self.filter.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Filter {
    /// Builds a filter by name from the filter table.
    pub fn build(name: &str, args: YamlValue) -> Result<Self, ConfigError> {
        let (_, constructor) = FILTERS
            .iter()
            .find(|(known, _)| *known == name)
            .ok_or_else(|| ConfigError::UnknownFilter(name.to_string()))?;
        let mut args = FilterArgs::new(name, args);
        let filter = constructor(&mut args)?;
        args.finish()?;
        Ok(filter)
    }

    /// Compiles one entry of a rule's `filters` list.
    pub fn from_spec(spec: &FilterSpec) -> Result<Self, ConfigError> {
        match spec {
            FilterSpec::Name(text) => match split_call(text)? {
                Some((name, args)) => Self::build(name, YamlValue::Sequence(args)),
                None => Self::build(text.trim(), YamlValue::Null),
            },
            FilterSpec::WithArgs(mapping) => {
                let mut entries = mapping.iter();
                match (entries.next(), entries.next()) {
                    (Some((YamlValue::String(name), args)), None) => Self::build(name, args.clone()),
                    _ => Err(ConfigError::InvalidFilter {
                        name: format!("{:?}", mapping),
                        reason: "a filter mapping needs exactly one name".to_string(),
                    }),
                }
            }
        }
    }

    /// Compiles the `type` shorthand: `string`, `int`, `float`, `bool`,
    /// `date[:format]` or `datetime[:format]`.
    pub fn from_type(type_name: &str) -> Result<Self, ConfigError> {
        let (name, format) = match type_name.split_once(':') {
            Some((name, format)) => (name.trim(), Some(format.to_string())),
            None => (type_name.trim(), None),
        };
        let filter = match (name, format) {
            ("string" | "str", None) => Filter::String,
            ("int", None) => Filter::Int,
            ("float", None) => Filter::Float,
            ("bool", None) => Filter::Bool,
            ("date", format) => {
                Filter::Date(format.unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()))
            }
            ("datetime", format) => {
                Filter::DateTime(format.unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string()))
            }
            _ => return Err(ConfigError::UnknownType(type_name.to_string())),
        };
        Ok(filter)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::Default(_) => "default",
            Filter::Bool => "bool",
            Filter::Date(_) => "date",
            Filter::DateTime(_) => "datetime",
            Filter::Float => "float",
            Filter::Int => "int",
            Filter::Strip(_) => "strip",
            Filter::StripHtml => "strip_html",
            Filter::Eval(_) => "eval",
            Filter::String => "string",
        }
    }

    pub fn apply(&self, value: Value) -> Result<Value, ParseError> {
        match self {
            Filter::Default(default_value) => Ok(if value.is_null() {
                default_value.clone()
            } else {
                value
            }),
            _ if value.is_null() => Ok(Value::Null),
            Filter::Bool => Ok(Value::Bool(value.is_truthy())),
            Filter::Date(format) => match value {
                Value::Date(_) => Ok(value),
                other => {
                    let text = expect_text(&other, "date")?;
                    NaiveDate::parse_from_str(text, format)
                        .map(Value::Date)
                        .map_err(|source| date_error(text, format, source))
                }
            },
            Filter::DateTime(format) => match value {
                Value::DateTime(_) => Ok(value),
                other => {
                    let text = expect_text(&other, "datetime")?;
                    parse_datetime(text, format)
                        .map(Value::DateTime)
                        .map_err(|source| date_error(text, format, source))
                }
            },
            Filter::Float => to_float(value),
            Filter::Int => to_int(value),
            Filter::Strip(chars) => {
                let text = expect_text(&value, "strip")?;
                let stripped = match chars {
                    Some(chars) => text.trim_matches(|c: char| chars.contains(c)),
                    None => text.trim(),
                };
                Ok(Value::from(stripped))
            }
            Filter::StripHtml => Ok(Value::Str(strip_tags(expect_text(&value, "strip_html")?))),
            Filter::Eval(expression) => expression.eval(&value),
            Filter::String => Ok(match value {
                Value::Str(_) => value,
                other => Value::Str(other.to_string()),
            }),
        }
    }
}

/// Filters applied in order, each to the previous one's output.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Collects `default`, then `filters`, then `type` from a rule node.
    pub fn compile(node: &RuleNode) -> Result<Self, ConfigError> {
        let mut filters = Vec::with_capacity(node.filters.len() + 2);
        if let Some(default_value) = &node.default {
            filters.push(Filter::Default(Value::from(default_value)));
        }
        for spec in &node.filters {
            filters.push(Filter::from_spec(spec)?);
        }
        if let Some(type_name) = &node.type_name {
            filters.push(Filter::from_type(type_name)?);
        }
        Ok(Self { filters })
    }

    pub fn apply(&self, value: Value) -> Result<Value, ParseError> {
        self.filters
            .iter()
            .try_fold(value, |value, filter| filter.apply(value))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(Filter::name).collect()
    }
}

/// Splits `name(a, b)` into the name and its arguments, read as a YAML flow
/// sequence. Plain names return `None`.
fn split_call(text: &str) -> Result<Option<(&str, Vec<YamlValue>)>, ConfigError> {
    let text = text.trim();
    let open = match text.find('(') {
        Some(open) if text.ends_with(')') => open,
        _ => return Ok(None),
    };
    let name = text[..open].trim();
    let inner = text[open + 1..text.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Some((name, Vec::new())));
    }
    let args = serde_yaml::from_str(&format!("[{}]", inner)).map_err(|e| {
        ConfigError::InvalidFilter {
            name: name.to_string(),
            reason: format!("cannot read arguments ({}): {}", inner, e),
        }
    })?;
    Ok(Some((name, args)))
}

fn expect_text<'v>(value: &'v Value, operation: &'static str) -> Result<&'v str, ParseError> {
    value.as_str().ok_or(ParseError::Unsupported {
        operation,
        found: value.type_name(),
    })
}

fn date_error(input: &str, format: &str, source: chrono::ParseError) -> ParseError {
    ParseError::Date {
        input: input.to_string(),
        format: format.to_string(),
        source,
    }
}

// A date-only format still yields a timestamp, at midnight.
fn parse_datetime(text: &str, format: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, format).or_else(|err| match err.kind() {
        ParseErrorKind::NotEnough => {
            NaiveDate::parse_from_str(text, format).map(|date| date.and_time(NaiveTime::MIN))
        }
        _ => Err(err),
    })
}

fn clean_number(text: &str) -> String {
    text.replace(',', "").trim().to_string()
}

/// Whole floats that fit in an `i64`; NaN, infinities and out of range
/// values give `None`.
pub(crate) fn float_to_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Integer coercion: text loses its `,` separators first, floats truncate.
pub(crate) fn to_int(value: Value) -> Result<Value, ParseError> {
    match value {
        Value::Null | Value::Int(_) => Ok(value),
        Value::Float(f) => float_to_i64(f.trunc())
            .map(Value::Int)
            .ok_or_else(|| ParseError::Number {
                target: "int",
                input: f.to_string(),
            }),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Str(text) => clean_number(&text)
            .parse()
            .map(Value::Int)
            .map_err(|_| ParseError::Number {
                target: "int",
                input: text,
            }),
        other => Err(ParseError::Unsupported {
            operation: "int",
            found: other.type_name(),
        }),
    }
}

pub(crate) fn to_float(value: Value) -> Result<Value, ParseError> {
    match value {
        Value::Null | Value::Float(_) => Ok(value),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        Value::Str(text) => clean_number(&text)
            .parse()
            .map(Value::Float)
            .map_err(|_| ParseError::Number {
                target: "float",
                input: text,
            }),
        other => Err(ParseError::Unsupported {
            operation: "float",
            found: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(spec: &str) -> Filter {
        let spec: FilterSpec = serde_yaml::from_str(spec).unwrap();
        Filter::from_spec(&spec).unwrap()
    }

    fn chain(specs: &str) -> FilterChain {
        let specs: Vec<FilterSpec> = serde_yaml::from_str(specs).unwrap();
        let node = RuleNode {
            filters: specs,
            ..RuleNode::default()
        };
        FilterChain::compile(&node).unwrap()
    }

    #[test]
    fn test_default_only_replaces_null() {
        let f = filter("default(0)");
        assert_eq!(f.apply(Value::Null).unwrap(), Value::Int(0));
        assert_eq!(f.apply(Value::Int(1)).unwrap(), Value::Int(1));
        assert_eq!(f.apply(Value::from("")).unwrap(), Value::from(""));
    }

    #[test]
    fn test_default_then_int() {
        let c = chain(r#"['default("0")', int]"#);
        assert_eq!(c.apply(Value::Null).unwrap(), Value::Int(0));
        assert_eq!(c.apply(Value::from("7")).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_numbers_drop_thousands_separators() {
        assert_eq!(filter("int").apply(Value::from("12,345")).unwrap(), Value::Int(12345));
        assert_eq!(
            filter("int").apply(Value::from("1,234,567")).unwrap(),
            Value::Int(1234567)
        );
        assert_eq!(
            filter("float").apply(Value::from(" 1,234.5 ")).unwrap(),
            Value::Float(1234.5)
        );
    }

    #[test]
    fn test_int_rejects_text() {
        let err = filter("int").apply(Value::from("...")).unwrap_err();
        assert!(matches!(err, ParseError::Number { target: "int", .. }));
    }

    #[test]
    fn test_int_rejects_floats_out_of_range() {
        assert_eq!(filter("int").apply(Value::Float(-2.9)).unwrap(), Value::Int(-2));
        for input in [f64::NAN, f64::NEG_INFINITY, 1e19, -1e19] {
            assert!(
                matches!(
                    filter("int").apply(Value::Float(input)),
                    Err(ParseError::Number { target: "int", .. })
                ),
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_null_passes_through_coercions() {
        for spec in ["int", "float", "bool", "date", "datetime", "strip", "strip_html", "string"] {
            assert_eq!(filter(spec).apply(Value::Null).unwrap(), Value::Null, "{}", spec);
        }
        assert_eq!(filter("eval('value + 1')").apply(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_bool() {
        assert_eq!(filter("bool").apply(Value::from("x")).unwrap(), Value::Bool(true));
        assert_eq!(filter("bool").apply(Value::from("")).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_date_and_datetime() {
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(filter("date").apply(Value::from("2000-01-01")).unwrap(), Value::Date(date));
        assert_eq!(
            filter("{date: ['%d/%m/%Y']}").apply(Value::from("01/01/2000")).unwrap(),
            Value::Date(date)
        );
        assert_eq!(
            filter("datetime").apply(Value::from("2000-01-01 12:30:40")).unwrap(),
            Value::DateTime(date.and_hms_opt(12, 30, 40).unwrap())
        );
        assert_eq!(
            filter("{datetime: {format: '%Y-%m-%d'}}").apply(Value::from("2000-01-01")).unwrap(),
            Value::DateTime(date.and_hms_opt(0, 0, 0).unwrap())
        );
        assert!(matches!(
            filter("date").apply(Value::from("yesterday")),
            Err(ParseError::Date { .. })
        ));
    }

    #[test]
    fn test_strip() {
        assert_eq!(filter("strip").apply(Value::from(" \tabc def\t ")).unwrap(), Value::from("abc def"));
        assert_eq!(filter(r#"strip('"')"#).apply(Value::from("\"abc\"")).unwrap(), Value::from("abc"));
        assert_eq!(
            filter("{strip: {chars: '*-'}}").apply(Value::from("-*x*-")).unwrap(),
            Value::from("x")
        );
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(filter("strip_html").apply(Value::from("a<b>b</b>c")).unwrap(), Value::from("abc"));
    }

    #[test]
    fn test_eval() {
        assert_eq!(
            filter("{eval: 'value / 10'}").apply(Value::Int(10)).unwrap(),
            Value::Float(1.0)
        );
        assert_eq!(
            filter("eval('value.upper()')").apply(Value::from("abc")).unwrap(),
            Value::from("ABC")
        );
    }

    #[test]
    fn test_type_shorthand() {
        assert!(matches!(Filter::from_type("int").unwrap(), Filter::Int));
        assert!(matches!(Filter::from_type("string").unwrap(), Filter::String));
        assert!(matches!(Filter::from_type("date:%d.%m.%Y").unwrap(), Filter::Date(f) if f == "%d.%m.%Y"));
        assert!(matches!(Filter::from_type("datetime").unwrap(), Filter::DateTime(f) if f == DEFAULT_DATETIME_FORMAT));
        assert!(matches!(Filter::from_type("decimal"), Err(ConfigError::UnknownType(_))));
        assert!(matches!(Filter::from_type("int:%d"), Err(ConfigError::UnknownType(_))));
    }

    #[test]
    fn test_unknown_or_malformed_filters_fail_at_compile_time() {
        let unknown: FilterSpec = serde_yaml::from_str("upper").unwrap();
        assert!(matches!(Filter::from_spec(&unknown), Err(ConfigError::UnknownFilter(n)) if n == "upper"));

        let extra: FilterSpec = serde_yaml::from_str("int(5)").unwrap();
        assert!(matches!(Filter::from_spec(&extra), Err(ConfigError::InvalidFilter { .. })));

        let missing: FilterSpec = serde_yaml::from_str("default").unwrap();
        assert!(matches!(Filter::from_spec(&missing), Err(ConfigError::InvalidFilter { .. })));

        let two_names: FilterSpec = serde_yaml::from_str("{int: [], float: []}").unwrap();
        assert!(matches!(Filter::from_spec(&two_names), Err(ConfigError::InvalidFilter { .. })));

        let bad_expr: FilterSpec = serde_yaml::from_str("{eval: 'import os'}").unwrap();
        assert!(matches!(Filter::from_spec(&bad_expr), Err(ConfigError::InvalidExpression { .. })));
    }

    #[test]
    fn test_chain_order_default_filters_type() {
        let node: RuleNode = serde_yaml::from_str(
            "prefix: a\nsuffix: b\ndefault: ' 5 '\nfilters: [strip]\ntype: int\n",
        )
        .unwrap();
        let chain = FilterChain::compile(&node).unwrap();
        assert_eq!(chain.names(), vec!["default", "strip", "int"]);
        assert_eq!(chain.apply(Value::Null).unwrap(), Value::Int(5));
    }
}
