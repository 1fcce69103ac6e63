// src/extractors/record.rs
use crate::rules::{describe, FieldNode};
use crate::utils::error::{ConfigError, ParseError};
use crate::value::{Record, Value};

use super::scalar::ScalarExtractor;

#[derive(Debug, Clone)]
struct Field {
    key: String,
    extractor: ScalarExtractor,
}

/// Extracts named fields one after another.
///
/// Field N starts searching where field N-1's match ended, so the order of
/// the fields is also the order they must appear in the document. A field
/// that is not found becomes null and does not move the cursor.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    pub(crate) rule: String,
    fields: Vec<Field>,
}

impl RecordExtractor {
    pub fn compile(field_nodes: &[FieldNode]) -> Result<Self, ConfigError> {
        let fields = field_nodes
            .iter()
            .map(|field| {
                Ok(Field {
                    key: field.key.clone(),
                    extractor: ScalarExtractor::compile(&field.rule)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            rule: describe(field_nodes),
            fields,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.key.as_str())
    }

    pub fn extract_record(&self, text: &str) -> Result<Record, ParseError> {
        let mut record = Record::with_capacity(self.fields.len());
        let mut cursor = 0;
        for field in &self.fields {
            let (value, end) = field.extractor.extract_at(text, cursor)?;
            tracing::trace!("Field {:?} resolved, cursor {} -> {}", field.key, cursor, end);
            record.insert(field.key.clone(), value);
            cursor = end;
        }
        Ok(record)
    }

    pub(crate) fn extract_value(&self, text: &str) -> Result<Value, ParseError> {
        self.extract_record(text).map(Value::Record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(yaml: &str) -> RecordExtractor {
        let fields: Vec<FieldNode> = serde_yaml::from_str(yaml).unwrap();
        RecordExtractor::compile(&fields).unwrap()
    }

    #[test]
    fn test_fields_in_declaration_order() {
        let e = record(
            "- {key: name, prefix: '<td id=\"1\">', suffix: </td>}\n- {key: value, prefix: '<td id=\"2\">', suffix: </td>}\n",
        );
        let r = e
            .extract_record("<tr><td id=\"1\">abc</td><td id=\"2\">123</td></tr>")
            .unwrap();
        assert_eq!(r.get("name"), Some(&Value::from("abc")));
        assert_eq!(r.get("value"), Some(&Value::from("123")));
        assert_eq!(e.keys().collect::<Vec<_>>(), vec!["name", "value"]);
    }

    #[test]
    fn test_missing_fields_are_null() {
        let e = record("- {key: name, prefix: <td>, suffix: </td>}\n- {key: value, prefix: <td>, suffix: </td>}\n");
        let r = e.extract_record("<tr></tr>").unwrap();
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["name", "value"]);
        assert!(r.get("name").unwrap().is_null());
        assert!(r.get("value").unwrap().is_null());
    }

    #[test]
    fn test_cursor_is_cumulative() {
        // Same patterns twice: the second field must see the second cell
        let e = record("- {key: a, prefix: <td>, suffix: </td>}\n- {key: b, prefix: <td>, suffix: </td>}\n");
        let r = e.extract_record("<td>1</td><td>2</td>").unwrap();
        assert_eq!(r.get("a"), Some(&Value::from("1")));
        assert_eq!(r.get("b"), Some(&Value::from("2")));
    }

    #[test]
    fn test_missed_field_does_not_move_cursor() {
        let e = record(
            "- {key: a, prefix: <td>, suffix: </td>}\n- {key: missing, prefix: <th>, suffix: </th>}\n- {key: b, prefix: <td>, suffix: </td>}\n",
        );
        let r = e.extract_record("<td>1</td><td>2</td>").unwrap();
        assert_eq!(r.get("a"), Some(&Value::from("1")));
        assert!(r.get("missing").unwrap().is_null());
        assert_eq!(r.get("b"), Some(&Value::from("2")));
    }

    #[test]
    fn test_field_order_constrains_traversal() {
        // `b` comes first in the text, but after `a` there is nothing left for it
        let e = record("- {key: a, prefix: '[a]', suffix: '[/a]'}\n- {key: b, prefix: '[b]', suffix: '[/b]'}\n");
        let r = e.extract_record("[b]2[/b][a]1[/a]").unwrap();
        assert_eq!(r.get("a"), Some(&Value::from("1")));
        assert!(r.get("b").unwrap().is_null());
    }

    #[test]
    fn test_duplicate_key_later_wins() {
        let e = record("- {key: x, prefix: <td>, suffix: </td>}\n- {key: x, prefix: <td>, suffix: </td>}\n");
        let r = e.extract_record("<td>1</td><td>2</td>").unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("x"), Some(&Value::from("2")));
    }
}
