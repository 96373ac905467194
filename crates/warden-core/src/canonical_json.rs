//! Canonical JSON rendering for hash inputs.
//!
//! Hash labels must be identical across processes and restarts, so hash
//! inputs are rendered with sorted object keys, no whitespace and integers
//! only. Object specs carry quantities as strings; a float reaching this
//! module is reported with its path instead of being normalized.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a value has no canonical form.
#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    /// The value could not be converted to JSON.
    #[error("cannot encode as JSON: {0}")]
    Encode(#[from] serde_json::Error),

    /// A float was found; its textual form is not stable across encoders.
    #[error("float at {path} has no canonical form")]
    Float {
        /// Location of the float, e.g. `$.spec.containers[0].cpu`.
        path: String,
    },
}

/// Renders `value` as canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CanonicalJsonError::Encode`] if the value does not serialize,
/// or [`CanonicalJsonError::Float`] if it contains a float.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    to_canonical_string(value).map(String::into_bytes)
}

/// Renders `value` as a canonical JSON string.
///
/// # Errors
///
/// See [`to_canonical_bytes`].
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    let value = serde_json::to_value(value)?;
    let mut writer = CanonicalWriter::default();
    writer.value(&value)?;
    Ok(writer.out)
}

#[derive(Default)]
struct CanonicalWriter {
    out: String,
    path: Vec<String>,
}

impl CanonicalWriter {
    fn value(&mut self, value: &Value) -> Result<(), CanonicalJsonError> {
        match value {
            Value::Null => self.out.push_str("null"),
            Value::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    let _ = write!(self.out, "{i}");
                } else if let Some(u) = n.as_u64() {
                    let _ = write!(self.out, "{u}");
                } else {
                    return Err(CanonicalJsonError::Float {
                        path: self.render_path(),
                    });
                }
            }
            Value::String(s) => self.string(s)?,
            Value::Array(items) => self.array(items)?,
            Value::Object(map) => self.object(map)?,
        }
        Ok(())
    }

    fn string(&mut self, s: &str) -> Result<(), CanonicalJsonError> {
        self.out.push_str(&serde_json::to_string(s)?);
        Ok(())
    }

    fn array(&mut self, items: &[Value]) -> Result<(), CanonicalJsonError> {
        self.out.push('[');
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.out.push(',');
            }
            self.path.push(format!("[{index}]"));
            self.value(item)?;
            self.path.pop();
        }
        self.out.push(']');
        Ok(())
    }

    fn object(&mut self, map: &Map<String, Value>) -> Result<(), CanonicalJsonError> {
        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        entries.sort_unstable_by_key(|(key, _)| *key);

        self.out.push('{');
        for (index, (key, value)) in entries.into_iter().enumerate() {
            if index > 0 {
                self.out.push(',');
            }
            self.string(key)?;
            self.out.push(':');
            self.path.push(format!(".{key}"));
            self.value(value)?;
            self.path.pop();
        }
        self.out.push('}');
        Ok(())
    }

    fn render_path(&self) -> String {
        let mut path = String::from("$");
        for segment in &self.path {
            path.push_str(segment);
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(v: &Value) -> String {
        to_canonical_string(v).unwrap_or_else(|e| panic!("render failed: {e}"))
    }

    #[test]
    fn keys_sorted_without_whitespace() {
        assert_eq!(
            render(&json!({"replicas": 3, "image": "nginx:1.25"})),
            r#"{"image":"nginx:1.25","replicas":3}"#
        );
        assert_eq!(
            render(&json!({"template": {"spec": {"b": 2, "a": 1}}, "selector": {}})),
            r#"{"selector":{},"template":{"spec":{"a":1,"b":2}}}"#
        );
    }

    #[test]
    fn arrays_keep_order_and_strings_are_escaped() {
        assert_eq!(
            render(&json!(["b", "a\"q", null, true, -4])),
            r#"["b","a\"q",null,true,-4]"#
        );
    }

    #[test]
    fn large_unsigned_integers_survive() {
        assert_eq!(render(&json!({"n": u64::MAX})), format!("{{\"n\":{}}}", u64::MAX));
    }

    #[test]
    fn float_error_names_its_path() {
        let v = json!({"spec": {"containers": [{"name": "a"}, {"cpu": 0.5}]}});
        match to_canonical_bytes(&v) {
            Err(CanonicalJsonError::Float { path }) => {
                assert_eq!(path, "$.spec.containers[1].cpu");
            }
            other => panic!("expected float error, got {other:?}"),
        }
    }
}
