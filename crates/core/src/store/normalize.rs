//! Row normalization between stored and application representations.
//!
//! The store keeps only SQLite primitives (null, integer, real, text).
//! Application code sees richer values per the kind's column coercions:
//! booleans instead of 0/1, parsed structures instead of JSON text.
//!
//! Coercion is lenient in both directions: a value that does not match the
//! expected stored shape passes through unmodified. In particular, JSON text
//! that fails to parse is exposed as the raw string rather than raising.

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;

use super::schema::{Coercion, KindSchema};

/// A single entity record: field name to value.
pub type Record = serde_json::Map<String, Value>;

/// Convert a raw SQLite value into a plain JSON value (no coercion yet).
pub(crate) fn sql_to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        // The catalog schema never stores blobs.
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Apply a column's coercion to a freshly read value.
pub(crate) fn expose(coercion: Coercion, value: Value) -> Value {
    match coercion {
        Coercion::None | Coercion::Date => value,
        Coercion::Boolean => {
            let coerced = match &value {
                Value::Number(n) => n.as_i64().map(|i| i != 0),
                Value::String(s) => match s.as_str() {
                    "0" | "false" => Some(false),
                    "1" | "true" => Some(true),
                    _ => None,
                },
                _ => None,
            };
            match coerced {
                Some(b) => Value::Bool(b),
                None => value,
            }
        }
        Coercion::Json => {
            // Malformed stored value: keep the raw text, never fail.
            let parsed = match &value {
                Value::String(s) => serde_json::from_str::<Value>(s).ok(),
                _ => None,
            };
            parsed.unwrap_or(value)
        }
    }
}

/// Convert an application value to its stored representation for a column.
pub(crate) fn to_stored(coercion: Coercion, value: &Value) -> SqlValue {
    match coercion {
        Coercion::Boolean => match value {
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            other => plain_sql_value(other),
        },
        Coercion::Json => match value {
            Value::Array(_) | Value::Object(_) => {
                SqlValue::Text(value.to_string())
            }
            other => plain_sql_value(other),
        },
        Coercion::None | Coercion::Date => plain_sql_value(value),
    }
}

fn plain_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Normalize a full row (column names paired with raw values) into a record.
pub(crate) fn expose_row(
    schema: &KindSchema,
    names: &[String],
    values: Vec<Value>,
) -> Record {
    let mut record = Record::new();
    for (name, value) in names.iter().zip(values) {
        let coercion = schema
            .column(name)
            .map(|c| c.coercion)
            .unwrap_or(Coercion::None);
        record.insert(name.clone(), expose(coercion, value));
    }
    record
}

/// Stored representation of one record field, honoring the column's coercion.
pub(crate) fn stored_field(schema: &KindSchema, field: &str, value: &Value) -> SqlValue {
    let coercion = schema
        .column(field)
        .map(|c| c.coercion)
        .unwrap_or(Coercion::None);
    to_stored(coercion, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_from_integer() {
        assert_eq!(expose(Coercion::Boolean, json!(1)), json!(true));
        assert_eq!(expose(Coercion::Boolean, json!(0)), json!(false));
        assert_eq!(expose(Coercion::Boolean, json!(2)), json!(true));
    }

    #[test]
    fn test_boolean_from_text() {
        assert_eq!(expose(Coercion::Boolean, json!("true")), json!(true));
        assert_eq!(expose(Coercion::Boolean, json!("0")), json!(false));
        // Unrecognized text passes through unmodified.
        assert_eq!(expose(Coercion::Boolean, json!("yes")), json!("yes"));
    }

    #[test]
    fn test_boolean_null_passes_through() {
        assert_eq!(expose(Coercion::Boolean, Value::Null), Value::Null);
    }

    #[test]
    fn test_json_parses_stored_text() {
        assert_eq!(
            expose(Coercion::Json, json!("[\"1\",\"2\"]")),
            json!(["1", "2"])
        );
    }

    #[test]
    fn test_json_keeps_malformed_text() {
        assert_eq!(
            expose(Coercion::Json, json!("not json at all")),
            json!("not json at all")
        );
    }

    #[test]
    fn test_boolean_round_trip() {
        for b in [true, false] {
            let stored = to_stored(Coercion::Boolean, &json!(b));
            let raw = match stored {
                SqlValue::Integer(i) => json!(i),
                _ => panic!("boolean must store as integer"),
            };
            assert_eq!(expose(Coercion::Boolean, raw), json!(b));
        }
    }

    #[test]
    fn test_json_round_trip() {
        let value = json!({"ids": ["1", "10"], "n": 3});
        let stored = to_stored(Coercion::Json, &value);
        let raw = match stored {
            SqlValue::Text(t) => Value::String(t),
            _ => panic!("json must store as text"),
        };
        assert_eq!(expose(Coercion::Json, raw), value);
    }

    #[test]
    fn test_non_json_string_survives_round_trip() {
        let stored = to_stored(Coercion::Json, &json!("plain words"));
        let raw = match stored {
            SqlValue::Text(t) => Value::String(t),
            _ => panic!("string stores as text"),
        };
        assert_eq!(expose(Coercion::Json, raw), json!("plain words"));
    }

    #[test]
    fn test_date_passes_through() {
        let ts = json!("2024-06-01T10:00:00Z");
        assert_eq!(expose(Coercion::Date, ts.clone()), ts);
        assert_eq!(
            to_stored(Coercion::Date, &ts),
            SqlValue::Text("2024-06-01T10:00:00Z".to_string())
        );
    }
}
