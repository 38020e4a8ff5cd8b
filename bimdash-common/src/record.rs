//! Project record value model
//!
//! Records are open JSON objects whose field order follows the header order
//! they were created with. [`FieldValue`] is the typed form a CSV cell is
//! coerced into before it is stored.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

/// One project: field name to value, insertion ordered
pub type Record = Map<String, Value>;

/// Stable per-record key assigned when a record is first stored
pub const RECORD_KEY_FIELD: &str = "__key__";

/// Synthetic composite id attached to flattened records
pub const RECORD_ID_FIELD: &str = "__id__";

/// True for the bookkeeping fields that are not user data
pub fn is_reserved_field(field: &str) -> bool {
    field == RECORD_KEY_FIELD || field == RECORD_ID_FIELD
}

/// Typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
    Null,
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::String(s) => Value::String(s),
            FieldValue::Number(n) => number_value(n),
            FieldValue::Boolean(b) => Value::Bool(b),
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::List(items) => {
                Value::Array(items.into_iter().map(Value::String).collect())
            }
            FieldValue::Null => Value::Null,
        }
    }
}

/// JSON number for `n`; integral values are stored as integers, non-finite as null
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Render a value the way a browser's `String(value)` would.
///
/// A missing field renders as `"undefined"` and null as `"null"`.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => display_number(n),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display_value(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

fn display_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    // f64 Display already drops a trailing ".0"
    n.as_f64().map(|f| f.to_string()).unwrap_or_default()
}

/// Null or the empty string
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A browser-truthy value: not null, false, zero or the empty string
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
