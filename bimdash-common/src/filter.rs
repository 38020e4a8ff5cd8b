//! In-memory filtering and sorting of record lists

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::FieldRoles;
use crate::projects::FlatRecord;
use crate::record::{display_value, Record};

/// Field name to substring query
pub type Filters = BTreeMap<String, String>;

/// Anything with named fields the engine can look at
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<&Value>;
}

impl FieldSource for Record {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl FieldSource for FlatRecord {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    pub key: String,
    pub direction: SortDirection,
}

impl SortConfig {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: key.into(),
            direction,
        }
    }

    /// Sort state after clicking `key`: the same key flips ascending to
    /// descending, anything else starts ascending
    pub fn toggle(current: Option<&SortConfig>, key: &str) -> SortConfig {
        let direction = match current {
            Some(c) if c.key == key && c.direction == SortDirection::Ascending => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        SortConfig::new(key, direction)
    }
}

/// True if `item` passes every non-empty query.
///
/// Values are compared as displayed text, case-insensitively; a history
/// list is matched by its entry count.
pub fn matches<T: FieldSource>(item: &T, filters: &Filters, roles: &FieldRoles) -> bool {
    filters.iter().all(|(field, query)| {
        if query.is_empty() {
            return true;
        }
        let text = match item.field(field) {
            Some(Value::Array(entries)) if roles.is_history(field) => entries.len().to_string(),
            other => display_value(other),
        };
        text.to_lowercase().contains(&query.to_lowercase())
    })
}

/// Keep the items passing [`matches`]
pub fn apply_filters<T: FieldSource>(items: Vec<T>, filters: &Filters, roles: &FieldRoles) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| matches(item, filters, roles))
        .collect()
}

/// Sort by one field; null and missing values always go last
pub fn sort_items<T: FieldSource>(items: &mut [T], sort: &SortConfig) {
    items.sort_by(|a, b| compare_for_sort(a.field(&sort.key), b.field(&sort.key), sort.direction));
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = compare_values(a, b);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()),
        _ => display_value(Some(a)).cmp(&display_value(Some(b))),
    }
}
