//! Dashboard statistics over the flattened dataset

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::fields::{FieldRole, FieldRoles};
use crate::projects::{FlatRecord, ProjectSnapshot};
use crate::record::{display_value, is_blank, is_truthy};

/// Longest label shown on the top-items chart
const LABEL_MAX_CHARS: usize = 30;

/// Bars on the top-items chart
const TOP_ITEMS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRow {
    pub revit_version: String,
    /// Project count per category, zero included
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionMatrix {
    /// Categories in first-seen order
    pub categories: Vec<String>,
    /// One row per version, versions sorted
    pub rows: Vec<VersionRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopItems {
    pub label_field: String,
    pub value_field: String,
    pub items: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_projects: usize,
    pub complete_projects: usize,
    pub incomplete_projects: usize,
    pub category_counts: Vec<NamedCount>,
    pub version_by_category: VersionMatrix,
    pub top_items: Option<TopItems>,
}

/// Compute every dashboard figure from one snapshot
pub fn compute(snapshot: &ProjectSnapshot, roles: &FieldRoles) -> DashboardStats {
    let total_projects = snapshot.records.len();
    let incomplete_projects = snapshot
        .records
        .iter()
        .filter(|r| r.fields.values().any(is_blank))
        .count();

    let category_field = roles.resolve(FieldRole::Category, &snapshot.headers);
    let version_field = roles.resolve(FieldRole::Version, &snapshot.headers);
    if !snapshot.is_empty() && category_field.is_none() {
        debug!(field = %roles.category, "category field not in dataset, category charts left empty");
    }

    let category_counts = category_field
        .map(|field| count_categories(&snapshot.records, field))
        .unwrap_or_default();

    let version_by_category = match (version_field, category_field) {
        (Some(version), Some(category)) => version_matrix(&snapshot.records, version, category),
        _ => VersionMatrix::default(),
    };

    DashboardStats {
        total_projects,
        complete_projects: total_projects - incomplete_projects,
        incomplete_projects,
        category_counts,
        version_by_category,
        top_items: top_items(snapshot),
    }
}

fn non_blank_str<'a>(record: &'a FlatRecord, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn count_categories(records: &[FlatRecord], field: &str) -> Vec<NamedCount> {
    let mut counts: Vec<NamedCount> = Vec::new();

    for category in records.iter().filter_map(|r| non_blank_str(r, field)) {
        match counts.iter_mut().find(|c| c.name == category) {
            Some(entry) => entry.value += 1,
            None => counts.push(NamedCount {
                name: category.to_string(),
                value: 1,
            }),
        }
    }

    counts
}

fn version_matrix(records: &[FlatRecord], version_field: &str, category_field: &str) -> VersionMatrix {
    let mut categories: Vec<String> = Vec::new();
    let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

    for record in records {
        let Some(version) = record.get(version_field).filter(|v| is_truthy(v)) else {
            continue;
        };
        let Some(category) = non_blank_str(record, category_field) else {
            continue;
        };

        if !categories.iter().any(|c| c == category) {
            categories.push(category.to_string());
        }
        let version = display_value(Some(version)).trim().to_string();
        *counts
            .entry(version)
            .or_default()
            .entry(category.to_string())
            .or_insert(0) += 1;
    }

    let rows = counts
        .into_iter()
        .map(|(revit_version, found)| VersionRow {
            counts: categories
                .iter()
                .map(|c| (c.clone(), found.get(c).copied().unwrap_or(0)))
                .collect(),
            revit_version,
        })
        .collect();

    VersionMatrix { categories, rows }
}

/// Largest values of the first mostly-numeric field, labelled by the first
/// mostly-text field
fn top_items(snapshot: &ProjectSnapshot) -> Option<TopItems> {
    let records = &snapshot.records;
    if records.is_empty() || snapshot.headers.is_empty() {
        return None;
    }

    let share = |predicate: &dyn Fn(&Value) -> bool, field: &str| {
        let hits = records
            .iter()
            .filter(|r| r.get(field).map(predicate).unwrap_or(false))
            .count();
        hits as f64 / records.len() as f64 > 0.5
    };

    let value_field = snapshot
        .headers
        .iter()
        .find(|h| share(&|v: &Value| v.is_number(), h.as_str()))?;
    let label_field = snapshot
        .headers
        .iter()
        .find(|h| {
            *h != value_field
                && share(
                    &|v: &Value| v.as_str().map(|s| !s.is_empty()).unwrap_or(false),
                    h.as_str(),
                )
        })?;

    let mut items: Vec<ChartPoint> = records
        .iter()
        .map(|r| {
            let label = match r.get(label_field) {
                Some(v) if is_truthy(v) => display_value(Some(v)),
                _ => "Unnamed".to_string(),
            };
            ChartPoint {
                name: label.chars().take(LABEL_MAX_CHARS).collect(),
                value: r.get(value_field).and_then(Value::as_f64).unwrap_or(0.0),
            }
        })
        .filter(|p| p.value > 0.0)
        .collect();

    if items.is_empty() {
        return None;
    }

    items.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
    items.truncate(TOP_ITEMS);

    Some(TopItems {
        label_field: label_field.clone(),
        value_field: value_field.clone(),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::flatten;
    use serde_json::json;

    fn snapshot() -> ProjectSnapshot {
        flatten(Some(&json!({"1": [
            {"Project Name": "Harbour Bridge Refurbishment Phase Two", "Category": "Civic", "Revit Version": 2023, "Area": 1200},
            {"Project Name": "Clinic", "Category": "Health", "Revit Version": "2022", "Area": 300},
            {"Project Name": "Depot", "Category": "Civic", "Revit Version": 2023, "Area": null},
            {"Project Name": "", "Category": "", "Revit Version": "", "Area": 50},
        ]})))
    }

    #[test]
    fn test_totals() {
        let stats = compute(&snapshot(), &FieldRoles::default());
        assert_eq!(stats.total_projects, 4);
        assert_eq!(stats.incomplete_projects, 2);
        assert_eq!(stats.complete_projects, 2);
    }

    #[test]
    fn test_category_counts_in_first_seen_order() {
        let stats = compute(&snapshot(), &FieldRoles::default());
        assert_eq!(
            stats.category_counts,
            vec![
                NamedCount { name: "Civic".to_string(), value: 2 },
                NamedCount { name: "Health".to_string(), value: 1 },
            ]
        );
    }

    #[test]
    fn test_version_matrix() {
        let stats = compute(&snapshot(), &FieldRoles::default());
        let matrix = stats.version_by_category;
        assert_eq!(matrix.categories, vec!["Civic", "Health"]);
        assert_eq!(matrix.rows.len(), 2);
        assert_eq!(matrix.rows[0].revit_version, "2022");
        assert_eq!(matrix.rows[0].counts["Civic"], 0);
        assert_eq!(matrix.rows[0].counts["Health"], 1);
        assert_eq!(matrix.rows[1].counts["Civic"], 2);
    }

    #[test]
    fn test_top_items() {
        let stats = compute(&snapshot(), &FieldRoles::default());
        let top = stats.top_items.unwrap();
        assert_eq!(top.value_field, "Area");
        assert_eq!(top.label_field, "Project Name");
        assert_eq!(top.items.len(), 3);
        assert_eq!(top.items[0].name.chars().count(), 30);
        assert_eq!(top.items[0].value, 1200.0);
        assert_eq!(top.items[2].name, "Unnamed");
    }

    #[test]
    fn test_empty_dataset() {
        let stats = compute(&ProjectSnapshot::default(), &FieldRoles::default());
        assert_eq!(stats.total_projects, 0);
        assert!(stats.category_counts.is_empty());
        assert!(stats.top_items.is_none());
    }
}
