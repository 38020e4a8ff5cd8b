//! Key contact details and people analytics
//!
//! Details are keyed by contact name and joined to projects only by that
//! name when a summary is built.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::fields::{FieldRole, FieldRoles};
use crate::projects::ProjectSnapshot;
use crate::store::{validate_segment, TreeStore};
use crate::{Error, Result};

pub const CONTACT_DETAILS_ROOT: &str = "KeyContactDetails";

/// Accepted software proficiency levels
pub const PROFICIENCY_LEVELS: [&str; 3] = ["Low", "Medium", "Proficient"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyContactDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revit_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhino_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl KeyContactDetails {
    fn validate(&self, contact: &str) -> Result<()> {
        for (label, level) in [("revitLevel", &self.revit_level), ("rhinoLevel", &self.rhino_level)] {
            if let Some(level) = level.as_deref().filter(|l| !l.is_empty()) {
                if !PROFICIENCY_LEVELS.contains(&level) {
                    return Err(Error::InvalidInput(format!(
                        "{} of {} must be one of {}, got \"{}\"",
                        label,
                        contact,
                        PROFICIENCY_LEVELS.join(", "),
                        level
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Contact name to details
pub type ContactDirectory = BTreeMap<String, KeyContactDetails>;

/// One row of the people view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub name: String,
    pub project_count: usize,
    pub details: KeyContactDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeopleSummary {
    pub contacts: Vec<ContactSummary>,
    pub categories: Vec<String>,
}

/// Per-column substring filters of the people view
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFilters {
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub revit_level: Option<String>,
    #[serde(default)]
    pub rhino_level: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

impl ContactFilters {
    pub fn matches(&self, summary: &ContactSummary) -> bool {
        let details = &summary.details;
        let pairs = [
            (&self.contact, Some(summary.name.as_str())),
            (&self.team, details.team.as_deref()),
            (&self.revit_level, details.revit_level.as_deref()),
            (&self.rhino_level, details.rhino_level.as_deref()),
            (&self.position, details.position.as_deref()),
        ];

        pairs.iter().all(|(query, value)| {
            let query = query.as_deref().unwrap_or("").to_lowercase();
            value.unwrap_or("").to_lowercase().contains(&query)
        })
    }
}

/// Count projects per contact and join the stored details.
///
/// An empty dataset gives an empty summary; data without a contact field
/// is a configuration error.
pub fn summarize(
    snapshot: &ProjectSnapshot,
    roles: &FieldRoles,
    directory: &ContactDirectory,
) -> Result<PeopleSummary> {
    if snapshot.is_empty() {
        return Ok(PeopleSummary::default());
    }

    let contact_field = roles.require(FieldRole::Contact, &snapshot.headers)?;
    let category_field = roles.resolve(FieldRole::Category, &snapshot.headers);

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut categories: BTreeSet<&str> = BTreeSet::new();

    for record in &snapshot.records {
        if let Some(contact) = non_blank_str(record.get(contact_field)) {
            *counts.entry(contact).or_insert(0) += 1;
        }
        if let Some(category) = category_field.and_then(|f| non_blank_str(record.get(f))) {
            categories.insert(category);
        }
    }

    let contacts = counts
        .into_iter()
        .map(|(name, project_count)| ContactSummary {
            name: name.to_string(),
            project_count,
            details: directory.get(name).cloned().unwrap_or_default(),
        })
        .collect();

    Ok(PeopleSummary {
        contacts,
        categories: categories.into_iter().map(str::to_string).collect(),
    })
}

fn non_blank_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[derive(Clone)]
pub struct ContactStore {
    store: TreeStore,
}

impl ContactStore {
    pub fn new(store: TreeStore) -> Self {
        Self { store }
    }

    pub async fn directory(&self) -> Result<ContactDirectory> {
        match self.store.get(CONTACT_DETAILS_ROOT).await? {
            None => Ok(ContactDirectory::new()),
            Some(value @ Value::Object(_)) => serde_json::from_value(value).map_err(|e| {
                Error::DataShape(format!("{} is malformed: {}", CONTACT_DETAILS_ROOT, e))
            }),
            Some(_) => Err(Error::DataShape(format!(
                "{} is not a mapping of contact names",
                CONTACT_DETAILS_ROOT
            ))),
        }
    }

    /// Replace the whole directory
    pub async fn save_directory(&self, directory: &ContactDirectory) -> Result<()> {
        for (contact, details) in directory {
            validate_segment(contact)?;
            details.validate(contact)?;
        }

        self.store
            .set(CONTACT_DETAILS_ROOT, serde_json::to_value(directory)?)
            .await?;

        info!(contacts = directory.len(), "key contact details saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::events::EventBus;
    use crate::projects::flatten;
    use serde_json::json;

    fn snapshot() -> ProjectSnapshot {
        flatten(Some(&json!({"1": [
            {"Project Name": "A", "Category": "Civic", "Key Contact": "Ann"},
            {"Project Name": "B", "Category": "Airport", "Key Contact": "Bob"},
            {"Project Name": "C", "Category": "Civic", "Key Contact": "Ann"},
            {"Project Name": "D", "Category": "", "Key Contact": " "},
        ]})))
    }

    fn directory() -> ContactDirectory {
        let mut directory = ContactDirectory::new();
        directory.insert(
            "Ann".to_string(),
            KeyContactDetails {
                team: Some("Structures".to_string()),
                revit_level: Some("Proficient".to_string()),
                ..Default::default()
            },
        );
        directory
    }

    #[test]
    fn test_summary_counts_and_joins_details() {
        let summary = summarize(&snapshot(), &FieldRoles::default(), &directory()).unwrap();

        assert_eq!(summary.categories, vec!["Airport", "Civic"]);
        assert_eq!(summary.contacts.len(), 2);
        assert_eq!(summary.contacts[0].name, "Ann");
        assert_eq!(summary.contacts[0].project_count, 2);
        assert_eq!(summary.contacts[0].details.team.as_deref(), Some("Structures"));
        assert_eq!(summary.contacts[1].details, KeyContactDetails::default());
    }

    #[test]
    fn test_summary_requires_contact_field() {
        let data = flatten(Some(&json!({"1": [{"Project Name": "A"}]})));
        assert!(matches!(
            summarize(&data, &FieldRoles::default(), &directory()),
            Err(Error::Config(_))
        ));
        assert!(summarize(&ProjectSnapshot::default(), &FieldRoles::default(), &directory())
            .unwrap()
            .contacts
            .is_empty());
    }

    #[test]
    fn test_filters_across_columns() {
        let summary = summarize(&snapshot(), &FieldRoles::default(), &directory()).unwrap();

        let filters = ContactFilters {
            team: Some("struct".to_string()),
            ..Default::default()
        };
        let kept: Vec<_> = summary.contacts.iter().filter(|c| filters.matches(c)).collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Ann");

        let everyone = ContactFilters::default();
        assert!(summary.contacts.iter().all(|c| everyone.matches(c)));
    }

    #[tokio::test]
    async fn test_directory_round_trip_and_level_validation() {
        let pool = init_memory_database().await.unwrap();
        let contacts = ContactStore::new(TreeStore::new(pool, EventBus::new(8)));

        assert!(contacts.directory().await.unwrap().is_empty());
        contacts.save_directory(&directory()).await.unwrap();
        assert_eq!(contacts.directory().await.unwrap(), directory());

        let mut bad = directory();
        bad.insert(
            "Bob".to_string(),
            KeyContactDetails {
                rhino_level: Some("Expert".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(
            contacts.save_directory(&bad).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
