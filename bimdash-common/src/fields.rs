//! Field roles
//!
//! Projects have no fixed schema, but several views need to know which
//! column holds the project name, the category, the key contact and so on.
//! [`FieldRoles`] maps each logical role to a concrete field name. The
//! mapping is loaded from the `[fields]` table of the TOML config and
//! validated once at startup.

use serde::{Deserialize, Serialize};

use crate::store::validate_segment;
use crate::{Error, Result};

/// Logical column roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Name,
    Category,
    Lead,
    Contact,
    Version,
    Description,
    Year,
    History,
}

impl FieldRole {
    /// Every role, in add-form order
    pub const ALL: [FieldRole; 8] = [
        FieldRole::Name,
        FieldRole::Category,
        FieldRole::Lead,
        FieldRole::Contact,
        FieldRole::Version,
        FieldRole::Description,
        FieldRole::Year,
        FieldRole::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Name => "name",
            FieldRole::Category => "category",
            FieldRole::Lead => "lead",
            FieldRole::Contact => "contact",
            FieldRole::Version => "version",
            FieldRole::Description => "description",
            FieldRole::Year => "year",
            FieldRole::History => "history",
        }
    }
}

impl std::fmt::Display for FieldRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role to field-name mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRoles {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_lead")]
    pub lead: String,
    #[serde(default = "default_contact")]
    pub contact: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_year")]
    pub year: String,
    #[serde(default = "default_history")]
    pub history: String,
}

fn default_name() -> String {
    "Project Name".to_string()
}

fn default_category() -> String {
    "Category".to_string()
}

fn default_lead() -> String {
    "BIM Lead".to_string()
}

fn default_contact() -> String {
    "Key Contact".to_string()
}

fn default_version() -> String {
    "Revit Version".to_string()
}

fn default_description() -> String {
    "Description".to_string()
}

fn default_year() -> String {
    "Year".to_string()
}

fn default_history() -> String {
    "History comments".to_string()
}

impl Default for FieldRoles {
    fn default() -> Self {
        Self {
            name: default_name(),
            category: default_category(),
            lead: default_lead(),
            contact: default_contact(),
            version: default_version(),
            description: default_description(),
            year: default_year(),
            history: default_history(),
        }
    }
}

impl FieldRoles {
    /// Configured field name for a role
    pub fn field(&self, role: FieldRole) -> &str {
        match role {
            FieldRole::Name => &self.name,
            FieldRole::Category => &self.category,
            FieldRole::Lead => &self.lead,
            FieldRole::Contact => &self.contact,
            FieldRole::Version => &self.version,
            FieldRole::Description => &self.description,
            FieldRole::Year => &self.year,
            FieldRole::History => &self.history,
        }
    }

    /// Field names every project is expected to carry, in add-form order
    pub fn expected_fields(&self) -> Vec<String> {
        FieldRole::ALL
            .iter()
            .map(|role| self.field(*role).to_string())
            .collect()
    }

    /// Check the mapping is usable: non-empty, storable, pairwise distinct
    pub fn validate(&self) -> Result<()> {
        let mut seen: Vec<(FieldRole, String)> = Vec::with_capacity(FieldRole::ALL.len());

        for role in FieldRole::ALL {
            let field = self.field(role);
            if field.trim().is_empty() {
                return Err(Error::Config(format!("field role `{}` is mapped to an empty name", role)));
            }
            validate_segment(field)
                .map_err(|e| Error::Config(format!("field role `{}`: {}", role, e)))?;

            let lowered = field.to_lowercase();
            if let Some((other, _)) = seen.iter().find(|(_, f)| *f == lowered) {
                return Err(Error::Config(format!(
                    "field roles `{}` and `{}` both map to \"{}\"",
                    other, role, field
                )));
            }
            seen.push((role, lowered));
        }

        Ok(())
    }

    /// True if `field` is the history column.
    ///
    /// Matches by case-insensitive containment, so "Project History comments"
    /// counts as history just like "History comments".
    pub fn is_history(&self, field: &str) -> bool {
        field.to_lowercase().contains(&self.history.to_lowercase())
    }

    /// Find the dataset header playing `role`
    pub fn resolve<'a>(&self, role: FieldRole, headers: &'a [String]) -> Option<&'a str> {
        let found = match role {
            FieldRole::History => headers.iter().find(|h| self.is_history(h)),
            _ => {
                let wanted = self.field(role);
                headers.iter().find(|h| h.eq_ignore_ascii_case(wanted))
            }
        };
        found.map(String::as_str)
    }

    /// Like [`resolve`](Self::resolve) but an unmapped role is an error
    pub fn require<'a>(&self, role: FieldRole, headers: &'a [String]) -> Result<&'a str> {
        self.resolve(role, headers).ok_or_else(|| {
            Error::Config(format!(
                "no \"{}\" field (role `{}`) in the project data",
                self.field(role),
                role
            ))
        })
    }

    /// Header set for a new project: the dataset headers (or the expected
    /// fields when there is no data yet) plus any expected field missing
    pub fn form_headers(&self, dataset_headers: &[String]) -> Vec<String> {
        let mut headers = if dataset_headers.is_empty() {
            self.expected_fields()
        } else {
            dataset_headers.to_vec()
        };

        for role in FieldRole::ALL {
            if self.resolve(role, &headers).is_none() {
                headers.push(self.field(role).to_string());
            }
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(FieldRoles::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate() {
        let mut roles = FieldRoles::default();
        roles.year = "  ".to_string();
        assert!(matches!(roles.validate(), Err(Error::Config(_))));

        let mut roles = FieldRoles::default();
        roles.lead = "category".to_string();
        assert!(matches!(roles.validate(), Err(Error::Config(_))));

        let mut roles = FieldRoles::default();
        roles.name = "Project.Name".to_string();
        assert!(matches!(roles.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_history_matches_by_containment() {
        let roles = FieldRoles::default();
        assert!(roles.is_history("History comments"));
        assert!(roles.is_history("Project HISTORY COMMENTS"));
        assert!(!roles.is_history("History"));
    }

    #[test]
    fn test_resolve_is_case_insensitive_exact() {
        let roles = FieldRoles::default();
        let hs = headers(&["project name", "Sub Category", "CATEGORY"]);
        assert_eq!(roles.resolve(FieldRole::Name, &hs), Some("project name"));
        assert_eq!(roles.resolve(FieldRole::Category, &hs), Some("CATEGORY"));
        assert_eq!(roles.resolve(FieldRole::Contact, &hs), None);
        assert!(matches!(
            roles.require(FieldRole::Contact, &hs),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_form_headers_appends_missing_expected_fields() {
        let roles = FieldRoles::default();
        let hs = headers(&["Project Name", "Budget"]);
        let form = roles.form_headers(&hs);
        assert_eq!(&form[..2], &["Project Name".to_string(), "Budget".to_string()]);
        assert!(form.contains(&"History comments".to_string()));
        assert!(form.contains(&"Revit Version".to_string()));
        assert_eq!(form.len(), 9);

        assert_eq!(roles.form_headers(&[]), roles.expected_fields());
    }
}
