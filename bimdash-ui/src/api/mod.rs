//! HTTP API handlers for bimdash-ui

pub mod contacts;
pub mod dashboard;
pub mod health;
pub mod lookups;
pub mod projects;
pub mod report;
pub mod users;

pub use contacts::contact_routes;
pub use dashboard::dashboard_routes;
pub use health::health_routes;
pub use lookups::lookup_routes;
pub use projects::project_routes;
pub use report::report_routes;
pub use users::user_routes;

use std::collections::HashMap;

use bimdash_common::filter::{Filters, SortConfig, SortDirection};

use crate::ApiError;

/// Query parameter prefix for per-field filters (`filter.Category=civic`)
pub const FILTER_PREFIX: &str = "filter.";

/// Table query of a list endpoint: `sort`, `direction` and `filter.<field>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableQuery {
    pub filters: Filters,
    pub sort: Option<SortConfig>,
}

impl TableQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let filters: Filters = params
            .iter()
            .filter_map(|(name, query)| {
                name.strip_prefix(FILTER_PREFIX)
                    .filter(|field| !field.is_empty())
                    .map(|field| (field.to_string(), query.clone()))
            })
            .collect();

        let direction = match params.get("direction").map(|d| d.to_lowercase()).as_deref() {
            None | Some("asc") | Some("ascending") => SortDirection::Ascending,
            Some("desc") | Some("descending") => SortDirection::Descending,
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "direction must be asc or desc, got \"{}\"",
                    other
                )))
            }
        };

        let sort = params
            .get("sort")
            .filter(|key| !key.is_empty())
            .map(|key| SortConfig::new(key.clone(), direction));

        Ok(Self { filters, sort })
    }
}
