//! Lookup lists
//!
//! Four top-level string lists feed the selection widgets of the add and
//! edit forms. They are independent of the project data: nothing enforces
//! that a project's category is in `Categories`.
//!
//! Lists are stored as arrays only. Older data may hold a mapping of
//! generated keys to names; [`LookupStore::normalize_legacy`] rewrites those
//! once at startup.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::fields::{FieldRole, FieldRoles};
use crate::projects::ProjectSnapshot;
use crate::record::{display_value, is_truthy};
use crate::store::TreeStore;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupList {
    BimLeads,
    Categories,
    KeyContacts,
    RevitVersions,
}

impl LookupList {
    pub const ALL: [LookupList; 4] = [
        LookupList::BimLeads,
        LookupList::Categories,
        LookupList::KeyContacts,
        LookupList::RevitVersions,
    ];

    /// Top-level store node
    pub fn root(&self) -> &'static str {
        match self {
            LookupList::BimLeads => "BIMLeads",
            LookupList::Categories => "Categories",
            LookupList::KeyContacts => "KeyContacts",
            LookupList::RevitVersions => "RevitVersions",
        }
    }

    /// URL form
    pub fn slug(&self) -> &'static str {
        match self {
            LookupList::BimLeads => "bim-leads",
            LookupList::Categories => "categories",
            LookupList::KeyContacts => "key-contacts",
            LookupList::RevitVersions => "revit-versions",
        }
    }

    /// Project field role whose values the list collects
    pub fn role(&self) -> FieldRole {
        match self {
            LookupList::BimLeads => FieldRole::Lead,
            LookupList::Categories => FieldRole::Category,
            LookupList::KeyContacts => FieldRole::Contact,
            LookupList::RevitVersions => FieldRole::Version,
        }
    }
}

impl fmt::Display for LookupList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for LookupList {
    type Err = Error;

    /// Accepts the slug or the store node name
    fn from_str(s: &str) -> Result<Self> {
        LookupList::ALL
            .into_iter()
            .find(|list| list.slug() == s || list.root() == s)
            .ok_or_else(|| Error::NotFound(format!("lookup list \"{}\"", s)))
    }
}

/// Sorted, non-empty values from a stored list node
fn decode_list(list: LookupList, node: Option<Value>) -> Result<Vec<String>> {
    let items = match node {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(Error::DataShape(format!(
                "{} is not stored as a list",
                list.root()
            )))
        }
    };

    let mut values: Vec<String> = items
        .iter()
        .filter(|v| is_truthy(v))
        .map(|v| display_value(Some(v)))
        .collect();
    values.sort();
    Ok(values)
}

fn encode_list(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

#[derive(Clone)]
pub struct LookupStore {
    store: TreeStore,
}

impl LookupStore {
    pub fn new(store: TreeStore) -> Self {
        Self { store }
    }

    pub async fn list(&self, list: LookupList) -> Result<Vec<String>> {
        decode_list(list, self.store.get(list.root()).await?)
    }

    /// List contents now and after every change
    pub fn watch(&self, list: LookupList) -> impl Stream<Item = Result<Vec<String>>> + Send + 'static {
        self.store
            .watch(list.root())
            .map(move |node| node.and_then(|n| decode_list(list, n)))
    }

    /// Add a trimmed value; duplicates are detected case-insensitively
    pub async fn add(&self, list: LookupList, value: &str) -> Result<Vec<String>> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidInput(format!("{} entry cannot be empty", list)));
        }

        let mut values = self.list(list).await?;
        let lowered = value.to_lowercase();
        if values.iter().any(|v| v.to_lowercase() == lowered) {
            return Err(Error::Conflict(format!("\"{}\" is already in {}", value, list)));
        }

        values.push(value.to_string());
        values.sort();
        self.store.set(list.root(), encode_list(&values)).await?;

        info!(list = %list, value = %value, "lookup entry added");
        Ok(values)
    }

    /// Remove an exact match
    pub async fn remove(&self, list: LookupList, value: &str) -> Result<Vec<String>> {
        let values = self.list(list).await?;
        if !values.iter().any(|v| v == value) {
            return Err(Error::NotFound(format!("\"{}\" in {}", value, list)));
        }

        let remaining: Vec<String> = values.into_iter().filter(|v| v != value).collect();
        self.store.set(list.root(), encode_list(&remaining)).await?;

        info!(list = %list, value = %value, "lookup entry removed");
        Ok(remaining)
    }

    /// Merge every value the projects use for the list's role into the list
    pub async fn sync(
        &self,
        list: LookupList,
        snapshot: &ProjectSnapshot,
        roles: &FieldRoles,
    ) -> Result<Vec<String>> {
        if snapshot.is_empty() {
            return Err(Error::NotFound("no project data to sync from".to_string()));
        }
        let field = roles.require(list.role(), &snapshot.headers)?;

        let mut merged: BTreeSet<String> = self.list(list).await?.into_iter().collect();
        let before = merged.len();
        for record in &snapshot.records {
            if let Some(value) = record.get(field).filter(|v| is_truthy(v)) {
                merged.insert(display_value(Some(value)));
            }
        }

        let values: Vec<String> = merged.into_iter().collect();
        self.store.set(list.root(), encode_list(&values)).await?;

        info!(list = %list, field = %field, added = values.len() - before, "lookup list synced");
        Ok(values)
    }

    /// Rewrite mapping-shaped lists as arrays; returns how many were rewritten
    pub async fn normalize_legacy(&self) -> Result<usize> {
        let mut rewritten = 0;

        for list in LookupList::ALL {
            let Some(Value::Object(entries)) = self.store.get(list.root()).await? else {
                continue;
            };

            let values: Vec<Value> = entries
                .into_iter()
                .map(|(_, v)| v)
                .filter(is_truthy)
                .collect();
            let count = values.len();
            self.store.set(list.root(), Value::Array(values)).await?;

            info!(list = %list, entries = count, "converted legacy lookup mapping to list");
            rewritten += 1;
        }

        Ok(rewritten)
    }
}
