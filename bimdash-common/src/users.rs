//! Revit user records
//!
//! Open records stored under generated keys in `RevitUsers`. The key is
//! exposed as `id` and never stored inside the record itself.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::filter::FieldSource;
use crate::record::{is_blank, Record};
use crate::store::{validate_segment, TreeStore};
use crate::{Error, Result};

pub const USERS_ROOT: &str = "RevitUsers";

/// Name of the synthetic id field
pub const USER_ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub fields: Record,
}

impl Serialize for UserRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(USER_ID_FIELD, &self.id)?;
        map.end()
    }
}

impl FieldSource for UserRecord {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserList {
    /// Union of all user field names, in first-seen order
    pub headers: Vec<String>,
    pub users: Vec<UserRecord>,
}

#[derive(Clone)]
pub struct UserStore {
    store: TreeStore,
}

impl UserStore {
    pub fn new(store: TreeStore) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<UserList> {
        let entries = match self.store.get(USERS_ROOT).await? {
            None => return Ok(UserList::default()),
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                return Err(Error::DataShape(format!(
                    "{} is not a mapping of user records",
                    USERS_ROOT
                )))
            }
        };

        let mut headers: Vec<String> = Vec::new();
        let mut users = Vec::with_capacity(entries.len());

        for (id, value) in entries {
            let Value::Object(mut fields) = value else {
                continue;
            };
            fields.shift_remove(USER_ID_FIELD);
            for key in fields.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
            users.push(UserRecord { id, fields });
        }

        Ok(UserList { headers, users })
    }

    /// Store a new user under a generated key
    pub async fn add(&self, fields: Map<String, Value>) -> Result<UserRecord> {
        let fields = clean_fields(fields)?;
        if fields.values().all(is_empty_input) {
            return Err(Error::InvalidInput(
                "fill out at least one field to add a user".to_string(),
            ));
        }

        let id = self.store.push(USERS_ROOT, Value::Object(fields.clone())).await?;

        info!(id = %id, "user added");
        Ok(UserRecord { id, fields })
    }

    /// Merge `fields` into an existing user
    pub async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let fields = clean_fields(fields)?;
        if fields.is_empty() {
            return Err(Error::InvalidInput("no fields to update".to_string()));
        }
        let path = self.existing_path(id).await?;

        self.store.update(&path, fields).await?;

        info!(id = %id, "user updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self.existing_path(id).await?;
        self.store.remove(&path).await?;

        info!(id = %id, "user deleted");
        Ok(())
    }

    async fn existing_path(&self, id: &str) -> Result<String> {
        validate_segment(id)?;
        let path = format!("{}/{}", USERS_ROOT, id);
        match self.store.get(&path).await? {
            Some(_) => Ok(path),
            None => Err(Error::NotFound(format!("user {}", id))),
        }
    }
}

/// Drop the synthetic id and check every key is storable
fn clean_fields(mut fields: Map<String, Value>) -> Result<Map<String, Value>> {
    fields.shift_remove(USER_ID_FIELD);
    for key in fields.keys() {
        validate_segment(key)?;
    }
    Ok(fields)
}

fn is_empty_input(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        other => is_blank(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::events::EventBus;
    use serde_json::json;

    async fn users() -> UserStore {
        let pool = init_memory_database().await.unwrap();
        UserStore::new(TreeStore::new(pool, EventBus::new(8)))
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[tokio::test]
    async fn test_add_list_update_delete() {
        let users = users().await;

        let ann = users
            .add(fields(json!({"Name": "Ann", "Office": "Leeds", "id": "ignored"})))
            .await
            .unwrap();
        let bob = users
            .add(fields(json!({"Name": "Bob", "Revit": "Medium"})))
            .await
            .unwrap();
        assert!(!ann.fields.contains_key("id"));

        let list = users.list().await.unwrap();
        assert_eq!(list.users.len(), 2);
        assert_eq!(list.headers, vec!["Name", "Office", "Revit"]);

        users
            .update(&ann.id, fields(json!({"Office": "York"})))
            .await
            .unwrap();
        let list = users.list().await.unwrap();
        assert_eq!(list.users[0].fields["Office"], json!("York"));
        assert_eq!(list.users[0].fields["Name"], json!("Ann"));

        users.delete(&bob.id).await.unwrap();
        assert_eq!(users.list().await.unwrap().users.len(), 1);
        assert!(matches!(users.delete(&bob.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_add_rejects_all_empty() {
        let users = users().await;
        let err = users
            .add(fields(json!({"Name": " ", "Office": null})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_serializes_id_field() {
        let user = UserRecord {
            id: "k1".to_string(),
            fields: fields(json!({"Name": "Ann"})),
        };
        assert_eq!(serde_json::to_value(&user).unwrap(), json!({"Name": "Ann", "id": "k1"}));
    }
}
