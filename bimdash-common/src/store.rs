//! Realtime key/value tree store
//!
//! Data is a JSON tree addressed by slash-separated paths
//! (`ProjectData/1700000000000/3/Category`). Each top-level node is one row
//! in `tree_nodes`; writes load that document, change it in memory and write
//! it back inside a transaction, then announce the change on the
//! [`EventBus`].
//!
//! Semantics follow a hosted realtime database:
//! - object keys keep insertion order
//! - writing `null` removes the node
//! - array elements are addressed by index; writing to index `len` appends,
//!   removing an element leaves a null hole so later indices stay stable
//! - `watch` yields the current snapshot, then a fresh one after every
//!   change under the watched root

use std::sync::Arc;

use chrono::Utc;
use futures::stream::Stream;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{EventBus, StoreEvent};
use crate::{Error, Result};

const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];

/// Reject keys the store cannot hold
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidInput("empty path segment".to_string()));
    }
    if let Some(c) = segment.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control()) {
        return Err(Error::InvalidInput(format!(
            "key \"{}\" contains forbidden character {:?}",
            segment, c
        )));
    }
    Ok(())
}

/// Split and validate a slash-separated path
pub fn parse_path(path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("store path must name a top-level node".to_string()));
    }

    trimmed
        .split('/')
        .map(|segment| validate_segment(segment).map(|_| segment.to_string()))
        .collect()
}

/// Handle to the tree store
#[derive(Clone)]
pub struct TreeStore {
    pool: SqlitePool,
    events: EventBus,
    write_lock: Arc<Mutex<()>>,
}

impl TreeStore {
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        Self {
            pool,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// One-shot read; `None` when nothing is stored at `path`
    pub async fn get(&self, path: &str) -> Result<Option<Value>> {
        let segments = parse_path(path)?;
        let (root, rest) = split_root(&segments)?;

        let doc = match self.load_root(root).await? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        Ok(node_at(&doc, rest).filter(|v| !v.is_null()).cloned())
    }

    /// Overwrite the node at `path`; `null` removes it
    pub async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.modify(path, |doc, rest| write_at(doc, rest, value)).await
    }

    /// Merge `fields` into the object at `path`, leaving other children alone
    pub async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        for key in fields.keys() {
            validate_segment(key)?;
        }

        self.modify(path, |doc, rest| {
            let mut child_path = rest.to_vec();
            for (key, value) in fields {
                child_path.push(key);
                write_at(doc, &child_path, value)?;
                child_path.pop();
            }
            Ok(())
        })
        .await
    }

    /// Store `value` under a new generated child key of `path`
    pub async fn push(&self, path: &str, value: Value) -> Result<String> {
        let key = generate_key();
        let child = key.clone();

        self.modify(path, |doc, rest| {
            let mut child_path = rest.to_vec();
            child_path.push(child);
            write_at(doc, &child_path, value)
        })
        .await?;

        Ok(key)
    }

    /// Store `value` under the first free numeric child key of `path`,
    /// counting up from `first_key`. Returns the key used.
    ///
    /// The free key is chosen inside the write, so concurrent callers never
    /// share one.
    pub async fn insert_unique_child(
        &self,
        path: &str,
        first_key: i64,
        value: Value,
    ) -> Result<String> {
        self.modify(path, move |doc, rest| {
            let mut key = first_key;
            let mut child_path = rest.to_vec();
            child_path.push(key.to_string());

            while node_at(doc, &child_path).is_some_and(|v| !v.is_null()) {
                key += 1;
                child_path.pop();
                child_path.push(key.to_string());
            }

            write_at(doc, &child_path, value)?;
            Ok(key.to_string())
        })
        .await
    }

    /// Delete the node at `path`
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.set(path, Value::Null).await
    }

    /// Append `value` to the list at `path` and return its index.
    ///
    /// A missing node starts a new list; any other non-list node is a
    /// [`Error::DataShape`] and nothing is written.
    pub async fn append_to_list(&self, path: &str, value: Value) -> Result<usize> {
        let display_path = path.to_string();

        self.modify(path, move |doc, rest| {
            let existing_len = match node_at(doc, rest) {
                Some(Value::Array(items)) => Some(items.len()),
                Some(Value::Null) | None => None,
                Some(other) => {
                    return Err(Error::DataShape(format!(
                        "{} holds {} where a list was expected",
                        display_path,
                        kind_of(other)
                    )))
                }
            };

            match existing_len {
                Some(len) => {
                    if let Some(Value::Array(items)) = node_at_mut(doc, rest) {
                        items.push(value);
                    }
                    Ok(len)
                }
                None => {
                    write_at(doc, rest, Value::Array(vec![value]))?;
                    Ok(0)
                }
            }
        })
        .await
    }

    /// Snapshot stream for a top-level node.
    ///
    /// Yields the current value immediately, then a new snapshot after each
    /// change under `root`. The stream ends when the event bus is dropped.
    pub fn watch(&self, root: &str) -> impl Stream<Item = Result<Option<Value>>> + Send + 'static {
        let store = self.clone();
        let root = root.to_string();
        let mut rx = self.events.subscribe();

        async_stream::stream! {
            yield store.get(&root).await;

            loop {
                match rx.recv().await {
                    Ok(event) if event.root() == root => yield store.get(&root).await,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(root = %root, skipped, "watcher lagged, re-reading snapshot");
                        yield store.get(&root).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    async fn load_root(&self, root: &str) -> Result<Option<Value>> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT value FROM tree_nodes WHERE root = ?")
                .bind(root)
                .fetch_optional(&self.pool)
                .await?;

        text.map(|t| serde_json::from_str(&t).map_err(Error::from))
            .transpose()
    }

    /// Read-modify-write of one top-level document
    async fn modify<T>(
        &self,
        path: &str,
        apply: impl FnOnce(&mut Value, &[String]) -> Result<T>,
    ) -> Result<T> {
        let segments = parse_path(path)?;
        let (root, rest) = split_root(&segments)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT value FROM tree_nodes WHERE root = ?")
                .bind(root)
                .fetch_optional(&mut *tx)
                .await?;

        let mut doc = match existing {
            Some(text) => serde_json::from_str(&text)?,
            None => Value::Null,
        };

        let output = apply(&mut doc, rest)?;

        if is_empty_node(&doc) {
            sqlx::query("DELETE FROM tree_nodes WHERE root = ?")
                .bind(root)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO tree_nodes (root, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(root) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(root)
            .bind(serde_json::to_string(&doc)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(path = %path, "store write committed");

        self.events.emit_lossy(StoreEvent::changed(root.clone()));

        Ok(output)
    }
}

fn split_root(segments: &[String]) -> Result<(&String, &[String])> {
    segments
        .split_first()
        .ok_or_else(|| Error::InvalidInput("store path must name a top-level node".to_string()))
}

fn generate_key() -> String {
    // Millisecond prefix keeps generated keys roughly chronological
    format!(
        "{:011x}{}",
        Utc::now().timestamp_millis(),
        &Uuid::new_v4().simple().to_string()[..9]
    )
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Node at `segments` below `node`, if present
pub fn node_at<'a>(node: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(node, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn node_at_mut<'a>(node: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    segments.iter().try_fold(node, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Write `value` at `segments` below `node`, creating objects on the way
fn write_at(node: &mut Value, segments: &[String], value: Value) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    if !node.is_object() && !node.is_array() {
        if value.is_null() {
            // Nothing below a leaf to remove
            return Ok(());
        }
        *node = Value::Object(Map::new());
    }

    match node {
        Value::Object(map) => {
            if value.is_null() && rest.is_empty() {
                map.shift_remove(head);
                return Ok(());
            }
            if value.is_null() && !map.contains_key(head) {
                return Ok(());
            }
            let child = map.entry(head.clone()).or_insert(Value::Null);
            write_at(child, rest, value)
        }
        Value::Array(items) => {
            let index: usize = head.parse().map_err(|_| {
                Error::DataShape(format!("\"{}\" is not a list index", head))
            })?;

            if index >= items.len() {
                if value.is_null() {
                    return Ok(());
                }
                if index > items.len() {
                    warn!(index, len = items.len(), "sparse list write, padding with nulls");
                }
                items.resize(index + 1, Value::Null);
            }

            if rest.is_empty() && value.is_null() {
                items[index] = Value::Null;
                return Ok(());
            }
            write_at(&mut items[index], rest, value)
        }
        _ => Err(Error::Internal("container expected".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use futures::StreamExt;
    use serde_json::json;

    async fn store() -> TreeStore {
        let pool = init_memory_database().await.unwrap();
        TreeStore::new(pool, EventBus::new(32))
    }

    #[test]
    fn test_parse_path_rejects_forbidden_keys() {
        assert_eq!(parse_path("/a/b/").unwrap(), vec!["a", "b"]);
        assert!(parse_path("").is_err());
        assert!(parse_path("a//b").is_err());
        assert!(parse_path("a/b.c").is_err());
        assert!(parse_path("a/$b").is_err());
    }

    #[tokio::test]
    async fn test_set_and_get_nested() {
        let store = store().await;
        store.set("ProjectData/100", json!([{"Name": "A"}])).await.unwrap();

        assert_eq!(store.get("ProjectData/100/0/Name").await.unwrap(), Some(json!("A")));
        assert_eq!(store.get("ProjectData/200").await.unwrap(), None);
        assert_eq!(store.get("Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_leaves_siblings() {
        let store = store().await;
        store
            .set("ProjectData/1/0", json!({"Name": "A", "Year": 2020}))
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert("Year".to_string(), json!(2021));
        fields.insert("Owner".to_string(), json!("Kim"));
        store.update("ProjectData/1/0", fields).await.unwrap();

        assert_eq!(
            store.get("ProjectData/1/0").await.unwrap(),
            Some(json!({"Name": "A", "Year": 2021, "Owner": "Kim"}))
        );
    }

    #[tokio::test]
    async fn test_key_order_is_insertion_order() {
        let store = store().await;
        store.set("ProjectData/300", json!([])).await.unwrap();
        store.set("ProjectData/100", json!([])).await.unwrap();
        store.set("ProjectData/200", json!([])).await.unwrap();

        let tree = store.get("ProjectData").await.unwrap().unwrap();
        let keys: Vec<&String> = tree.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["300", "100", "200"]);
    }

    #[tokio::test]
    async fn test_remove_array_element_leaves_hole() {
        let store = store().await;
        store.set("L", json!(["a", "b", "c"])).await.unwrap();
        store.remove("L/1").await.unwrap();
        assert_eq!(store.get("L").await.unwrap(), Some(json!(["a", null, "c"])));
    }

    #[tokio::test]
    async fn test_remove_last_child_drops_root() {
        let store = store().await;
        store.set("RevitUsers/u1", json!({"Name": "A"})).await.unwrap();
        store.remove("RevitUsers/u1").await.unwrap();
        assert_eq!(store.get("RevitUsers").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_unique_child_skips_taken_keys() {
        let store = store().await;
        store.set("ProjectData/500", json!(["a"])).await.unwrap();
        store.set("ProjectData/501", json!(["b"])).await.unwrap();

        let key = store
            .insert_unique_child("ProjectData", 500, json!(["c"]))
            .await
            .unwrap();
        assert_eq!(key, "502");
        assert_eq!(store.get("ProjectData/500").await.unwrap(), Some(json!(["a"])));
        assert_eq!(store.get("ProjectData/502").await.unwrap(), Some(json!(["c"])));

        let fresh = store
            .insert_unique_child("ProjectData", 900, json!(["d"]))
            .await
            .unwrap();
        assert_eq!(fresh, "900");
    }

    #[tokio::test]
    async fn test_push_generates_distinct_keys() {
        let store = store().await;
        let a = store.push("RevitUsers", json!({"Name": "A"})).await.unwrap();
        let b = store.push("RevitUsers", json!({"Name": "B"})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(
            store.get(&format!("RevitUsers/{}/Name", b)).await.unwrap(),
            Some(json!("B"))
        );
    }

    #[tokio::test]
    async fn test_append_to_list() {
        let store = store().await;
        assert_eq!(store.append_to_list("P/1/0/History", json!("x")).await.unwrap(), 0);
        assert_eq!(store.append_to_list("P/1/0/History", json!("y")).await.unwrap(), 1);
        assert_eq!(store.get("P/1/0/History").await.unwrap(), Some(json!(["x", "y"])));
    }

    #[tokio::test]
    async fn test_append_to_non_list_is_data_shape_error() {
        let store = store().await;
        store.set("P/1/0/History", json!("oops")).await.unwrap();

        let err = store.append_to_list("P/1/0/History", json!("x")).await.unwrap_err();
        assert!(matches!(err, Error::DataShape(_)));
        assert_eq!(store.get("P/1/0/History").await.unwrap(), Some(json!("oops")));
    }

    #[tokio::test]
    async fn test_watch_yields_initial_and_changed_snapshots() {
        let store = store().await;
        store.set("Categories", json!(["A"])).await.unwrap();

        let stream = store.watch("Categories");
        futures::pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Some(json!(["A"])));

        store.set("BIMLeads", json!(["x"])).await.unwrap();
        store.set("Categories", json!(["A", "B"])).await.unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second, Some(json!(["A", "B"])));
    }

    #[tokio::test]
    async fn test_write_emits_event() {
        let bus = EventBus::new(8);
        let store = TreeStore::new(init_memory_database().await.unwrap(), bus.clone());
        let mut rx = bus.subscribe();
        store.set("KeyContacts", json!(["Ann"])).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().root(), "KeyContacts");
    }
}
