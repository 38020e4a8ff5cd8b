//! Denormalized project store accessor
//!
//! Projects live under `ProjectData` as batches: each CSV upload writes one
//! list of records under a millisecond-timestamp key. Readers flatten all
//! batches into one list (batch key order, then list order) and address a
//! record by its [`CompositeId`].

use chrono::{SecondsFormat, Utc};
use futures::stream::{Stream, StreamExt};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fields::FieldRoles;
use crate::record::{is_blank, is_reserved_field, Record, RECORD_ID_FIELD, RECORD_KEY_FIELD};
use crate::record_id::CompositeId;
use crate::store::{validate_segment, TreeStore};
use crate::{Error, Result};

/// Top-level node holding all project batches
pub const PROJECT_ROOT: &str = "ProjectData";

/// A project together with its composite id
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub id: CompositeId,
    pub fields: Record,
}

impl FlatRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Stable key assigned at creation, if the record has one
    pub fn record_key(&self) -> Option<&str> {
        self.fields.get(RECORD_KEY_FIELD).and_then(Value::as_str)
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(RECORD_ID_FIELD, &self.id)?;
        map.end()
    }
}

/// Flattened view of every batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectSnapshot {
    /// Field names of the first record, bookkeeping fields excluded
    pub headers: Vec<String>,
    pub records: Vec<FlatRecord>,
}

impl ProjectSnapshot {
    /// Record carrying stable key `key`, at its current composite id
    pub fn find_by_key(&self, key: &str) -> Option<&FlatRecord> {
        self.records.iter().find(|r| r.record_key() == Some(key))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Flatten the raw `ProjectData` tree.
///
/// Non-list children are ignored. Null holes in a batch are skipped but
/// still consume an index, so ids of later records do not shift.
pub fn flatten(tree: Option<&Value>) -> ProjectSnapshot {
    let Some(Value::Object(batches)) = tree else {
        return ProjectSnapshot::default();
    };

    let mut records = Vec::new();
    for (batch_key, batch) in batches {
        let Value::Array(items) = batch else {
            debug!(batch_key = %batch_key, "skipping non-list project batch");
            continue;
        };

        for (index, item) in items.iter().enumerate() {
            let Value::Object(fields) = item else {
                continue;
            };
            let id = match CompositeId::new(batch_key.clone(), index) {
                Ok(id) => id,
                Err(e) => {
                    warn!(batch_key = %batch_key, "skipping unaddressable batch: {}", e);
                    break;
                }
            };
            let mut fields = fields.clone();
            fields.shift_remove(RECORD_ID_FIELD);
            records.push(FlatRecord { id, fields });
        }
    }

    let headers = records
        .first()
        .map(|first| {
            first
                .fields
                .keys()
                .filter(|k| !is_reserved_field(k))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    ProjectSnapshot { headers, records }
}

/// Result of a batch upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReceipt {
    pub batch_key: String,
    pub count: usize,
}

/// Read/write access to project batches
#[derive(Clone)]
pub struct ProjectStore {
    store: TreeStore,
    roles: FieldRoles,
}

impl ProjectStore {
    pub fn new(store: TreeStore, roles: FieldRoles) -> Self {
        Self { store, roles }
    }

    pub fn roles(&self) -> &FieldRoles {
        &self.roles
    }

    /// Raw `ProjectData` tree, as stored
    pub async fn raw_tree(&self) -> Result<Option<Value>> {
        self.store.get(PROJECT_ROOT).await
    }

    /// One-shot flattened read
    pub async fn snapshot(&self) -> Result<ProjectSnapshot> {
        Ok(flatten(self.raw_tree().await?.as_ref()))
    }

    /// Flattened snapshot now and after every change
    pub fn watch(&self) -> impl Stream<Item = Result<ProjectSnapshot>> + Send + 'static {
        self.store
            .watch(PROJECT_ROOT)
            .map(|tree| tree.map(|t| flatten(t.as_ref())))
    }

    /// Write `records` as a new batch keyed by the current millisecond, or
    /// the next free one after it
    pub async fn append_batch(&self, records: Vec<Record>) -> Result<BatchReceipt> {
        if records.is_empty() {
            return Err(Error::MalformedUpload("no data rows to upload".to_string()));
        }

        let count = records.len();
        let batch: Vec<Value> = records
            .into_iter()
            .map(|mut record| {
                record.insert(RECORD_KEY_FIELD.to_string(), Value::String(new_record_key()));
                Value::Object(record)
            })
            .collect();

        let batch_key = self
            .store
            .insert_unique_child(PROJECT_ROOT, Utc::now().timestamp_millis(), Value::Array(batch))
            .await?;

        info!(batch_key = %batch_key, count, "project batch stored");
        Ok(BatchReceipt { batch_key, count })
    }

    /// Header set offered when adding a single project
    pub async fn form_headers(&self) -> Result<Vec<String>> {
        let snapshot = self.snapshot().await?;
        Ok(self.roles.form_headers(&snapshot.headers))
    }

    /// Append one project to the most recent batch (or a new one).
    ///
    /// Every form header is written: supplied values as given, the rest as
    /// null, the history field as an empty list.
    pub async fn add_record(&self, input: &Map<String, Value>) -> Result<CompositeId> {
        let tree = self.raw_tree().await?;
        let snapshot = flatten(tree.as_ref());
        let headers = self.roles.form_headers(&snapshot.headers);

        let mut record = Record::new();
        let mut supplied = 0;
        for header in &headers {
            if self.roles.is_history(header) {
                record.insert(header.clone(), Value::Array(Vec::new()));
                continue;
            }
            let value = match input.get(header) {
                Some(Value::String(s)) if s.trim().is_empty() => Value::Null,
                Some(v) if !is_blank(v) => {
                    supplied += 1;
                    v.clone()
                }
                _ => Value::Null,
            };
            record.insert(header.clone(), value);
        }

        if supplied == 0 {
            return Err(Error::InvalidInput(
                "fill out at least one field to add a project".to_string(),
            ));
        }

        let ignored: Vec<&String> = input.keys().filter(|k| !headers.contains(k)).collect();
        if !ignored.is_empty() {
            debug!(?ignored, "ignoring fields outside the project headers");
        }

        record.insert(RECORD_KEY_FIELD.to_string(), Value::String(new_record_key()));

        let (batch_key, index) = match last_batch_key(tree.as_ref()) {
            Some(batch_key) => {
                let index = self
                    .store
                    .append_to_list(&format!("{}/{}", PROJECT_ROOT, batch_key), Value::Object(record))
                    .await?;
                (batch_key, index)
            }
            None => {
                let batch_key = self
                    .store
                    .insert_unique_child(
                        PROJECT_ROOT,
                        Utc::now().timestamp_millis(),
                        Value::Array(vec![Value::Object(record)]),
                    )
                    .await?;
                (batch_key, 0)
            }
        };

        let id = CompositeId::new(batch_key, index)?;
        info!(id = %id, "project added");
        Ok(id)
    }

    /// Stored fields of one project
    pub async fn get(&self, id: &CompositeId) -> Result<Record> {
        match self.store.get(&id.store_path()).await? {
            Some(Value::Object(record)) => Ok(record),
            _ => Err(Error::NotFound(format!("project {}", id))),
        }
    }

    /// Project carrying a stable record key, wherever it lives now
    pub async fn locate(&self, record_key: &str) -> Result<FlatRecord> {
        self.snapshot()
            .await?
            .find_by_key(record_key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project with key {}", record_key)))
    }

    /// Partial update of one project; sibling fields are untouched.
    ///
    /// New attributes are added the same way. The history field and
    /// bookkeeping fields cannot be patched. Nothing is written unless every
    /// field name is acceptable.
    pub async fn patch(
        &self,
        id: &CompositeId,
        fields: Map<String, Value>,
        expected_key: Option<&str>,
    ) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::InvalidInput("no fields to update".to_string()));
        }
        for field in fields.keys() {
            if self.roles.is_history(field) {
                return Err(Error::InvalidInput(format!(
                    "\"{}\" is changed by adding comments, not by editing",
                    field
                )));
            }
            if is_reserved_field(field) {
                return Err(Error::InvalidInput(format!("\"{}\" cannot be edited", field)));
            }
            validate_segment(field)?;
        }

        let record = self.get(id).await?;
        check_record_key(id, &record, expected_key)?;

        let count = fields.len();
        self.store.update(&id.store_path(), fields).await?;

        info!(id = %id, fields = count, "project updated");
        Ok(())
    }

    /// Append a timestamped entry to the project's history list.
    ///
    /// Returns the stored entry. A history field that is present but not a
    /// list is reported as [`Error::DataShape`] and left as it is.
    pub async fn append_comment(
        &self,
        id: &CompositeId,
        comment: &str,
        expected_key: Option<&str>,
    ) -> Result<String> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(Error::InvalidInput("comment cannot be empty".to_string()));
        }

        let record = self.get(id).await?;
        check_record_key(id, &record, expected_key)?;

        let history_field = record
            .keys()
            .find(|k| self.roles.is_history(k))
            .cloned()
            .unwrap_or_else(|| self.roles.history.clone());

        let entry = format!(
            "{}: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            comment
        );

        self.store
            .append_to_list(&id.field_path(&history_field), Value::String(entry.clone()))
            .await
            .map_err(|e| match e {
                Error::DataShape(_) => Error::DataShape(format!(
                    "\"{}\" of project {} is not a list",
                    history_field, id
                )),
                other => other,
            })?;

        info!(id = %id, "history comment added");
        Ok(entry)
    }
}

fn check_record_key(id: &CompositeId, record: &Record, expected_key: Option<&str>) -> Result<()> {
    let Some(expected) = expected_key else {
        return Ok(());
    };

    match record.get(RECORD_KEY_FIELD).and_then(Value::as_str) {
        Some(actual) if actual == expected => Ok(()),
        _ => Err(Error::StaleRecordId {
            id: id.to_string(),
            expected: expected.to_string(),
        }),
    }
}

fn new_record_key() -> String {
    Uuid::new_v4().to_string()
}

/// Last batch that can take another record
fn last_batch_key(tree: Option<&Value>) -> Option<String> {
    let Some(Value::Object(batches)) = tree else {
        return None;
    };

    batches
        .iter()
        .rev()
        .find(|(key, value)| value.is_array() && !key.contains('_'))
        .map(|(key, _)| key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::events::EventBus;
    use serde_json::json;

    async fn projects() -> (TreeStore, ProjectStore) {
        let pool = init_memory_database().await.unwrap();
        let store = TreeStore::new(pool, EventBus::new(32));
        (store.clone(), ProjectStore::new(store, FieldRoles::default()))
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn test_flatten_preserves_batch_then_list_order() {
        let tree = json!({
            "100": [{"N": "r0"}, {"N": "r1"}],
            "200": [{"N": "r2"}],
        });
        let snapshot = flatten(Some(&tree));

        let ids: Vec<String> = snapshot.records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["100_0", "100_1", "200_0"]);
        assert_eq!(snapshot.records[2].get("N"), Some(&json!("r2")));
        assert_eq!(snapshot.headers, vec!["N"]);
    }

    #[test]
    fn test_flatten_skips_holes_and_non_lists() {
        let tree = json!({
            "100": [{"N": "a"}, null, {"N": "c"}],
            "meta": {"note": "not a batch"},
        });
        let snapshot = flatten(Some(&tree));
        let ids: Vec<String> = snapshot.records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["100_0", "100_2"]);
        assert!(flatten(None).is_empty());
    }

    #[test]
    fn test_headers_exclude_bookkeeping_fields() {
        let tree = json!({"1": [{"A": 1, "__key__": "k", "__id__": "old", "B": 2}]});
        let snapshot = flatten(Some(&tree));
        assert_eq!(snapshot.headers, vec!["A", "B"]);

        let json = serde_json::to_value(&snapshot.records[0]).unwrap();
        assert_eq!(json["__id__"], json!("1_0"));
    }

    #[tokio::test]
    async fn test_append_batch_assigns_keys() {
        let (_, projects) = projects().await;
        let receipt = projects
            .append_batch(vec![record(json!({"Name": "A"})), record(json!({"Name": "B"}))])
            .await
            .unwrap();
        assert_eq!(receipt.count, 2);

        let snapshot = projects.snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].id.batch_key(), receipt.batch_key);
        assert!(snapshot.records.iter().all(|r| r.record_key().is_some()));
    }

    #[tokio::test]
    async fn test_append_empty_batch_is_malformed() {
        let (_, projects) = projects().await;
        let err = projects.append_batch(Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedUpload(_)));
    }

    #[tokio::test]
    async fn test_batch_keys_do_not_collide() {
        let (_, projects) = projects().await;
        let a = projects.append_batch(vec![record(json!({"N": 1}))]).await.unwrap();
        let b = projects.append_batch(vec![record(json!({"N": 2}))]).await.unwrap();
        assert_ne!(a.batch_key, b.batch_key);
        assert_eq!(projects.snapshot().await.unwrap().records.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_batches_keep_every_upload() {
        let (_, projects) = projects().await;

        for _ in 0..10 {
            let (a, b) = tokio::join!(
                projects.append_batch(vec![record(json!({"N": 1}))]),
                projects.append_batch(vec![record(json!({"N": 2}))]),
            );
            assert_ne!(a.unwrap().batch_key, b.unwrap().batch_key);
        }

        assert_eq!(projects.snapshot().await.unwrap().records.len(), 20);
    }

    #[tokio::test]
    async fn test_add_record_appends_to_last_batch() {
        let (store, projects) = projects().await;
        store
            .set("ProjectData/100", json!([{"Project Name": "A", "Budget": 5}]))
            .await
            .unwrap();
        store
            .set("ProjectData/200", json!([{"Project Name": "B", "Budget": 6}]))
            .await
            .unwrap();

        let input = record(json!({"Project Name": "C", "Budget": "", "Unknown": "x"}));
        let id = projects.add_record(&input).await.unwrap();
        assert_eq!(id.to_string(), "200_1");

        let stored = projects.get(&id).await.unwrap();
        assert_eq!(stored["Project Name"], json!("C"));
        assert_eq!(stored["Budget"], Value::Null);
        assert_eq!(stored["History comments"], json!([]));
        assert!(stored.get("Unknown").is_none());
        assert!(stored.get(RECORD_KEY_FIELD).is_some());
    }

    #[tokio::test]
    async fn test_add_record_creates_batch_when_empty() {
        let (_, projects) = projects().await;
        let id = projects
            .add_record(&record(json!({"Project Name": "Solo"})))
            .await
            .unwrap();
        assert_eq!(id.index(), 0);

        let snapshot = projects.snapshot().await.unwrap();
        assert_eq!(snapshot.headers, FieldRoles::default().expected_fields());
    }

    #[tokio::test]
    async fn test_add_record_requires_a_value() {
        let (_, projects) = projects().await;
        let err = projects
            .add_record(&record(json!({"Project Name": "  "})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(projects.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patch_updates_only_named_fields() {
        let (store, projects) = projects().await;
        store
            .set("ProjectData/100", json!([{"Name": "A", "Year": 2020, "History comments": ["x"]}]))
            .await
            .unwrap();
        let id: CompositeId = "100_0".parse().unwrap();

        projects
            .patch(&id, record(json!({"Year": 2024})), None)
            .await
            .unwrap();

        let stored = projects.get(&id).await.unwrap();
        assert_eq!(stored["Year"], json!(2024));
        assert_eq!(stored["Name"], json!("A"));
        assert_eq!(stored["History comments"], json!(["x"]));
    }

    #[tokio::test]
    async fn test_patch_rejects_history_and_missing_record() {
        let (store, projects) = projects().await;
        store.set("ProjectData/100", json!([{"Name": "A"}])).await.unwrap();
        let id: CompositeId = "100_0".parse().unwrap();

        let err = projects
            .patch(&id, record(json!({"History comments": []})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let missing: CompositeId = "100_5".parse().unwrap();
        let err = projects
            .patch(&missing, record(json!({"Name": "B"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_patch_with_bad_field_name_writes_nothing() {
        let (store, projects) = projects().await;
        store.set("ProjectData/100", json!([{"Name": "A"}])).await.unwrap();
        let id: CompositeId = "100_0".parse().unwrap();

        let err = projects
            .patch(&id, record(json!({"Name": "B", "bad.name": 1})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(projects.get(&id).await.unwrap()["Name"], json!("A"));

        projects
            .patch(&id, record(json!({"Client": "Acme"})), None)
            .await
            .unwrap();
        assert_eq!(projects.get(&id).await.unwrap()["Client"], json!("Acme"));
    }

    #[tokio::test]
    async fn test_append_comment() {
        let (store, projects) = projects().await;
        store.set("ProjectData/100", json!([{"Name": "A"}])).await.unwrap();
        let id: CompositeId = "100_0".parse().unwrap();

        let entry = projects.append_comment(&id, "kickoff", None).await.unwrap();
        assert!(entry.ends_with(": kickoff"));
        projects.append_comment(&id, "review", None).await.unwrap();

        let stored = projects.get(&id).await.unwrap();
        let history = stored["History comments"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], json!(entry));

        let err = projects.append_comment(&id, "   ", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_comment_on_non_list_history_is_rejected() {
        let (store, projects) = projects().await;
        store
            .set("ProjectData/100", json!([{"Name": "A", "History comments": "free text"}]))
            .await
            .unwrap();
        let id: CompositeId = "100_0".parse().unwrap();

        let err = projects.append_comment(&id, "note", None).await.unwrap_err();
        assert!(matches!(err, Error::DataShape(_)));
        assert_eq!(
            projects.get(&id).await.unwrap()["History comments"],
            json!("free text")
        );
    }

    #[tokio::test]
    async fn test_stale_record_key_detected() {
        let (store, projects) = projects().await;
        store
            .set("ProjectData/100", json!([{"Name": "A", "__key__": "k-a"}]))
            .await
            .unwrap();
        let id: CompositeId = "100_0".parse().unwrap();

        projects
            .patch(&id, record(json!({"Name": "A2"})), Some("k-a"))
            .await
            .unwrap();
        let err = projects
            .append_comment(&id, "hi", Some("k-other"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleRecordId { .. }));

        assert_eq!(projects.locate("k-a").await.unwrap().id, id);
        assert!(matches!(projects.locate("nope").await, Err(Error::NotFound(_))));
    }
}
