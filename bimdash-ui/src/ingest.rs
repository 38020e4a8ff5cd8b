//! CSV ingestion pipeline: classify, parse, store one batch

use bimdash_common::csv::{self, TypeTag};
use bimdash_common::projects::ProjectStore;
use bimdash_common::{Error, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::ai::ColumnTypeClassifier;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub batch_key: String,
    pub count: usize,
    pub headers: Vec<String>,
    pub column_types: Vec<TypeTag>,
}

/// Store the rows of `text` as a new batch.
///
/// A classifier failure is not fatal: every column is then read as text.
/// Nothing is written for an empty document or one without data rows.
pub async fn ingest_csv(
    text: &str,
    classifier: &dyn ColumnTypeClassifier,
    projects: &ProjectStore,
) -> Result<IngestReceipt> {
    if text.trim().is_empty() {
        return Err(Error::MalformedUpload("the file is empty".to_string()));
    }

    let column_types = match classifier.classify(text).await {
        Ok(tags) => tags,
        Err(e) => {
            warn!("Column type classification failed, reading all columns as text: {}", e);
            Vec::new()
        }
    };

    let parsed = csv::parse(text, &column_types, projects.roles());
    if parsed.records.is_empty() {
        return Err(Error::MalformedUpload(
            "no data was found in the CSV to upload".to_string(),
        ));
    }

    let receipt = projects.append_batch(parsed.records).await?;
    info!(
        batch_key = %receipt.batch_key,
        count = receipt.count,
        columns = parsed.headers.len(),
        "CSV upload stored"
    );

    Ok(IngestReceipt {
        batch_key: receipt.batch_key,
        count: receipt.count,
        headers: parsed.headers,
        column_types,
    })
}
