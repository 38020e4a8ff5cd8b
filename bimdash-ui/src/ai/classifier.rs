//! LLM-backed column type classifier

use async_trait::async_trait;
use bimdash_common::csv::TypeTag;
use serde_json::Value;
use tracing::info;

use super::{AiError, ColumnTypeClassifier, LlmClient};

const SYSTEM_PROMPT: &str = "You are an expert data analyst. Answer with a JSON object only.";

pub struct LlmColumnClassifier {
    client: LlmClient,
}

impl LlmColumnClassifier {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

fn classify_prompt(csv_text: &str) -> String {
    format!(
        "Given the following CSV data, determine the type of each column. \
         Possible types are string, number, boolean, and date. \
         Return a JSON object of the form {{\"columnTypes\": [...]}} with one type per column, \
         in column order.\n\nCSV Data:\n{}",
        csv_text
    )
}

/// Read `{"columnTypes": [...]}` (or a bare array); unknown names become string
fn decode_column_types(answer: &Value) -> Result<Vec<TypeTag>, AiError> {
    let items = match answer {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("columnTypes") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AiError::InvalidResponse(
                    "missing columnTypes array".to_string(),
                ))
            }
        },
        _ => return Err(AiError::InvalidResponse("expected a JSON object".to_string())),
    };

    Ok(items
        .iter()
        .map(|item| item.as_str().map(TypeTag::from_name).unwrap_or_default())
        .collect())
}

#[async_trait]
impl ColumnTypeClassifier for LlmColumnClassifier {
    async fn classify(&self, csv_text: &str) -> Result<Vec<TypeTag>, AiError> {
        let answer = self
            .client
            .complete_json(SYSTEM_PROMPT, &classify_prompt(csv_text))
            .await?;
        let tags = decode_column_types(&answer)?;

        info!(model = %self.client.model(), columns = tags.len(), "column types classified");
        Ok(tags)
    }
}
