//! AI collaborators
//!
//! Column-type classification and report generation are delegated to an
//! OpenAI-compatible chat completions endpoint. Handlers only see the
//! traits, so tests swap in fakes.

pub mod classifier;
pub mod llm;
pub mod report;

use async_trait::async_trait;
use bimdash_common::csv::TypeTag;
use bimdash_common::report::ReportSection;
use thiserror::Error;

pub use classifier::LlmColumnClassifier;
pub use llm::LlmClient;
pub use report::LlmReportGenerator;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    RequestFailed(String),

    #[error("AI rate limit exceeded")]
    RateLimited,

    #[error("AI model unavailable")]
    Unavailable,

    #[error("AI response could not be read: {0}")]
    InvalidResponse(String),
}

/// Guesses one type tag per CSV column
#[async_trait]
pub trait ColumnTypeClassifier: Send + Sync {
    async fn classify(&self, csv_text: &str) -> Result<Vec<TypeTag>, AiError>;
}

/// Writes an analyst report over the raw project tree
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// `project_data` is the whole `ProjectData` tree as JSON text
    async fn generate(&self, project_data: &str) -> Result<Vec<ReportSection>, AiError>;
}
