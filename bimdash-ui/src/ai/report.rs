//! LLM-backed project report generator

use async_trait::async_trait;
use bimdash_common::report::ReportSection;
use serde::Deserialize;
use tracing::info;

use super::{AiError, LlmClient, ReportGenerator};

const SYSTEM_PROMPT: &str = "You are an expert project analyst. Answer with a JSON object only.";

#[derive(Debug, Deserialize)]
struct ReportAnswer {
    report: Vec<ReportSection>,
}

pub struct LlmReportGenerator {
    client: LlmClient,
}

impl LlmReportGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

fn report_prompt(project_data: &str) -> String {
    format!(
        "Given the following project data in JSON format, generate a comprehensive report.\n\
         \n\
         The report should include:\n\
         1. A high-level summary of the entire project portfolio. Use the \"FileText\" icon.\n\
         2. A breakdown of projects by category, including counts and key highlights. Use the \"FolderTree\" icon.\n\
         3. An analysis of team distribution, identifying key contacts and their project load. Use the \"Users\" icon.\n\
         4. An overview of the different Revit versions being used across projects. Use the \"Library\" icon.\n\
         5. Any potential risks or inconsistencies you identify in the data (e.g., missing information, unusual data points). Use the \"AlertTriangle\" icon.\n\
         \n\
         Give each section a title and plain-text content. Return a JSON object of the form \
         {{\"report\": [{{\"title\": \"...\", \"content\": \"...\", \"icon\": \"...\"}}]}}. \
         Icons must be one of FileText, FolderTree, Users, Library, AlertTriangle, LineChart, \
         BarChart, PieChart, ListTree, User, Group, AlertCircle, Home.\n\
         \n\
         Project Data:\n{}",
        project_data
    )
}

#[async_trait]
impl ReportGenerator for LlmReportGenerator {
    async fn generate(&self, project_data: &str) -> Result<Vec<ReportSection>, AiError> {
        let answer = self
            .client
            .complete_json(SYSTEM_PROMPT, &report_prompt(project_data))
            .await?;
        let answer: ReportAnswer =
            serde_json::from_value(answer).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        info!(model = %self.client.model(), sections = answer.report.len(), "project report generated");
        Ok(answer.report)
    }
}
