//! Report generation and export endpoints

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bimdash_common::report::{render_report_text, report_file_name, ReportSection};
use bimdash_common::Error;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub sections: Vec<ReportSection>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub sections: Vec<ReportSection>,
}

/// POST /api/report
///
/// Sends the whole project tree to the report generator. No partial
/// report is returned on failure.
pub async fn generate_report(State(state): State<AppState>) -> ApiResult<Json<ReportResponse>> {
    let tree = match state.projects.raw_tree().await? {
        Some(Value::Object(batches)) if !batches.is_empty() => Value::Object(batches),
        _ => {
            return Err(Error::NotFound(
                "no project data found to generate a report from".to_string(),
            )
            .into())
        }
    };

    let project_data = serde_json::to_string(&tree).map_err(Error::from)?;
    info!(chars = project_data.len(), "generating project report");

    let sections = state.reporter.generate(&project_data).await?;

    Ok(Json(ReportResponse {
        sections,
        generated_at: Utc::now(),
    }))
}

/// POST /api/report/export
///
/// Renders sections as a plain-text download named after today's date.
pub async fn export_report(Json(request): Json<ExportRequest>) -> ApiResult<impl IntoResponse> {
    if request.sections.is_empty() {
        return Err(ApiError::BadRequest("no report sections to export".to_string()));
    }

    let file_name = report_file_name(Local::now().date_naive());
    let disposition = format!("attachment; filename=\"{}\"", file_name);

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        render_report_text(&request.sections),
    ))
}

/// Build report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/api/report", post(generate_report))
        .route("/api/report/export", post(export_report))
}
