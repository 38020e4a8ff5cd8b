//! Project data endpoints
//!
//! Projects are addressed by composite id `<batchKey>_<index>`. Requests
//! that modify a project may carry the `recordKey` they last saw; if the id
//! now points at another record the request is refused with 409.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use bimdash_common::filter::{apply_filters, sort_items};
use bimdash_common::projects::FlatRecord;
use bimdash_common::CompositeId;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::TableQuery;
use crate::ingest::{ingest_csv, IngestReceipt};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub headers: Vec<String>,
    /// Records before filtering
    pub total: usize,
    pub records: Vec<FlatRecord>,
}

#[derive(Debug, Serialize)]
pub struct CreatedProject {
    pub id: CompositeId,
}

#[derive(Debug, Deserialize)]
pub struct NewField {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProjectRequest {
    /// Fields to overwrite
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Attribute to add
    #[serde(default)]
    pub new_field: Option<NewField>,
    #[serde(default)]
    pub record_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub comment: String,
    #[serde(default)]
    pub record_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub entry: String,
}

fn parse_id(raw: &str) -> ApiResult<CompositeId> {
    Ok(raw.parse::<CompositeId>()?)
}

/// GET /api/projects
///
/// Query: `sort=<field>`, `direction=asc|desc`, `filter.<field>=<text>`.
pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ProjectListResponse>> {
    let query = TableQuery::from_params(&params)?;
    let snapshot = state.projects.snapshot().await?;
    let total = snapshot.records.len();

    let mut records = apply_filters(snapshot.records, &query.filters, state.roles());
    if let Some(sort) = &query.sort {
        sort_items(&mut records, sort);
    }

    Ok(Json(ProjectListResponse {
        headers: snapshot.headers,
        total,
        records,
    }))
}

/// GET /api/projects/events
pub async fn project_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    bimdash_common::sse::snapshot_sse("ProjectSnapshot", state.projects.watch())
}

/// POST /api/projects/upload
///
/// Body is the CSV document as text.
pub async fn upload_csv(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<IngestReceipt>)> {
    let receipt = ingest_csv(&body, state.classifier.as_ref(), &state.projects).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /api/projects
pub async fn add_project(
    State(state): State<AppState>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<CreatedProject>)> {
    let id = state.projects.add_record(&fields).await?;
    Ok((StatusCode::CREATED, Json(CreatedProject { id })))
}

/// GET /api/projects/headers
pub async fn form_headers(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.projects.form_headers().await?))
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FlatRecord>> {
    let id = parse_id(&id)?;
    let fields = state.projects.get(&id).await?;
    Ok(Json(FlatRecord { id, fields }))
}

/// GET /api/projects/by-key/:key
///
/// Finds a project by the stable record key it was created with, so a
/// client refused with 409 can learn its new address.
pub async fn get_project_by_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<FlatRecord>> {
    Ok(Json(state.projects.locate(&key).await?))
}

/// PATCH /api/projects/:id
///
/// `fields` and `newField` are applied in one write.
pub async fn patch_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PatchProjectRequest>,
) -> ApiResult<Json<FlatRecord>> {
    let id = parse_id(&id)?;

    let mut fields = request.fields;
    if let Some(field) = request.new_field {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("field name is required".to_string()));
        }
        fields.insert(name.to_string(), field.value);
    }

    state
        .projects
        .patch(&id, fields, request.record_key.as_deref())
        .await?;

    let fields = state.projects.get(&id).await?;
    Ok(Json(FlatRecord { id, fields }))
}

/// POST /api/projects/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    let id = parse_id(&id)?;
    let entry = state
        .projects
        .append_comment(&id, &request.comment, request.record_key.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(CommentResponse { entry })))
}

/// Build project routes
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(add_project))
        .route("/api/projects/events", get(project_events))
        .route("/api/projects/upload", post(upload_csv))
        .route("/api/projects/headers", get(form_headers))
        .route("/api/projects/by-key/:key", get(get_project_by_key))
        .route("/api/projects/:id", get(get_project).patch(patch_project))
        .route("/api/projects/:id/comments", post(add_comment))
}
