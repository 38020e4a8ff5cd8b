//! Lookup list endpoints
//!
//! `:list` is one of `bim-leads`, `categories`, `key-contacts`,
//! `revit-versions`.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use bimdash_common::lookups::LookupList;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub list: LookupList,
    pub values: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLookupRequest {
    pub value: String,
}

/// Value to remove, passed as a query parameter so any text is accepted
#[derive(Debug, Deserialize)]
pub struct RemoveLookupQuery {
    pub value: String,
}

fn parse_list(raw: &str) -> ApiResult<LookupList> {
    Ok(raw.parse::<LookupList>()?)
}

/// GET /api/lookups/:list
pub async fn get_list(
    State(state): State<AppState>,
    Path(list): Path<String>,
) -> ApiResult<Json<LookupResponse>> {
    let list = parse_list(&list)?;
    let values = state.lookups.list(list).await?;
    Ok(Json(LookupResponse { list, values }))
}

/// POST /api/lookups/:list
pub async fn add_value(
    State(state): State<AppState>,
    Path(list): Path<String>,
    Json(request): Json<AddLookupRequest>,
) -> ApiResult<(StatusCode, Json<LookupResponse>)> {
    let list = parse_list(&list)?;
    let values = state.lookups.add(list, &request.value).await?;
    Ok((StatusCode::CREATED, Json(LookupResponse { list, values })))
}

/// DELETE /api/lookups/:list?value=<value>
pub async fn remove_value(
    State(state): State<AppState>,
    Path(list): Path<String>,
    Query(query): Query<RemoveLookupQuery>,
) -> ApiResult<Json<LookupResponse>> {
    let list = parse_list(&list)?;
    let values = state.lookups.remove(list, &query.value).await?;
    Ok(Json(LookupResponse { list, values }))
}

/// POST /api/lookups/:list/sync
pub async fn sync_list(
    State(state): State<AppState>,
    Path(list): Path<String>,
) -> ApiResult<Json<LookupResponse>> {
    let list = parse_list(&list)?;
    let snapshot = state.projects.snapshot().await?;
    let values = state.lookups.sync(list, &snapshot, state.roles()).await?;
    Ok(Json(LookupResponse { list, values }))
}

/// GET /api/lookups/:list/events
pub async fn list_events(
    State(state): State<AppState>,
    Path(list): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let list = parse_list(&list)?;
    Ok(bimdash_common::sse::snapshot_sse(
        "LookupList",
        state.lookups.watch(list),
    ))
}

/// Build lookup list routes
pub fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/lookups/:list",
            get(get_list).post(add_value).delete(remove_value),
        )
        .route("/api/lookups/:list/sync", post(sync_list))
        .route("/api/lookups/:list/events", get(list_events))
}
