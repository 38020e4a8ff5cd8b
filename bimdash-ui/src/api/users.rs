//! Revit user endpoints

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use bimdash_common::filter::{apply_filters, sort_items};
use bimdash_common::users::{UserList, UserRecord};
use serde_json::{Map, Value};

use super::TableQuery;
use crate::{ApiResult, AppState};

/// GET /api/users
///
/// Same table query as the project list.
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<UserList>> {
    let query = TableQuery::from_params(&params)?;
    let list = state.users.list().await?;

    let mut users = apply_filters(list.users, &query.filters, state.roles());
    if let Some(sort) = &query.sort {
        sort_items(&mut users, sort);
    }

    Ok(Json(UserList {
        headers: list.headers,
        users,
    }))
}

/// POST /api/users
pub async fn add_user(
    State(state): State<AppState>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<UserRecord>)> {
    let user = state.users.add(fields).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PATCH /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<StatusCode> {
    state.users.update(&id, fields).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(add_user))
        .route("/api/users/:id", patch(update_user).delete(delete_user))
}
