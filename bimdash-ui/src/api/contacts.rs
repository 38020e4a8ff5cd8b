//! Key contact endpoints: people analytics and the details directory

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bimdash_common::contacts::{summarize, ContactDirectory, ContactFilters, PeopleSummary};

use crate::{ApiResult, AppState};

/// GET /api/contacts
///
/// Query: `contact`, `team`, `revitLevel`, `rhinoLevel`, `position`.
pub async fn people_summary(
    State(state): State<AppState>,
    Query(filters): Query<ContactFilters>,
) -> ApiResult<Json<PeopleSummary>> {
    let snapshot = state.projects.snapshot().await?;
    let directory = state.contacts.directory().await?;

    let mut summary = summarize(&snapshot, state.roles(), &directory)?;
    summary.contacts.retain(|c| filters.matches(c));

    Ok(Json(summary))
}

/// GET /api/contacts/details
pub async fn get_details(State(state): State<AppState>) -> ApiResult<Json<ContactDirectory>> {
    Ok(Json(state.contacts.directory().await?))
}

/// PUT /api/contacts/details
///
/// Replaces the whole directory.
pub async fn save_details(
    State(state): State<AppState>,
    Json(directory): Json<ContactDirectory>,
) -> ApiResult<Json<ContactDirectory>> {
    state.contacts.save_directory(&directory).await?;
    Ok(Json(directory))
}

/// Build contact routes
pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/api/contacts", get(people_summary))
        .route("/api/contacts/details", get(get_details).put(save_details))
}
