//! Dashboard statistics endpoint

use axum::{extract::State, routing::get, Json, Router};
use bimdash_common::dashboard::{compute, DashboardStats};

use crate::{ApiResult, AppState};

/// GET /api/dashboard
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    let snapshot = state.projects.snapshot().await?;
    Ok(Json(compute(&snapshot, state.roles())))
}

/// Build dashboard routes
pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(dashboard))
}
