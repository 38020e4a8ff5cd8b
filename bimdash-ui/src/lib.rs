//! bimdash-ui library interface
//!
//! HTTP service over the project-metadata store. Exposed as a library so
//! integration tests can drive the router directly.

pub mod ai;
pub mod api;
pub mod error;
pub mod ingest;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use bimdash_common::contacts::ContactStore;
use bimdash_common::lookups::LookupStore;
use bimdash_common::projects::ProjectStore;
use bimdash_common::store::TreeStore;
use bimdash_common::users::UserStore;
use bimdash_common::FieldRoles;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::ai::{ColumnTypeClassifier, ReportGenerator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub projects: ProjectStore,
    pub lookups: LookupStore,
    pub contacts: ContactStore,
    pub users: UserStore,
    pub classifier: Arc<dyn ColumnTypeClassifier>,
    pub reporter: Arc<dyn ReportGenerator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: TreeStore,
        roles: FieldRoles,
        classifier: Arc<dyn ColumnTypeClassifier>,
        reporter: Arc<dyn ReportGenerator>,
    ) -> Self {
        Self {
            projects: ProjectStore::new(store.clone(), roles),
            lookups: LookupStore::new(store.clone()),
            contacts: ContactStore::new(store.clone()),
            users: UserStore::new(store),
            classifier,
            reporter,
            startup_time: Utc::now(),
        }
    }

    pub fn roles(&self) -> &FieldRoles {
        self.projects.roles()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::project_routes())
        .merge(api::lookup_routes())
        .merge(api::contact_routes())
        .merge(api::user_routes())
        .merge(api::dashboard_routes())
        .merge(api::report_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
