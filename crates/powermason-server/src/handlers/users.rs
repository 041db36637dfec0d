//! GET /users/project-managers?q= - project manager lookup for assignment.

use std::sync::Arc;

use axum::extract::Query;
use axum::{Extension, Json};
use powermason_core::principal::Principal;
use powermason_core::types::UserProfile;
use powermason_core::ProjectService;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_project_managers(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    Ok(Json(
        service
            .search_project_managers(&principal, &query.q)
            .await?,
    ))
}
