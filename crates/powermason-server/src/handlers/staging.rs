//! Staging review handlers (Engineers only).
//!
//! GET  /staging                 - pending drafts (`?order=asc|desc`)
//! GET  /staging/:id             - detail
//! GET  /staging/:id/history     - recorded decisions
//! POST /staging/:id/approve     - create the live project
//! POST /staging/:id/reject      - discard with optional comments

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use powermason_core::principal::Principal;
use powermason_core::staging::{ApprovedStaging, SortOrder, StagingDecision, StagingProject};
use powermason_core::types::StagingId;
use powermason_core::ProjectService;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub comments: Option<String>,
}

pub async fn list_pending(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<StagingProject>>, AppError> {
    Ok(Json(
        service
            .list_pending_staging(&principal, query.order)
            .await?,
    ))
}

pub async fn get_staging(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<StagingId>,
) -> Result<Json<StagingProject>, AppError> {
    Ok(Json(service.get_staging(&principal, id).await?))
}

pub async fn history(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<StagingId>,
) -> Result<Json<Vec<StagingDecision>>, AppError> {
    Ok(Json(service.staging_history(&principal, id).await?))
}

pub async fn approve(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<StagingId>,
) -> Result<Json<ApprovedStaging>, AppError> {
    Ok(Json(service.approve_staging(&principal, id).await?))
}

pub async fn reject(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<StagingId>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<StagingDecision>, AppError> {
    let Json(body) = body.unwrap_or_default();
    Ok(Json(
        service
            .reject_staging(&principal, id, body.comments)
            .await?,
    ))
}
