//! Project handlers.
//!
//! GET  /projects                          - role-filtered list
//! GET  /projects/source/:source           - list by source (`?archived=1`)
//! POST /projects?source=GC                - submit (Engineer creates, OM stages)
//! GET  /projects/:id                      - detail
//! PUT  /projects/:id                      - edit details
//! POST /projects/:id/archive, /unarchive  - archive toggle
//! POST /projects/:id/status               - update lifecycle status
//! POST /projects/:id/approve-budget       - set approved budget
//! POST /projects/:id/files?name=          - attach file (raw body)
//! GET  /dashboard/costing                 - costing dashboard

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use powermason_core::principal::Principal;
use powermason_core::project::{CostingDashboard, Project, ProjectDraft, ProjectFile};
use powermason_core::service::Submission;
use powermason_core::types::{ProjectId, ProjectSource, ProjectStatus};
use powermason_core::ProjectService;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::truthy;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub source: Option<ProjectSource>,
}

#[derive(Debug, Deserialize)]
pub struct ArchivedQuery {
    #[serde(default)]
    pub archived: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBudgetRequest {
    #[serde(alias = "approved_budget")]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub name: String,
}

pub async fn list_projects(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(service.list_projects(&principal).await?))
}

pub async fn list_by_source(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(source): Path<String>,
    Query(query): Query<ArchivedQuery>,
) -> Result<Json<Vec<Project>>, AppError> {
    let source: ProjectSource = source.to_uppercase().parse().map_err(AppError::bad_request)?;
    let archived = truthy(query.archived.as_deref());
    Ok(Json(
        service
            .list_projects_by_source(&principal, source, archived)
            .await?,
    ))
}

pub async fn submit_project(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SourceQuery>,
    Json(draft): Json<ProjectDraft>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let source = query.source.unwrap_or(ProjectSource::GeneralContractor);
    let submission = service.submit_project(&principal, source, draft).await?;
    let status = match submission {
        Submission::Created(_) => StatusCode::CREATED,
        Submission::Staged(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(submission)))
}

pub async fn get_project(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(service.get_project(&principal, id).await?))
}

pub async fn edit_project(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
    Json(draft): Json<ProjectDraft>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(service.edit_project(&principal, id, draft).await?))
}

pub async fn archive_project(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(service.set_archived(&principal, id, true).await?))
}

pub async fn unarchive_project(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(service.set_archived(&principal, id, false).await?))
}

pub async fn update_status(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(service.update_status(&principal, id, body.status).await?))
}

pub async fn approve_budget(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
    Json(body): Json<ApproveBudgetRequest>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(service.approve_budget(&principal, id, body.amount).await?))
}

pub async fn attach_file(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProjectFile>), AppError> {
    let file = service
        .attach_file(&principal, id, &query.name, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}

pub async fn costing_dashboard(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CostingDashboard>, AppError> {
    Ok(Json(service.costing_dashboard(&principal).await?))
}
