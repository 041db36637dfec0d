//! Scope handlers.
//!
//! GET  /projects/:id/scopes              - list (`?include_deleted=1`)
//! POST /projects/:id/scopes              - create
//! PUT  /projects/:id/scopes/:scope_id    - edit name and weight
//! POST /projects/:id/scopes/delete       - soft or hard delete by policy
//! POST /projects/:id/scopes/restore      - undo a soft delete

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use powermason_core::principal::Principal;
use powermason_core::schedule::{Scope, ScopeDeleted};
use powermason_core::types::{ProjectId, ScopeId};
use powermason_core::ProjectService;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::truthy;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub include_deleted: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScopeRequest {
    pub name: String,
    pub weight: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DeleteScopeRequest {
    pub scope_id: ScopeId,
    /// Ask for a permanent delete even when the scope is in use.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreScopeRequest {
    pub scope_id: ScopeId,
}

pub async fn list_scopes(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Scope>>, AppError> {
    let include_deleted = truthy(query.include_deleted.as_deref());
    Ok(Json(
        service
            .list_scopes(&principal, project_id, include_deleted)
            .await?,
    ))
}

pub async fn create_scope(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<ScopeRequest>,
) -> Result<(StatusCode, Json<Scope>), AppError> {
    let scope = service
        .create_scope(&principal, project_id, &body.name, body.weight)
        .await?;
    Ok((StatusCode::CREATED, Json(scope)))
}

pub async fn edit_scope(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, scope_id)): Path<(ProjectId, ScopeId)>,
    Json(body): Json<ScopeRequest>,
) -> Result<Json<Scope>, AppError> {
    Ok(Json(
        service
            .edit_scope(&principal, project_id, scope_id, &body.name, body.weight)
            .await?,
    ))
}

pub async fn delete_scope(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<DeleteScopeRequest>,
) -> Result<Json<ScopeDeleted>, AppError> {
    Ok(Json(
        service
            .delete_scope(&principal, project_id, body.scope_id, body.force)
            .await?,
    ))
}

pub async fn restore_scope(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<RestoreScopeRequest>,
) -> Result<Json<Scope>, AppError> {
    Ok(Json(
        service
            .restore_scope(&principal, project_id, body.scope_id)
            .await?,
    ))
}
