//! Task handlers.
//!
//! GET  /projects/:id/tasks                      - list (`?include_archived=1`)
//! POST /projects/:id/tasks                      - create
//! PUT  /projects/:id/tasks/:task_id             - edit
//! POST /projects/:id/tasks/archive, /unarchive  - bulk toggle

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use powermason_core::principal::Principal;
use powermason_core::schedule::{Task, TaskInput};
use powermason_core::types::{ProjectId, TaskId};
use powermason_core::warning::Warned;
use powermason_core::ProjectService;
use serde::Deserialize;

use super::truthy;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub include_archived: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskSelection {
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
}

pub async fn list_tasks(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let include_archived = truthy(query.include_archived.as_deref());
    Ok(Json(
        service
            .list_tasks(&principal, project_id, include_archived)
            .await?,
    ))
}

pub async fn create_task(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(input): Json<TaskInput>,
) -> Result<(StatusCode, Json<Warned<Task>>), AppError> {
    let task = service.create_task(&principal, project_id, input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn edit_task(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, task_id)): Path<(ProjectId, TaskId)>,
    Json(input): Json<TaskInput>,
) -> Result<Json<Warned<Task>>, AppError> {
    Ok(Json(
        service
            .edit_task(&principal, project_id, task_id, input)
            .await?,
    ))
}

async fn toggle_archived(
    service: &ProjectService,
    principal: &Principal,
    project_id: ProjectId,
    selection: TaskSelection,
    archived: bool,
) -> Result<Json<serde_json::Value>, AppError> {
    let changed = service
        .set_tasks_archived(principal, project_id, &selection.task_ids, archived)
        .await?;
    Ok(Json(serde_json::json!({ "changed": changed, "archived": archived })))
}

pub async fn archive_tasks(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(selection): Json<TaskSelection>,
) -> Result<Json<serde_json::Value>, AppError> {
    toggle_archived(&service, &principal, project_id, selection, true).await
}

pub async fn unarchive_tasks(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(selection): Json<TaskSelection>,
) -> Result<Json<serde_json::Value>, AppError> {
    toggle_archived(&service, &principal, project_id, selection, false).await
}
