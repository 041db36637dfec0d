//! Project cost handlers.
//!
//! GET  /projects/:id/costs
//! POST /projects/:id/costs
//! POST /projects/:id/costs/:cost_id/tasks   - split a cost onto a task
//! GET  /projects/:id/task-costs
//! GET  /projects/:id/cost-metrics

use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use powermason_core::costs::{CostInput, ProjectCost, ProjectCostMetrics, TaskCost};
use powermason_core::principal::Principal;
use powermason_core::types::{CostId, ProjectId, TaskId};
use powermason_core::ProjectService;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct TaskCostRequest {
    pub task_id: TaskId,
    pub allocated_amount: Decimal,
}

pub async fn list_costs(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Vec<ProjectCost>>, AppError> {
    Ok(Json(service.list_project_costs(&principal, id).await?))
}

pub async fn record_cost(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
    Json(body): Json<CostInput>,
) -> Result<(StatusCode, Json<ProjectCost>), AppError> {
    let cost = service.record_project_cost(&principal, id, body).await?;
    Ok((StatusCode::CREATED, Json(cost)))
}

pub async fn allocate_to_task(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((id, cost_id)): Path<(ProjectId, CostId)>,
    Json(body): Json<TaskCostRequest>,
) -> Result<(StatusCode, Json<TaskCost>), AppError> {
    let split = service
        .allocate_task_cost(&principal, id, cost_id, body.task_id, body.allocated_amount)
        .await?;
    Ok((StatusCode::CREATED, Json(split)))
}

pub async fn list_task_costs(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Vec<TaskCost>>, AppError> {
    Ok(Json(service.list_task_costs(&principal, id).await?))
}

pub async fn cost_metrics(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ProjectId>,
) -> Result<Json<ProjectCostMetrics>, AppError> {
    Ok(Json(service.project_cost_metrics(&principal, id).await?))
}
