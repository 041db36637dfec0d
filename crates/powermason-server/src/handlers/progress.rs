//! Progress update handlers.
//!
//! POST /tasks/:task_id/progress       - PM submits an update
//! GET  /progress/review               - pending queue
//! GET  /progress/history              - all updates (PMs: their own)
//! GET  /progress/pending-count        - queue badge
//! POST /progress/:update_id/approve   - apply to the task
//! POST /progress/:update_id/reject
//! GET  /progress/:update_id/files     - proof attached to an update
//! POST /progress/:update_id/files?name=

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use powermason_core::principal::Principal;
use powermason_core::schedule::{ProgressFile, ProgressReport, ProgressUpdate};
use powermason_core::types::{TaskId, UpdateId};
use powermason_core::ProjectService;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::projects::FileQuery;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress_percent: Decimal,
    #[serde(default)]
    pub remarks: Option<String>,
}

pub async fn submit_update(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(task_id): Path<TaskId>,
    Json(body): Json<ProgressRequest>,
) -> Result<(StatusCode, Json<ProgressReport>), AppError> {
    let report = service
        .submit_progress_update(
            &principal,
            task_id,
            body.progress_percent,
            body.remarks,
            Vec::new(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn review_queue(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ProgressUpdate>>, AppError> {
    Ok(Json(service.review_queue(&principal).await?))
}

pub async fn history(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ProgressUpdate>>, AppError> {
    Ok(Json(service.progress_history(&principal).await?))
}

pub async fn pending_count(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = service.pending_update_count(&principal).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn approve(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(update_id): Path<UpdateId>,
) -> Result<Json<ProgressUpdate>, AppError> {
    Ok(Json(service.approve_update(&principal, update_id).await?))
}

pub async fn reject(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(update_id): Path<UpdateId>,
) -> Result<Json<ProgressUpdate>, AppError> {
    Ok(Json(service.reject_update(&principal, update_id).await?))
}

pub async fn list_files(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(update_id): Path<UpdateId>,
) -> Result<Json<Vec<ProgressFile>>, AppError> {
    Ok(Json(service.progress_files(&principal, update_id).await?))
}

pub async fn attach_file(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(update_id): Path<UpdateId>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProgressFile>), AppError> {
    let file = service
        .attach_progress_proof(&principal, update_id, &query.name, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}
