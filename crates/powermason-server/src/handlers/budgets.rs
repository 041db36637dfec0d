//! Budget planning, allocation ledger and expense handlers.
//!
//! GET    /projects/:id/budget-plan
//! POST   /projects/:id/budgets
//! PUT    /projects/:id/budgets/:budget_id
//! DELETE /projects/:id/budgets/:budget_id
//! GET    /projects/:id/allocations
//! GET    /projects/:id/budgets/:budget_id/allocations?page=
//! POST   /projects/:id/budgets/:budget_id/allocations
//! POST   /projects/:id/budgets/:budget_id/allocations/:alloc_id/{soft-delete,restore,hard-delete}
//! POST   /projects/:id/expenses
//! GET    /projects/:id/categories/:budget_id/allocation

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use powermason_core::budget::{
    Allocation, AllocationLedger, AllocationRecorded, BudgetCategory, BudgetPlan,
    CategoryAllocation, CategorySummary, ExpenseRecorded,
};
use powermason_core::principal::Principal;
use powermason_core::service::ExpenseInput;
use powermason_core::types::{AllocationId, BudgetId, CostCategory, ProjectId, ScopeId};
use powermason_core::warning::Warned;
use powermason_core::ProjectService;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AddCategoryRequest {
    pub scope_id: ScopeId,
    pub category: CostCategory,
    pub planned_amount: Decimal,
    #[serde(default)]
    pub category_other: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlannedAmountRequest {
    pub planned_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub date_allocated: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<usize>,
}

pub async fn budget_plan(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<BudgetPlan>, AppError> {
    Ok(Json(service.budget_plan(&principal, project_id).await?))
}

pub async fn add_category(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<AddCategoryRequest>,
) -> Result<(StatusCode, Json<Warned<BudgetCategory>>), AppError> {
    let added = service
        .add_budget_category(
            &principal,
            project_id,
            body.scope_id,
            body.category,
            body.planned_amount,
            body.category_other,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn edit_planned_amount(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id)): Path<(ProjectId, BudgetId)>,
    Json(body): Json<PlannedAmountRequest>,
) -> Result<Json<Warned<BudgetCategory>>, AppError> {
    Ok(Json(
        service
            .edit_planned_amount(&principal, project_id, budget_id, body.planned_amount)
            .await?,
    ))
}

pub async fn delete_category(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id)): Path<(ProjectId, BudgetId)>,
) -> Result<StatusCode, AppError> {
    service
        .delete_budget_category(&principal, project_id, budget_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn allocation_overview(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<Vec<CategorySummary>>, AppError> {
    Ok(Json(
        service.allocation_overview(&principal, project_id).await?,
    ))
}

pub async fn allocation_ledger(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id)): Path<(ProjectId, BudgetId)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<AllocationLedger>, AppError> {
    let page = query.page.unwrap_or(1);
    Ok(Json(
        service
            .allocation_ledger(&principal, project_id, budget_id, page)
            .await?,
    ))
}

pub async fn allocate(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id)): Path<(ProjectId, BudgetId)>,
    Json(body): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<Warned<AllocationRecorded>>), AppError> {
    let recorded = service
        .allocate(
            &principal,
            project_id,
            budget_id,
            body.amount,
            body.note,
            body.date_allocated,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn soft_delete_allocation(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id, allocation_id)): Path<(ProjectId, BudgetId, AllocationId)>,
) -> Result<Json<Allocation>, AppError> {
    Ok(Json(
        service
            .soft_delete_allocation(&principal, project_id, budget_id, allocation_id)
            .await?,
    ))
}

pub async fn restore_allocation(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id, allocation_id)): Path<(ProjectId, BudgetId, AllocationId)>,
) -> Result<Json<Allocation>, AppError> {
    Ok(Json(
        service
            .restore_allocation(&principal, project_id, budget_id, allocation_id)
            .await?,
    ))
}

pub async fn hard_delete_allocation(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id, allocation_id)): Path<(ProjectId, BudgetId, AllocationId)>,
) -> Result<StatusCode, AppError> {
    service
        .hard_delete_allocation(&principal, project_id, budget_id, allocation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_expense(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<ProjectId>,
    Json(input): Json<ExpenseInput>,
) -> Result<(StatusCode, Json<Warned<ExpenseRecorded>>), AppError> {
    let recorded = service
        .record_expense(&principal, project_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn category_allocation(
    Extension(service): Extension<Arc<ProjectService>>,
    Extension(principal): Extension<Principal>,
    Path((project_id, budget_id)): Path<(ProjectId, BudgetId)>,
) -> Result<Json<CategoryAllocation>, AppError> {
    Ok(Json(
        service
            .category_allocation(&principal, project_id, budget_id)
            .await?,
    ))
}
