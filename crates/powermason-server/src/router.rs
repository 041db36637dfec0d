//! Router construction for the Powermason server.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Extension, Router,
};
use powermason_core::ProjectService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    budgets, costs, health, progress, projects, scopes, staging, tasks, users,
};
use crate::middleware::jwt::{jwt_auth, JwtConfig};

/// Build the full axum router with all routes and middleware.
pub fn build_router(service: Arc<ProjectService>, jwt_config: JwtConfig) -> Router {
    // Routes that require JWT authentication
    let protected = Router::new()
        // Projects
        .route(
            "/projects",
            get(projects::list_projects).post(projects::submit_project),
        )
        .route("/projects/source/:source", get(projects::list_by_source))
        .route(
            "/projects/:id",
            get(projects::get_project).put(projects::edit_project),
        )
        .route("/projects/:id/archive", post(projects::archive_project))
        .route("/projects/:id/unarchive", post(projects::unarchive_project))
        .route("/projects/:id/status", post(projects::update_status))
        .route("/projects/:id/approve-budget", post(projects::approve_budget))
        .route("/projects/:id/files", post(projects::attach_file))
        // Budget plan and ledger
        .route("/projects/:id/budget-plan", get(budgets::budget_plan))
        .route("/projects/:id/budgets", post(budgets::add_category))
        .route(
            "/projects/:id/budgets/:budget_id",
            put(budgets::edit_planned_amount).delete(budgets::delete_category),
        )
        .route("/projects/:id/allocations", get(budgets::allocation_overview))
        .route(
            "/projects/:id/budgets/:budget_id/allocations",
            get(budgets::allocation_ledger).post(budgets::allocate),
        )
        .route(
            "/projects/:id/budgets/:budget_id/allocations/:alloc_id/soft-delete",
            post(budgets::soft_delete_allocation),
        )
        .route(
            "/projects/:id/budgets/:budget_id/allocations/:alloc_id/restore",
            post(budgets::restore_allocation),
        )
        .route(
            "/projects/:id/budgets/:budget_id/allocations/:alloc_id/hard-delete",
            post(budgets::hard_delete_allocation),
        )
        .route("/projects/:id/expenses", post(budgets::record_expense))
        .route(
            "/projects/:id/categories/:budget_id/allocation",
            get(budgets::category_allocation),
        )
        // Project costs
        .route(
            "/projects/:id/costs",
            get(costs::list_costs).post(costs::record_cost),
        )
        .route(
            "/projects/:id/costs/:cost_id/tasks",
            post(costs::allocate_to_task),
        )
        .route("/projects/:id/task-costs", get(costs::list_task_costs))
        .route("/projects/:id/cost-metrics", get(costs::cost_metrics))
        // Scopes
        .route(
            "/projects/:id/scopes",
            get(scopes::list_scopes).post(scopes::create_scope),
        )
        .route("/projects/:id/scopes/delete", post(scopes::delete_scope))
        .route("/projects/:id/scopes/restore", post(scopes::restore_scope))
        .route("/projects/:id/scopes/:scope_id", put(scopes::edit_scope))
        // Tasks and progress
        .route(
            "/projects/:id/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route("/projects/:id/tasks/archive", post(tasks::archive_tasks))
        .route("/projects/:id/tasks/unarchive", post(tasks::unarchive_tasks))
        .route("/projects/:id/tasks/:task_id", put(tasks::edit_task))
        .route("/tasks/:task_id/progress", post(progress::submit_update))
        .route("/progress/review", get(progress::review_queue))
        .route("/progress/history", get(progress::history))
        .route("/progress/pending-count", get(progress::pending_count))
        .route("/progress/:update_id/approve", post(progress::approve))
        .route("/progress/:update_id/reject", post(progress::reject))
        .route(
            "/progress/:update_id/files",
            get(progress::list_files).post(progress::attach_file),
        )
        // Staging review
        .route("/staging", get(staging::list_pending))
        .route("/staging/:id", get(staging::get_staging))
        .route("/staging/:id/history", get(staging::history))
        .route("/staging/:id/approve", post(staging::approve))
        .route("/staging/:id/reject", post(staging::reject))
        // Dashboards and lookups
        .route("/dashboard/costing", get(projects::costing_dashboard))
        .route(
            "/users/project-managers",
            get(users::search_project_managers),
        )
        .layer(axum_mw::from_fn(jwt_auth))
        .layer(Extension(jwt_config));

    // Public routes (no auth)
    let public = Router::new().route("/health", get(health::health));

    public
        .merge(protected)
        .layer(Extension(service))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http",
                    request_id = %uuid::Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
}
