//! Port traits. `powermason-postgres` implements these against Postgres;
//! [`crate::memory::MemoryStore`] implements them in-process.
//!
//! Every method whose name describes a check-then-write (`insert_allocation`,
//! `insert_expense`, `insert_task_cost`, `delete_scope`, `delete_budget_category`,
//! `approve_staging`, `reject_staging`, `approve_progress_update`, ...) must
//! run the check and the write under one lock on the parent row.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::budget::{
    Allocation, AllocationRecorded, BudgetCategory, CategoryTotals, Expense, ExpenseRecorded,
    NewAllocation, NewBudgetCategory, NewExpense,
};
use crate::costs::{NewProjectCost, NewTaskCost, ProjectCost, TaskCost};
use crate::error::Result;
use crate::project::{NewProject, Project, ProjectCosting, ProjectDraft, ProjectFile, ProjectFilter};
use crate::schedule::{
    NewProgressUpdate, NewScope, NewTask, ProgressFile, ProgressUpdate, Scope, ScopeDeleted, Task,
    TaskInput,
};
use crate::staging::{ApprovedStaging, NewStaging, Resolution, StagingDecision, StagingProject};
use crate::types::{
    AllocationId, BudgetId, Client, CostId, ProjectId, ProjectStatus, ReviewStatus, Role,
    ScopeId, StagingId, TaskId, UpdateId, UserId, UserProfile,
};

#[async_trait]
pub trait ProjectStore: Send + Sync {
    // ── Users & clients ──────────────────────────────────────

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>>;

    async fn users_with_role(&self, role: Role) -> Result<Vec<UserProfile>>;

    /// Case-insensitive match on full name or e-mail.
    async fn search_users(&self, role: Role, query: &str) -> Result<Vec<UserProfile>>;

    async fn client_by_email(&self, email: &str) -> Result<Option<Client>>;

    // ── Projects ─────────────────────────────────────────────

    /// Insert and assign `project_code` in the same transaction.
    async fn insert_project(&self, new: NewProject) -> Result<Project>;

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>>;

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;

    async fn update_project_details(&self, id: ProjectId, details: &ProjectDraft)
        -> Result<Project>;

    async fn set_archived(&self, id: ProjectId, archived: bool) -> Result<Project>;

    async fn set_status(&self, id: ProjectId, status: ProjectStatus) -> Result<Project>;

    async fn set_approved_budget(&self, id: ProjectId, amount: Decimal) -> Result<Project>;

    async fn set_progress(
        &self,
        id: ProjectId,
        progress: Decimal,
        status: ProjectStatus,
    ) -> Result<Project>;

    async fn insert_project_file(&self, project_id: ProjectId, path: &str) -> Result<ProjectFile>;

    /// Planned and active-allocated totals per project matching `filter`,
    /// counting only budgets under active scopes, plus project cost totals.
    async fn project_costing(&self, filter: &ProjectFilter) -> Result<Vec<ProjectCosting>>;

    // ── Staging ──────────────────────────────────────────────

    async fn insert_staging(&self, new: NewStaging) -> Result<StagingProject>;

    async fn get_staging(&self, id: StagingId) -> Result<Option<StagingProject>>;

    async fn list_staging(&self, status: ReviewStatus) -> Result<Vec<StagingProject>>;

    /// Create the live project, delete the staging row and log the decision.
    async fn approve_staging(&self, id: StagingId, resolution: Resolution)
        -> Result<ApprovedStaging>;

    /// Delete the staging row and log the decision.
    async fn reject_staging(&self, id: StagingId, resolution: Resolution)
        -> Result<StagingDecision>;

    async fn staging_decisions(&self, staging_id: StagingId) -> Result<Vec<StagingDecision>>;

    // ── Scopes ───────────────────────────────────────────────

    async fn insert_scope(&self, new: NewScope) -> Result<Scope>;

    async fn get_scope(&self, id: ScopeId) -> Result<Option<Scope>>;

    async fn list_scopes(&self, project_id: ProjectId, include_deleted: bool)
        -> Result<Vec<Scope>>;

    async fn update_scope(&self, id: ScopeId, name: &str, weight: Decimal) -> Result<Scope>;

    /// Soft delete when tasks exist, hard delete (cascading to budget
    /// categories) otherwise; refuse a forced hard delete with tasks.
    async fn delete_scope(&self, id: ScopeId, force: bool) -> Result<ScopeDeleted>;

    async fn restore_scope(&self, id: ScopeId) -> Result<Scope>;

    // ── Budget categories ────────────────────────────────────

    async fn insert_budget_category(&self, new: NewBudgetCategory) -> Result<BudgetCategory>;

    async fn get_budget_category(&self, id: BudgetId) -> Result<Option<BudgetCategory>>;

    async fn list_budget_categories(&self, project_id: ProjectId) -> Result<Vec<BudgetCategory>>;

    async fn update_planned_amount(&self, id: BudgetId, amount: Decimal)
        -> Result<BudgetCategory>;

    /// Refused while any allocation, active or soft-deleted, exists.
    async fn delete_budget_category(&self, id: BudgetId) -> Result<()>;

    // ── Allocations ──────────────────────────────────────────

    async fn insert_allocation(&self, new: NewAllocation) -> Result<AllocationRecorded>;

    async fn get_allocation(&self, id: AllocationId) -> Result<Option<Allocation>>;

    /// Every allocation of the category, active and soft-deleted.
    async fn list_allocations(&self, budget_id: BudgetId) -> Result<Vec<Allocation>>;

    async fn soft_delete_allocation(&self, id: AllocationId) -> Result<Allocation>;

    async fn restore_allocation(&self, id: AllocationId) -> Result<Allocation>;

    async fn hard_delete_allocation(&self, id: AllocationId) -> Result<()>;

    // ── Expenses ─────────────────────────────────────────────

    /// Refused when the category has no active allocation.
    async fn insert_expense(&self, new: NewExpense) -> Result<ExpenseRecorded>;

    async fn list_expenses(&self, budget_id: BudgetId) -> Result<Vec<Expense>>;

    async fn category_totals(&self, budget_id: BudgetId) -> Result<CategoryTotals>;

    // ── Project costs ────────────────────────────────────────

    async fn insert_project_cost(&self, new: NewProjectCost) -> Result<ProjectCost>;

    async fn get_project_cost(&self, id: CostId) -> Result<Option<ProjectCost>>;

    /// Newest `date_incurred` first.
    async fn list_project_costs(&self, project_id: ProjectId) -> Result<Vec<ProjectCost>>;

    /// Refused when the cost's task allocations would exceed its amount.
    async fn insert_task_cost(&self, new: NewTaskCost) -> Result<TaskCost>;

    /// Task allocations for every task of the project.
    async fn list_task_costs(&self, project_id: ProjectId) -> Result<Vec<TaskCost>>;

    // ── Tasks ────────────────────────────────────────────────

    async fn insert_task(&self, new: NewTask) -> Result<Task>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    async fn list_tasks(&self, project_id: ProjectId, include_archived: bool)
        -> Result<Vec<Task>>;

    async fn update_task(&self, id: TaskId, input: &TaskInput) -> Result<Task>;

    /// Returns the number of tasks changed.
    async fn set_tasks_archived(
        &self,
        project_id: ProjectId,
        ids: &[TaskId],
        archived: bool,
    ) -> Result<u64>;

    // ── Progress updates ─────────────────────────────────────

    async fn insert_progress_update(&self, new: NewProgressUpdate) -> Result<ProgressUpdate>;

    async fn get_progress_update(&self, id: UpdateId) -> Result<Option<ProgressUpdate>>;

    async fn list_progress_updates(
        &self,
        status: Option<ReviewStatus>,
        reported_by: Option<UserId>,
    ) -> Result<Vec<ProgressUpdate>>;

    /// Mark approved and copy the reported percent onto the task.
    async fn approve_progress_update(
        &self,
        id: UpdateId,
        reviewer: UserId,
    ) -> Result<(ProgressUpdate, Task)>;

    async fn reject_progress_update(&self, id: UpdateId, reviewer: UserId)
        -> Result<ProgressUpdate>;

    async fn count_pending_updates(&self) -> Result<u64>;

    async fn insert_progress_file(&self, update_id: UpdateId, path: &str) -> Result<ProgressFile>;

    async fn list_progress_files(&self, update_id: UpdateId) -> Result<Vec<ProgressFile>>;
}

/// Delivery is someone else's problem; this only records the message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: UserId, message: &str, link: Option<&str>) -> Result<()>;
}
