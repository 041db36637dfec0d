//! In-process [`ProjectStore`] and [`Notifier`].
//!
//! One mutex guards the whole state, so every check-then-write method holds
//! it across the check and the write. Used by the test suites and by the
//! server when `POWERMASON_STORE=memory`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::budget::{
    Allocation, AllocationRecorded, BudgetCategory, CategoryTotals, Expense,
    ExpenseRecorded, NewAllocation, NewBudgetCategory, NewExpense,
};
use crate::costs::{
    check_task_allocation, order_costs, NewProjectCost, NewTaskCost, ProjectCost,
    ProjectCostMetrics, TaskCost,
};
use crate::error::{PowermasonError, Result};
use crate::ports::{Notifier, ProjectStore};
use crate::project::{
    format_project_code, NewProject, Project, ProjectCosting, ProjectDraft, ProjectFile,
    ProjectFilter,
};
use crate::schedule::{
    duplicate_scope_name, plan_scope_deletion, NewProgressUpdate, NewScope, NewTask,
    ProgressFile, ProgressUpdate, Scope, ScopeDeleted, ScopeDeletion, Task, TaskInput,
};
use crate::staging::{ApprovedStaging, NewStaging, Resolution, StagingDecision, StagingProject};
use crate::types::{
    AllocationId, BudgetId, Client, ClientId, CostId, ExpenseId, Notification, ProjectId,
    ProjectSource, ProjectStatus, RecordState, ReviewStatus, Role, ScopeId, StagingId,
    TaskId, TaskStatus, UpdateId, UserId, UserProfile,
};

#[derive(Default)]
struct Sequences {
    user: i64,
    client: i64,
    project: i64,
    file: i64,
    staging: i64,
    decision: i64,
    scope: i64,
    budget: i64,
    allocation: i64,
    expense: i64,
    task: i64,
    update: i64,
    cost: i64,
    task_cost: i64,
    progress_file: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Default)]
struct State {
    seq: Sequences,
    users: BTreeMap<UserId, UserProfile>,
    clients: BTreeMap<ClientId, Client>,
    projects: BTreeMap<ProjectId, Project>,
    files: Vec<ProjectFile>,
    staging: BTreeMap<StagingId, StagingProject>,
    decisions: Vec<StagingDecision>,
    scopes: BTreeMap<ScopeId, Scope>,
    budgets: BTreeMap<BudgetId, BudgetCategory>,
    allocations: BTreeMap<AllocationId, Allocation>,
    expenses: BTreeMap<ExpenseId, Expense>,
    tasks: BTreeMap<TaskId, Task>,
    updates: BTreeMap<UpdateId, ProgressUpdate>,
    costs: BTreeMap<CostId, ProjectCost>,
    task_costs: Vec<TaskCost>,
    progress_files: Vec<ProgressFile>,
    notifications: Vec<Notification>,
}

impl State {
    fn project_mut(&mut self, id: ProjectId) -> Result<&mut Project> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("project", id))
    }

    fn insert_project(&mut self, new: NewProject) -> Project {
        let id = next(&mut self.seq.project);
        let now = Utc::now();
        let project = Project {
            id,
            project_code: format_project_code(new.source, id),
            source: new.source,
            details: new.details,
            created_by: new.created_by,
            status: ProjectStatus::Planned,
            progress: Decimal::ZERO,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        self.projects.insert(id, project.clone());
        project
    }

    fn totals(&self, budget_id: BudgetId) -> Result<CategoryTotals> {
        let budget = self
            .budgets
            .get(&budget_id)
            .ok_or_else(|| PowermasonError::not_found("budget category", budget_id))?;
        let allocations: Vec<Allocation> = self
            .allocations
            .values()
            .filter(|a| a.budget_id == budget_id)
            .cloned()
            .collect();
        let expenses: Vec<Expense> = self
            .expenses
            .values()
            .filter(|e| e.budget_id == budget_id)
            .cloned()
            .collect();
        Ok(CategoryTotals::new(
            budget.planned_amount,
            &allocations,
            &expenses,
        ))
    }

    fn cost_metrics(&self, project: &Project) -> ProjectCostMetrics {
        let total_expenses = self
            .costs
            .values()
            .filter(|c| c.project_id == project.id)
            .map(|c| c.amount)
            .sum();
        let total_task_allocations = self
            .task_costs
            .iter()
            .filter(|tc| {
                self.tasks
                    .get(&tc.task_id)
                    .is_some_and(|t| t.project_id == project.id)
            })
            .map(|tc| tc.allocated_amount)
            .sum();
        ProjectCostMetrics::new(
            project.details.approved_budget,
            total_expenses,
            total_task_allocations,
        )
    }

    fn allocation_mut(&mut self, id: AllocationId) -> Result<&mut Allocation> {
        self.allocations
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("allocation", id))
    }

    fn scope_name_taken(&self, project_id: ProjectId, name: &str, except: Option<ScopeId>) -> bool {
        self.scopes.values().any(|s| {
            s.project_id == project_id && s.name == name && Some(s.id) != except
        })
    }

    fn remove_budget_cascade(&mut self, budget_id: BudgetId) {
        self.budgets.remove(&budget_id);
        self.allocations.retain(|_, a| a.budget_id != budget_id);
        self.expenses.retain(|_, e| e.budget_id != budget_id);
    }

    fn resolve_staging(
        &mut self,
        id: StagingId,
        resolution: &Resolution,
    ) -> Result<StagingProject> {
        let staging = self
            .staging
            .get(&id)
            .ok_or_else(|| PowermasonError::not_found("staging project", id))?;
        staging.status.resolve(resolution.decision)?;
        self.staging
            .remove(&id)
            .ok_or_else(|| PowermasonError::not_found("staging project", id))
    }

    fn log_decision(
        &mut self,
        staging: &StagingProject,
        resolution: Resolution,
        project_id: Option<ProjectId>,
    ) -> StagingDecision {
        let decision = StagingDecision {
            id: next(&mut self.seq.decision),
            staging_id: staging.id,
            project_name: staging.draft.name.clone(),
            decision: resolution.decision,
            reviewed_by: resolution.reviewed_by,
            comments: resolution.comments,
            project_id,
            decided_at: Utc::now(),
        };
        self.decisions.push(decision.clone());
        decision
    }

    fn review_update(
        &mut self,
        id: UpdateId,
        to: ReviewStatus,
        reviewer: UserId,
    ) -> Result<&mut ProgressUpdate> {
        let update = self
            .updates
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("progress update", id))?;
        update.status = update.status.resolve(to)?;
        update.reviewed_by = Some(reviewer);
        update.reviewed_at = Some(Utc::now());
        Ok(update)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, full_name: &str, email: &str, role: Role) -> UserProfile {
        let mut st = self.state.lock().await;
        let user = UserProfile {
            id: next(&mut st.seq.user),
            full_name: full_name.to_string(),
            email: email.to_string(),
            role,
        };
        st.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_client(
        &self,
        company_name: &str,
        email: &str,
        client_type: Option<ProjectSource>,
    ) -> Client {
        let mut st = self.state.lock().await;
        let client = Client {
            id: next(&mut st.seq.client),
            company_name: company_name.to_string(),
            contact_name: None,
            email: email.to_string(),
            client_type,
        };
        st.clients.insert(client.id, client.clone());
        client
    }

    pub async fn notifications_for(&self, user: UserId) -> Vec<Notification> {
        let st = self.state.lock().await;
        st.notifications
            .iter()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect()
    }

    pub async fn project_files(&self, project_id: ProjectId) -> Vec<ProjectFile> {
        let st = self.state.lock().await;
        st.files
            .iter()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    // ── Users & clients ──────────────────────────────────────

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<UserProfile>> {
        let st = self.state.lock().await;
        Ok(st.users.values().filter(|u| u.role == role).cloned().collect())
    }

    async fn search_users(&self, role: Role, query: &str) -> Result<Vec<UserProfile>> {
        let needle = query.to_lowercase();
        let st = self.state.lock().await;
        Ok(st
            .users
            .values()
            .filter(|u| u.role == role)
            .filter(|u| {
                u.full_name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn client_by_email(&self, email: &str) -> Result<Option<Client>> {
        let st = self.state.lock().await;
        Ok(st
            .clients
            .values()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    // ── Projects ─────────────────────────────────────────────

    async fn insert_project(&self, new: NewProject) -> Result<Project> {
        Ok(self.state.lock().await.insert_project(new))
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.state.lock().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let st = self.state.lock().await;
        Ok(st
            .projects
            .values()
            .rev()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn update_project_details(
        &self,
        id: ProjectId,
        details: &ProjectDraft,
    ) -> Result<Project> {
        let mut st = self.state.lock().await;
        let project = st.project_mut(id)?;
        project.details = details.clone();
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn set_archived(&self, id: ProjectId, archived: bool) -> Result<Project> {
        let mut st = self.state.lock().await;
        let project = st.project_mut(id)?;
        project.archived = archived;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn set_status(&self, id: ProjectId, status: ProjectStatus) -> Result<Project> {
        let mut st = self.state.lock().await;
        let project = st.project_mut(id)?;
        project.status = status;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn set_approved_budget(&self, id: ProjectId, amount: Decimal) -> Result<Project> {
        let mut st = self.state.lock().await;
        let project = st.project_mut(id)?;
        project.details.approved_budget = Some(amount);
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn set_progress(
        &self,
        id: ProjectId,
        progress: Decimal,
        status: ProjectStatus,
    ) -> Result<Project> {
        let mut st = self.state.lock().await;
        let project = st.project_mut(id)?;
        project.progress = progress;
        project.status = status;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn insert_project_file(&self, project_id: ProjectId, path: &str) -> Result<ProjectFile> {
        let mut st = self.state.lock().await;
        st.project_mut(project_id)?;
        let file = ProjectFile {
            id: next(&mut st.seq.file),
            project_id,
            path: path.to_string(),
            uploaded_at: Utc::now(),
        };
        st.files.push(file.clone());
        Ok(file)
    }

    async fn project_costing(&self, filter: &ProjectFilter) -> Result<Vec<ProjectCosting>> {
        let st = self.state.lock().await;
        let mut rows = Vec::new();
        for project in st.projects.values().filter(|p| filter.matches(p)) {
            let mut total_planned = Decimal::ZERO;
            let mut total_allocated = Decimal::ZERO;
            let live = st.budgets.values().filter(|b| {
                b.project_id == project.id
                    && st.scopes.get(&b.scope_id).is_some_and(|s| s.state.is_active())
            });
            for budget in live {
                let totals = st.totals(budget.id)?;
                total_planned += totals.planned;
                total_allocated += totals.allocated;
            }
            rows.push(ProjectCosting {
                project_id: project.id,
                project_code: project.project_code.clone(),
                project_name: project.details.name.clone(),
                approved_budget: project.details.approved_budget.unwrap_or_default(),
                total_planned,
                total_allocated,
                remaining: total_planned - total_allocated,
                costs: st.cost_metrics(project),
            });
        }
        Ok(rows)
    }

    // ── Staging ──────────────────────────────────────────────

    async fn insert_staging(&self, new: NewStaging) -> Result<StagingProject> {
        let mut st = self.state.lock().await;
        let staging = StagingProject {
            id: next(&mut st.seq.staging),
            source: new.source,
            draft: new.draft,
            submitted_by: new.submitted_by,
            submitted_at: Utc::now(),
            status: ReviewStatus::Pending,
        };
        st.staging.insert(staging.id, staging.clone());
        Ok(staging)
    }

    async fn get_staging(&self, id: StagingId) -> Result<Option<StagingProject>> {
        Ok(self.state.lock().await.staging.get(&id).cloned())
    }

    async fn list_staging(&self, status: ReviewStatus) -> Result<Vec<StagingProject>> {
        let st = self.state.lock().await;
        Ok(st
            .staging
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn approve_staging(
        &self,
        id: StagingId,
        resolution: Resolution,
    ) -> Result<ApprovedStaging> {
        if resolution.decision != ReviewStatus::Approved {
            return Err(PowermasonError::validation("approve_staging needs an approval"));
        }
        let mut st = self.state.lock().await;
        let staging = st.resolve_staging(id, &resolution)?;
        let mut details = staging.draft.clone();
        details.contract_agreement = resolution.contract_agreement.clone();
        let project = st.insert_project(NewProject {
            source: staging.source,
            details,
            created_by: Some(staging.submitted_by),
        });
        let decision = st.log_decision(&staging, resolution, Some(project.id));
        Ok(ApprovedStaging { project, decision })
    }

    async fn reject_staging(
        &self,
        id: StagingId,
        resolution: Resolution,
    ) -> Result<StagingDecision> {
        if resolution.decision != ReviewStatus::Rejected {
            return Err(PowermasonError::validation("reject_staging needs a rejection"));
        }
        let mut st = self.state.lock().await;
        let staging = st.resolve_staging(id, &resolution)?;
        Ok(st.log_decision(&staging, resolution, None))
    }

    async fn staging_decisions(&self, staging_id: StagingId) -> Result<Vec<StagingDecision>> {
        let st = self.state.lock().await;
        Ok(st
            .decisions
            .iter()
            .filter(|d| d.staging_id == staging_id)
            .cloned()
            .collect())
    }

    // ── Scopes ───────────────────────────────────────────────

    async fn insert_scope(&self, new: NewScope) -> Result<Scope> {
        let mut st = self.state.lock().await;
        if st.scope_name_taken(new.project_id, &new.name, None) {
            return Err(duplicate_scope_name(&new.name));
        }
        let scope = Scope {
            id: next(&mut st.seq.scope),
            project_id: new.project_id,
            name: new.name,
            weight: new.weight,
            state: RecordState::Active,
        };
        st.scopes.insert(scope.id, scope.clone());
        Ok(scope)
    }

    async fn get_scope(&self, id: ScopeId) -> Result<Option<Scope>> {
        Ok(self.state.lock().await.scopes.get(&id).cloned())
    }

    async fn list_scopes(&self, project_id: ProjectId, include_deleted: bool) -> Result<Vec<Scope>> {
        let st = self.state.lock().await;
        Ok(st
            .scopes
            .values()
            .filter(|s| s.project_id == project_id)
            .filter(|s| include_deleted || s.state.is_active())
            .cloned()
            .collect())
    }

    async fn update_scope(&self, id: ScopeId, name: &str, weight: Decimal) -> Result<Scope> {
        let mut st = self.state.lock().await;
        let project_id = st
            .scopes
            .get(&id)
            .map(|s| s.project_id)
            .ok_or_else(|| PowermasonError::not_found("scope", id))?;
        if st.scope_name_taken(project_id, name, Some(id)) {
            return Err(duplicate_scope_name(name));
        }
        let scope = st
            .scopes
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("scope", id))?;
        scope.name = name.to_string();
        scope.weight = weight;
        Ok(scope.clone())
    }

    async fn delete_scope(&self, id: ScopeId, force: bool) -> Result<ScopeDeleted> {
        let mut st = self.state.lock().await;
        let scope = st
            .scopes
            .get(&id)
            .cloned()
            .ok_or_else(|| PowermasonError::not_found("scope", id))?;
        let task_count = st.tasks.values().filter(|t| t.scope_id == id).count() as u64;
        let kind = plan_scope_deletion(task_count, force)?;
        match kind {
            ScopeDeletion::Soft => {
                if let Some(s) = st.scopes.get_mut(&id) {
                    s.state = RecordState::Deleted { at: Utc::now() };
                }
            }
            ScopeDeletion::Hard => {
                let budget_ids: Vec<BudgetId> = st
                    .budgets
                    .values()
                    .filter(|b| b.scope_id == id)
                    .map(|b| b.id)
                    .collect();
                for budget_id in budget_ids {
                    st.remove_budget_cascade(budget_id);
                }
                st.scopes.remove(&id);
            }
        }
        Ok(ScopeDeleted::new(&scope, kind))
    }

    async fn restore_scope(&self, id: ScopeId) -> Result<Scope> {
        let mut st = self.state.lock().await;
        let scope = st
            .scopes
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("scope", id))?;
        if scope.state.is_active() {
            return Err(PowermasonError::validation(
                "Scope is not deleted and cannot be restored.",
            ));
        }
        scope.state = RecordState::Active;
        Ok(scope.clone())
    }

    // ── Budget categories ────────────────────────────────────

    async fn insert_budget_category(&self, new: NewBudgetCategory) -> Result<BudgetCategory> {
        let mut st = self.state.lock().await;
        if st
            .budgets
            .values()
            .any(|b| b.scope_id == new.scope_id && b.category == new.category)
        {
            return Err(PowermasonError::Conflict(format!(
                "A {} budget already exists for this scope.",
                new.category.label()
            )));
        }
        let now = Utc::now();
        let budget = BudgetCategory {
            id: next(&mut st.seq.budget),
            project_id: new.project_id,
            scope_id: new.scope_id,
            category: new.category,
            category_other: new.category_other,
            planned_amount: new.planned_amount,
            created_at: now,
            updated_at: now,
        };
        st.budgets.insert(budget.id, budget.clone());
        Ok(budget)
    }

    async fn get_budget_category(&self, id: BudgetId) -> Result<Option<BudgetCategory>> {
        Ok(self.state.lock().await.budgets.get(&id).cloned())
    }

    async fn list_budget_categories(&self, project_id: ProjectId) -> Result<Vec<BudgetCategory>> {
        let st = self.state.lock().await;
        Ok(st
            .budgets
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn update_planned_amount(&self, id: BudgetId, amount: Decimal) -> Result<BudgetCategory> {
        let mut st = self.state.lock().await;
        let budget = st
            .budgets
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("budget category", id))?;
        budget.planned_amount = amount;
        budget.updated_at = Utc::now();
        Ok(budget.clone())
    }

    async fn delete_budget_category(&self, id: BudgetId) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.budgets.contains_key(&id) {
            return Err(PowermasonError::not_found("budget category", id));
        }
        let n = st.allocations.values().filter(|a| a.budget_id == id).count();
        if n > 0 {
            return Err(PowermasonError::validation(format!(
                "Cannot delete budget with {n} existing allocations. Remove allocations first."
            )));
        }
        st.remove_budget_cascade(id);
        Ok(())
    }

    // ── Allocations ──────────────────────────────────────────

    async fn insert_allocation(&self, new: NewAllocation) -> Result<AllocationRecorded> {
        let mut st = self.state.lock().await;
        if !st.budgets.contains_key(&new.budget_id) {
            return Err(PowermasonError::not_found("budget category", new.budget_id));
        }
        let allocation = Allocation {
            id: next(&mut st.seq.allocation),
            budget_id: new.budget_id,
            amount: new.amount,
            note: new.note,
            date_allocated: new.date_allocated,
            state: RecordState::Active,
        };
        st.allocations.insert(allocation.id, allocation.clone());
        let totals = st.totals(new.budget_id)?;
        Ok(AllocationRecorded { allocation, totals })
    }

    async fn get_allocation(&self, id: AllocationId) -> Result<Option<Allocation>> {
        Ok(self.state.lock().await.allocations.get(&id).cloned())
    }

    async fn list_allocations(&self, budget_id: BudgetId) -> Result<Vec<Allocation>> {
        let st = self.state.lock().await;
        Ok(st
            .allocations
            .values()
            .filter(|a| a.budget_id == budget_id)
            .cloned()
            .collect())
    }

    async fn soft_delete_allocation(&self, id: AllocationId) -> Result<Allocation> {
        let mut st = self.state.lock().await;
        let allocation = st.allocation_mut(id)?;
        allocation.soft_delete(Utc::now())?;
        Ok(allocation.clone())
    }

    async fn restore_allocation(&self, id: AllocationId) -> Result<Allocation> {
        let mut st = self.state.lock().await;
        let allocation = st.allocation_mut(id)?;
        allocation.restore()?;
        Ok(allocation.clone())
    }

    async fn hard_delete_allocation(&self, id: AllocationId) -> Result<()> {
        let mut st = self.state.lock().await;
        st.allocations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PowermasonError::not_found("allocation", id))
    }

    // ── Expenses ─────────────────────────────────────────────

    async fn insert_expense(&self, new: NewExpense) -> Result<ExpenseRecorded> {
        let mut st = self.state.lock().await;
        st.totals(new.budget_id)?.require_allocation()?;
        let expense = Expense {
            id: next(&mut st.seq.expense),
            project_id: new.project_id,
            budget_id: new.budget_id,
            expense_type: new.expense_type,
            expense_other: new.expense_other,
            amount: new.amount,
            vendor: new.vendor,
            receipt_number: new.receipt_number,
            expense_date: new.expense_date,
            description: new.description,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        st.expenses.insert(expense.id, expense.clone());
        let totals = st.totals(new.budget_id)?;
        Ok(ExpenseRecorded { expense, totals })
    }

    async fn list_expenses(&self, budget_id: BudgetId) -> Result<Vec<Expense>> {
        let st = self.state.lock().await;
        Ok(st
            .expenses
            .values()
            .filter(|e| e.budget_id == budget_id)
            .cloned()
            .collect())
    }

    async fn category_totals(&self, budget_id: BudgetId) -> Result<CategoryTotals> {
        self.state.lock().await.totals(budget_id)
    }

    // ── Project costs ────────────────────────────────────────

    async fn insert_project_cost(&self, new: NewProjectCost) -> Result<ProjectCost> {
        let mut st = self.state.lock().await;
        st.project_mut(new.project_id)?;
        if let Some(task_id) = new.linked_task {
            if !st.tasks.contains_key(&task_id) {
                return Err(PowermasonError::not_found("task", task_id));
            }
        }
        let cost = ProjectCost {
            id: next(&mut st.seq.cost),
            project_id: new.project_id,
            category: new.category,
            description: new.description,
            amount: new.amount,
            date_incurred: new.date_incurred,
            linked_task: new.linked_task,
            created_at: Utc::now(),
        };
        st.costs.insert(cost.id, cost.clone());
        Ok(cost)
    }

    async fn get_project_cost(&self, id: CostId) -> Result<Option<ProjectCost>> {
        Ok(self.state.lock().await.costs.get(&id).cloned())
    }

    async fn list_project_costs(&self, project_id: ProjectId) -> Result<Vec<ProjectCost>> {
        let st = self.state.lock().await;
        let costs = st
            .costs
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        Ok(order_costs(costs))
    }

    async fn insert_task_cost(&self, new: NewTaskCost) -> Result<TaskCost> {
        let mut st = self.state.lock().await;
        let cost_amount = st
            .costs
            .get(&new.cost_id)
            .map(|c| c.amount)
            .ok_or_else(|| PowermasonError::not_found("project cost", new.cost_id))?;
        if !st.tasks.contains_key(&new.task_id) {
            return Err(PowermasonError::not_found("task", new.task_id));
        }
        let already: Decimal = st
            .task_costs
            .iter()
            .filter(|tc| tc.cost_id == new.cost_id)
            .map(|tc| tc.allocated_amount)
            .sum();
        check_task_allocation(cost_amount, already, new.allocated_amount)?;
        let task_cost = TaskCost {
            id: next(&mut st.seq.task_cost),
            task_id: new.task_id,
            cost_id: new.cost_id,
            allocated_amount: new.allocated_amount,
        };
        st.task_costs.push(task_cost.clone());
        Ok(task_cost)
    }

    async fn list_task_costs(&self, project_id: ProjectId) -> Result<Vec<TaskCost>> {
        let st = self.state.lock().await;
        Ok(st
            .task_costs
            .iter()
            .filter(|tc| {
                st.tasks
                    .get(&tc.task_id)
                    .is_some_and(|t| t.project_id == project_id)
            })
            .cloned()
            .collect())
    }

    // ── Tasks ────────────────────────────────────────────────

    async fn insert_task(&self, new: NewTask) -> Result<Task> {
        let mut st = self.state.lock().await;
        if !st.scopes.contains_key(&new.input.scope_id) {
            return Err(PowermasonError::not_found("scope", new.input.scope_id));
        }
        let now = Utc::now();
        let input = new.input;
        let task = Task {
            id: next(&mut st.seq.task),
            project_id: new.project_id,
            scope_id: input.scope_id,
            duration_days: input.duration_days(),
            manhours: input.manhours(),
            name: input.name,
            description: input.description,
            assigned_to: input.assigned_to,
            start_date: input.start_date,
            end_date: input.end_date,
            weight: input.weight,
            progress: Decimal::ZERO,
            status: TaskStatus::Planned,
            archived: false,
            dependencies: input.dependencies,
            created_at: now,
            updated_at: now,
        };
        st.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, project_id: ProjectId, include_archived: bool) -> Result<Vec<Task>> {
        let st = self.state.lock().await;
        Ok(st
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .filter(|t| include_archived || !t.archived)
            .cloned()
            .collect())
    }

    async fn update_task(&self, id: TaskId, input: &TaskInput) -> Result<Task> {
        let mut st = self.state.lock().await;
        if !st.scopes.contains_key(&input.scope_id) {
            return Err(PowermasonError::not_found("scope", input.scope_id));
        }
        let task = st
            .tasks
            .get_mut(&id)
            .ok_or_else(|| PowermasonError::not_found("task", id))?;
        task.scope_id = input.scope_id;
        task.name = input.name.clone();
        task.description = input.description.clone();
        task.assigned_to = input.assigned_to;
        task.start_date = input.start_date;
        task.end_date = input.end_date;
        task.duration_days = input.duration_days();
        task.manhours = input.manhours();
        task.weight = input.weight;
        task.dependencies = input.dependencies.clone();
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_tasks_archived(
        &self,
        project_id: ProjectId,
        ids: &[TaskId],
        archived: bool,
    ) -> Result<u64> {
        let mut st = self.state.lock().await;
        let mut changed = 0;
        for task in st.tasks.values_mut() {
            if task.project_id == project_id && ids.contains(&task.id) {
                task.archived = archived;
                task.updated_at = Utc::now();
                changed += 1;
            }
        }
        Ok(changed)
    }

    // ── Progress updates ─────────────────────────────────────

    async fn insert_progress_update(&self, new: NewProgressUpdate) -> Result<ProgressUpdate> {
        let mut st = self.state.lock().await;
        if !st.tasks.contains_key(&new.task_id) {
            return Err(PowermasonError::not_found("task", new.task_id));
        }
        let update = ProgressUpdate {
            id: next(&mut st.seq.update),
            task_id: new.task_id,
            reported_by: new.reported_by,
            progress_percent: new.progress_percent,
            remarks: new.remarks,
            status: ReviewStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        st.updates.insert(update.id, update.clone());
        Ok(update)
    }

    async fn get_progress_update(&self, id: UpdateId) -> Result<Option<ProgressUpdate>> {
        Ok(self.state.lock().await.updates.get(&id).cloned())
    }

    async fn list_progress_updates(
        &self,
        status: Option<ReviewStatus>,
        reported_by: Option<UserId>,
    ) -> Result<Vec<ProgressUpdate>> {
        let st = self.state.lock().await;
        Ok(st
            .updates
            .values()
            .rev()
            .filter(|u| status.map_or(true, |s| u.status == s))
            .filter(|u| reported_by.map_or(true, |r| u.reported_by == r))
            .cloned()
            .collect())
    }

    async fn approve_progress_update(
        &self,
        id: UpdateId,
        reviewer: UserId,
    ) -> Result<(ProgressUpdate, Task)> {
        let mut st = self.state.lock().await;
        let (task_id, percent) = st
            .updates
            .get(&id)
            .map(|u| (u.task_id, u.progress_percent))
            .ok_or_else(|| PowermasonError::not_found("progress update", id))?;
        if !st.tasks.contains_key(&task_id) {
            return Err(PowermasonError::not_found("task", task_id));
        }
        let update = st.review_update(id, ReviewStatus::Approved, reviewer)?.clone();
        let task = st
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| PowermasonError::not_found("task", task_id))?;
        task.progress = percent;
        task.status = TaskStatus::from_progress(percent);
        task.updated_at = Utc::now();
        Ok((update, task.clone()))
    }

    async fn reject_progress_update(&self, id: UpdateId, reviewer: UserId) -> Result<ProgressUpdate> {
        let mut st = self.state.lock().await;
        Ok(st.review_update(id, ReviewStatus::Rejected, reviewer)?.clone())
    }

    async fn count_pending_updates(&self) -> Result<u64> {
        let st = self.state.lock().await;
        Ok(st
            .updates
            .values()
            .filter(|u| u.status == ReviewStatus::Pending)
            .count() as u64)
    }

    async fn insert_progress_file(&self, update_id: UpdateId, path: &str) -> Result<ProgressFile> {
        let mut st = self.state.lock().await;
        if !st.updates.contains_key(&update_id) {
            return Err(PowermasonError::not_found("progress update", update_id));
        }
        let file = ProgressFile {
            id: next(&mut st.seq.progress_file),
            update_id,
            path: path.to_string(),
            uploaded_at: Utc::now(),
        };
        st.progress_files.push(file.clone());
        Ok(file)
    }

    async fn list_progress_files(&self, update_id: UpdateId) -> Result<Vec<ProgressFile>> {
        let st = self.state.lock().await;
        Ok(st
            .progress_files
            .iter()
            .filter(|f| f.update_id == update_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Notifier for MemoryStore {
    async fn notify(&self, user: UserId, message: &str, link: Option<&str>) -> Result<()> {
        let mut st = self.state.lock().await;
        st.notifications.push(Notification {
            user_id: user,
            message: message.to_string(),
            link: link.map(String::from),
            created_at: Utc::now(),
        });
        Ok(())
    }
}
