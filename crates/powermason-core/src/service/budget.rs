use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{ProjectService, MANAGERS};
use crate::budget::{
    normalize_category_other, plan_overage, validate_planned_amount, Allocation, AllocationLedger,
    AllocationRecorded, BudgetCategory, BudgetPlan, CategoryAllocation, CategorySummary,
    ExpenseRecorded, NewAllocation, NewBudgetCategory, NewExpense, ScopeBudget,
};
use crate::error::{PowermasonError, Result};
use crate::money::validate_amount;
use crate::principal::Principal;
use crate::types::{AllocationId, BudgetId, CostCategory, ExpenseType, ProjectId, ScopeId};
use crate::warning::Warned;

/// Expense form fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    pub budget_id: BudgetId,
    pub expense_type: ExpenseType,
    #[serde(default)]
    pub expense_other: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProjectService {
    /// A budget category that exists and belongs to `project_id`.
    async fn category_in(&self, project_id: ProjectId, budget_id: BudgetId) -> Result<BudgetCategory> {
        match self.store.get_budget_category(budget_id).await? {
            Some(b) if b.project_id == project_id => Ok(b),
            _ => Err(PowermasonError::NotFound(format!(
                "budget category {budget_id} in project {project_id}"
            ))),
        }
    }

    async fn allocation_in(
        &self,
        project_id: ProjectId,
        budget_id: BudgetId,
        allocation_id: AllocationId,
    ) -> Result<Allocation> {
        self.category_in(project_id, budget_id).await?;
        match self.store.get_allocation(allocation_id).await? {
            Some(a) if a.budget_id == budget_id => Ok(a),
            _ => Err(PowermasonError::NotFound(format!(
                "allocation {allocation_id} in budget category {budget_id}"
            ))),
        }
    }

    async fn total_planned(&self, project_id: ProjectId) -> Result<Decimal> {
        Ok(self
            .store
            .list_budget_categories(project_id)
            .await?
            .iter()
            .map(|b| b.planned_amount)
            .sum())
    }

    async fn summarize(&self, budget: BudgetCategory) -> Result<CategorySummary> {
        let totals = self.store.category_totals(budget.id).await?;
        Ok(CategorySummary::new(budget, totals))
    }

    // ── Budget planning ──────────────────────────────────────

    pub async fn budget_plan(&self, principal: &Principal, project_id: ProjectId) -> Result<BudgetPlan> {
        principal.require_any(MANAGERS)?;
        let project = self.load_project(project_id).await?;
        let scopes = self.store.list_scopes(project_id, false).await?;
        let categories = self.store.list_budget_categories(project_id).await?;

        let mut grouped = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let mut summaries = Vec::new();
            for budget in categories.iter().filter(|b| b.scope_id == scope.id) {
                summaries.push(self.summarize(budget.clone()).await?);
            }
            let total_planned = summaries.iter().map(|s| s.budget.planned_amount).sum();
            grouped.push(ScopeBudget {
                scope_id: scope.id,
                scope_name: scope.name,
                categories: summaries,
                total_planned,
            });
        }

        Ok(BudgetPlan::new(
            project_id,
            project.approved_budget().unwrap_or_default(),
            grouped,
        ))
    }

    pub async fn add_budget_category(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        scope_id: ScopeId,
        category: CostCategory,
        planned_amount: Decimal,
        category_other: Option<String>,
    ) -> Result<Warned<BudgetCategory>> {
        principal.require_any(MANAGERS)?;
        let project = self.load_project(project_id).await?;
        let approved = project
            .approved_budget()
            .filter(|b| *b > Decimal::ZERO)
            .ok_or_else(|| {
                PowermasonError::validation(
                    "Project must have an approved budget before planning.",
                )
            })?;
        validate_planned_amount(planned_amount)?;
        match self.store.get_scope(scope_id).await? {
            Some(s) if s.project_id == project_id && s.state.is_active() => {}
            _ => {
                return Err(PowermasonError::validation(
                    "Scope must belong to this project.",
                ))
            }
        }

        let budget = self
            .store
            .insert_budget_category(NewBudgetCategory {
                project_id,
                scope_id,
                category,
                category_other: normalize_category_other(category, category_other),
                planned_amount,
            })
            .await?;
        tracing::info!(project_id, budget_id = budget.id, %category, "budget category added");

        let warning = plan_overage(project_id, approved, self.total_planned(project_id).await?);
        if let Some(w) = &warning {
            tracing::warn!(project_id, warning = %w, "planned total exceeds approved budget");
        }
        Ok(Warned::with(budget, warning))
    }

    pub async fn edit_planned_amount(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
        amount: Decimal,
    ) -> Result<Warned<BudgetCategory>> {
        principal.require_any(MANAGERS)?;
        validate_planned_amount(amount)?;
        let project = self.load_project(project_id).await?;
        self.category_in(project_id, budget_id).await?;

        let budget = self.store.update_planned_amount(budget_id, amount).await?;
        tracing::info!(project_id, budget_id, %amount, "planned amount updated");

        let approved = project.approved_budget().unwrap_or_default();
        let warning = plan_overage(project_id, approved, self.total_planned(project_id).await?);
        Ok(Warned::with(budget, warning))
    }

    pub async fn delete_budget_category(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
    ) -> Result<()> {
        principal.require_any(MANAGERS)?;
        self.category_in(project_id, budget_id).await?;
        self.store.delete_budget_category(budget_id).await?;
        tracing::info!(project_id, budget_id, "budget category deleted");
        Ok(())
    }

    // ── Allocations ──────────────────────────────────────────

    /// Over-allocation is never refused; it comes back as a warning.
    pub async fn allocate(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
        amount: Decimal,
        note: Option<String>,
        date_allocated: Option<NaiveDate>,
    ) -> Result<Warned<AllocationRecorded>> {
        principal.require_any(MANAGERS)?;
        validate_amount(amount)?;
        self.category_in(project_id, budget_id).await?;

        let recorded = self
            .store
            .insert_allocation(NewAllocation {
                budget_id,
                amount,
                note: note.filter(|n| !n.trim().is_empty()),
                date_allocated: date_allocated.unwrap_or_else(|| Utc::now().date_naive()),
            })
            .await?;
        tracing::info!(budget_id, allocation_id = recorded.allocation.id, %amount, "funds allocated");

        let warning = recorded.totals.over_allocation(budget_id);
        if let Some(w) = &warning {
            tracing::warn!(budget_id, warning = %w, "category over-allocated");
        }
        Ok(Warned::with(recorded, warning))
    }

    pub async fn allocation_ledger(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
        page: usize,
    ) -> Result<AllocationLedger> {
        principal.require_any(MANAGERS)?;
        let budget = self.category_in(project_id, budget_id).await?;
        let allocations = self.store.list_allocations(budget_id).await?;
        let summary = self.summarize(budget).await?;
        Ok(AllocationLedger::build(summary, allocations, page))
    }

    /// Every category of the project with its active-allocation totals.
    pub async fn allocation_overview(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<CategorySummary>> {
        principal.require_any(MANAGERS)?;
        self.load_project(project_id).await?;
        let mut out = Vec::new();
        for budget in self.store.list_budget_categories(project_id).await? {
            out.push(self.summarize(budget).await?);
        }
        Ok(out)
    }

    pub async fn soft_delete_allocation(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
        allocation_id: AllocationId,
    ) -> Result<Allocation> {
        principal.require_any(MANAGERS)?;
        self.allocation_in(project_id, budget_id, allocation_id).await?;
        let allocation = self.store.soft_delete_allocation(allocation_id).await?;
        tracing::info!(budget_id, allocation_id, "allocation soft deleted");
        Ok(allocation)
    }

    pub async fn restore_allocation(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
        allocation_id: AllocationId,
    ) -> Result<Allocation> {
        principal.require_any(MANAGERS)?;
        self.allocation_in(project_id, budget_id, allocation_id).await?;
        let allocation = self.store.restore_allocation(allocation_id).await?;
        tracing::info!(budget_id, allocation_id, "allocation restored");
        Ok(allocation)
    }

    pub async fn hard_delete_allocation(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
        allocation_id: AllocationId,
    ) -> Result<()> {
        principal.require_any(MANAGERS)?;
        self.allocation_in(project_id, budget_id, allocation_id).await?;
        self.store.hard_delete_allocation(allocation_id).await?;
        tracing::info!(budget_id, allocation_id, "allocation permanently deleted");
        Ok(())
    }

    // ── Expenses ─────────────────────────────────────────────

    /// Requires an allocation; spending past it is warned, not refused.
    pub async fn record_expense(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        input: ExpenseInput,
    ) -> Result<Warned<ExpenseRecorded>> {
        principal.require_any(MANAGERS)?;
        validate_amount(input.amount)?;
        self.category_in(project_id, input.budget_id).await?;

        let expense_other = match input.expense_type {
            ExpenseType::Other => input.expense_other.filter(|s| !s.trim().is_empty()),
            _ => None,
        };
        let recorded = self
            .store
            .insert_expense(NewExpense {
                project_id,
                budget_id: input.budget_id,
                expense_type: input.expense_type,
                expense_other,
                amount: input.amount,
                vendor: input.vendor,
                receipt_number: input.receipt_number,
                expense_date: input
                    .expense_date
                    .unwrap_or_else(|| Utc::now().date_naive()),
                description: input.description,
                created_by: Some(principal.user_id),
            })
            .await?;
        tracing::info!(
            project_id,
            budget_id = input.budget_id,
            expense_id = recorded.expense.id,
            "expense recorded"
        );

        let warning = recorded.totals.overspend(input.budget_id);
        if let Some(w) = &warning {
            tracing::warn!(budget_id = input.budget_id, warning = %w, "expenses exceed allocation");
        }
        Ok(Warned::with(recorded, warning))
    }

    pub async fn category_allocation(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        budget_id: BudgetId,
    ) -> Result<CategoryAllocation> {
        principal.require_any(MANAGERS)?;
        self.category_in(project_id, budget_id).await?;
        let totals = self.store.category_totals(budget_id).await?;
        Ok(CategoryAllocation::from((budget_id, totals)))
    }
}
