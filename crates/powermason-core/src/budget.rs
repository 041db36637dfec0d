//! Budget categories, the allocation ledger and expenses.
//!
//! Planned amounts live on [`BudgetCategory`]; committed funds are
//! [`Allocation`] rows (soft-deletable); actual spend is [`Expense`] rows.
//! All derived figures are computed here so the stores only persist.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PowermasonError, Result};
use crate::money::percentage;
use crate::types::{
    AllocationId, BudgetId, CostCategory, ExpenseId, ExpenseType, ProjectId, RecordState,
    ScopeId, UserId,
};
use crate::warning::Warning;

pub const ALLOCATIONS_PER_PAGE: usize = 10;

// ─── Budget categories ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub id: BudgetId,
    pub project_id: ProjectId,
    pub scope_id: ScopeId,
    pub category: CostCategory,
    pub category_other: Option<String>,
    pub planned_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetCategory {
    pub fn display_name(&self) -> String {
        match (&self.category, &self.category_other) {
            (CostCategory::Other, Some(other)) if !other.trim().is_empty() => other.clone(),
            (category, _) => category.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBudgetCategory {
    pub project_id: ProjectId,
    pub scope_id: ScopeId,
    pub category: CostCategory,
    pub category_other: Option<String>,
    pub planned_amount: Decimal,
}

/// `category_other` only means something for `OTH`.
pub fn normalize_category_other(category: CostCategory, other: Option<String>) -> Option<String> {
    match category {
        CostCategory::Other => other
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

pub fn validate_planned_amount(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(PowermasonError::validation(
            "Planned amount cannot be negative.",
        ));
    }
    Ok(())
}

/// Warning when a project's planned total goes past its approved budget.
pub fn plan_overage(project_id: ProjectId, approved: Decimal, planned: Decimal) -> Option<Warning> {
    (planned > approved).then(|| Warning::PlanExceedsApprovedBudget {
        project_id,
        approved,
        planned,
        overage: planned - approved,
    })
}

// ─── Allocations ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub budget_id: BudgetId,
    pub amount: Decimal,
    pub note: Option<String>,
    pub date_allocated: NaiveDate,
    pub state: RecordState,
}

impl Allocation {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Active → Deleted. The amount is kept for audit and restore.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.state.is_deleted() {
            return Err(PowermasonError::Conflict(format!(
                "allocation {} is already deleted",
                self.id
            )));
        }
        self.state = RecordState::Deleted { at };
        Ok(())
    }

    /// Deleted → Active.
    pub fn restore(&mut self) -> Result<()> {
        if self.state.is_active() {
            return Err(PowermasonError::Conflict(format!(
                "allocation {} is not deleted",
                self.id
            )));
        }
        self.state = RecordState::Active;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAllocation {
    pub budget_id: BudgetId,
    pub amount: Decimal,
    pub note: Option<String>,
    pub date_allocated: NaiveDate,
}

pub fn total_active(allocations: &[Allocation]) -> Decimal {
    allocations
        .iter()
        .filter(|a| a.is_active())
        .map(|a| a.amount)
        .sum()
}

/// Active allocations newest first, then soft-deleted ones most recently
/// deleted first.
pub fn split_ledger(mut allocations: Vec<Allocation>) -> (Vec<Allocation>, Vec<Allocation>) {
    let (mut active, mut deleted): (Vec<_>, Vec<_>) =
        allocations.drain(..).partition(|a| a.is_active());
    active.sort_by(|a, b| {
        b.date_allocated
            .cmp(&a.date_allocated)
            .then_with(|| b.id.cmp(&a.id))
    });
    deleted.sort_by(|a, b| b.state.deleted_at().cmp(&a.state.deleted_at()));
    (active, deleted)
}

// ─── Expenses ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub project_id: ProjectId,
    pub budget_id: BudgetId,
    pub expense_type: ExpenseType,
    pub expense_other: Option<String>,
    pub amount: Decimal,
    pub vendor: Option<String>,
    pub receipt_number: Option<String>,
    pub expense_date: NaiveDate,
    pub description: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub project_id: ProjectId,
    pub budget_id: BudgetId,
    pub expense_type: ExpenseType,
    pub expense_other: Option<String>,
    pub amount: Decimal,
    pub vendor: Option<String>,
    pub receipt_number: Option<String>,
    pub expense_date: NaiveDate,
    pub description: Option<String>,
    pub created_by: Option<UserId>,
}

// ─── Derived totals ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStatus {
    Over,
    Complete,
    Partial,
}

/// Ledger figures for one budget category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub planned: Decimal,
    pub allocated: Decimal,
    pub spent: Decimal,
}

impl CategoryTotals {
    pub fn new(planned: Decimal, allocations: &[Allocation], expenses: &[Expense]) -> Self {
        Self {
            planned,
            allocated: total_active(allocations),
            spent: expenses.iter().map(|e| e.amount).sum(),
        }
    }

    /// `planned − allocated`; negative once over-allocated.
    pub fn remaining(&self) -> Decimal {
        self.planned - self.allocated
    }

    /// `allocated − spent`.
    pub fn unspent(&self) -> Decimal {
        self.allocated - self.spent
    }

    pub fn allocation_percentage(&self) -> Decimal {
        percentage(self.allocated, self.planned)
    }

    pub fn is_over_budget(&self) -> bool {
        self.allocated > self.planned
    }

    pub fn fill_status(&self) -> FillStatus {
        if self.allocated > self.planned {
            FillStatus::Over
        } else if self.allocated == self.planned {
            FillStatus::Complete
        } else {
            FillStatus::Partial
        }
    }

    pub fn over_allocation(&self, budget_id: BudgetId) -> Option<Warning> {
        self.is_over_budget().then(|| Warning::OverAllocated {
            budget_id,
            planned: self.planned,
            allocated: self.allocated,
            overage: self.allocated - self.planned,
        })
    }

    pub fn overspend(&self, budget_id: BudgetId) -> Option<Warning> {
        (self.spent > self.allocated).then(|| Warning::ExpensesExceedAllocation {
            budget_id,
            allocated: self.allocated,
            spent: self.spent,
            overage: self.spent - self.allocated,
        })
    }

    /// An expense may only be booked against funds that were allocated.
    pub fn require_allocation(&self) -> Result<()> {
        if self.allocated <= Decimal::ZERO {
            return Err(PowermasonError::validation(
                "No allocation found for this category. Please allocate funds first.",
            ));
        }
        Ok(())
    }
}

/// A category with its computed ledger figures, as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    #[serde(flatten)]
    pub budget: BudgetCategory,
    pub display_name: String,
    pub total_allocated: Decimal,
    pub total_spent: Decimal,
    pub remaining: Decimal,
    pub allocation_percentage: Decimal,
    pub is_over_budget: bool,
    pub status: FillStatus,
}

impl CategorySummary {
    pub fn new(budget: BudgetCategory, totals: CategoryTotals) -> Self {
        Self {
            display_name: budget.display_name(),
            total_allocated: totals.allocated,
            total_spent: totals.spent,
            remaining: totals.remaining(),
            allocation_percentage: totals.allocation_percentage(),
            is_over_budget: totals.is_over_budget(),
            status: totals.fill_status(),
            budget,
        }
    }
}

// ─── Operation results ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationRecorded {
    pub allocation: Allocation,
    pub totals: CategoryTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseRecorded {
    pub expense: Expense,
    pub totals: CategoryTotals,
}

/// Paginated ledger view for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationLedger {
    pub summary: CategorySummary,
    pub active: Vec<Allocation>,
    pub deleted: Vec<Allocation>,
    pub page: usize,
    pub total_pages: usize,
}

impl AllocationLedger {
    pub fn build(summary: CategorySummary, allocations: Vec<Allocation>, page: usize) -> Self {
        let (active, deleted) = split_ledger(allocations);
        let total_pages = active.len().div_ceil(ALLOCATIONS_PER_PAGE).max(1);
        let page = page.clamp(1, total_pages);
        let active = active
            .into_iter()
            .skip((page - 1) * ALLOCATIONS_PER_PAGE)
            .take(ALLOCATIONS_PER_PAGE)
            .collect();
        Self {
            summary,
            active,
            deleted,
            page,
            total_pages,
        }
    }
}

/// Allocated/spent/remaining for one category, as shown on the expense form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAllocation {
    pub budget_id: BudgetId,
    pub allocated: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
}

impl From<(BudgetId, CategoryTotals)> for CategoryAllocation {
    fn from((budget_id, totals): (BudgetId, CategoryTotals)) -> Self {
        Self {
            budget_id,
            allocated: totals.allocated,
            spent: totals.spent,
            remaining: totals.unspent(),
        }
    }
}

/// Budget plan for a project, grouped by scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeBudget {
    pub scope_id: ScopeId,
    pub scope_name: String,
    pub categories: Vec<CategorySummary>,
    pub total_planned: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetPlan {
    pub project_id: ProjectId,
    pub approved_budget: Decimal,
    pub scopes: Vec<ScopeBudget>,
    pub total_planned: Decimal,
    pub remaining_budget: Decimal,
    pub utilization_percentage: Decimal,
}

impl BudgetPlan {
    pub fn new(project_id: ProjectId, approved_budget: Decimal, scopes: Vec<ScopeBudget>) -> Self {
        let total_planned: Decimal = scopes.iter().map(|s| s.total_planned).sum();
        Self {
            project_id,
            approved_budget,
            remaining_budget: approved_budget - total_planned,
            utilization_percentage: percentage(total_planned, approved_budget),
            total_planned,
            scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alloc(id: i64, amount: i64, day: u32) -> Allocation {
        Allocation {
            id,
            budget_id: 1,
            amount: Decimal::new(amount, 0),
            note: None,
            date_allocated: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            state: RecordState::Active,
        }
    }

    #[test]
    fn totals_exclude_soft_deleted() {
        let mut allocations = vec![alloc(1, 40_000, 1), alloc(2, 70_000, 2)];
        allocations[1].soft_delete(Utc::now()).unwrap();
        let t = CategoryTotals::new(Decimal::new(100_000, 0), &allocations, &[]);
        assert_eq!(t.allocated, Decimal::new(40_000, 0));
        assert_eq!(t.remaining(), Decimal::new(60_000, 0));
        assert_eq!(t.fill_status(), FillStatus::Partial);
    }

    #[test]
    fn over_allocation_goes_negative_and_warns() {
        let allocations = vec![alloc(1, 40_000, 1), alloc(2, 70_000, 2)];
        let t = CategoryTotals::new(Decimal::new(100_000, 0), &allocations, &[]);
        assert_eq!(t.remaining(), Decimal::new(-10_000, 0));
        assert!(t.is_over_budget());
        assert_eq!(t.fill_status(), FillStatus::Over);
        assert_eq!(
            t.over_allocation(1).and_then(|w| w.overage()),
            Some(Decimal::new(10_000, 0))
        );
    }

    #[test]
    fn zero_planned_has_zero_percentage() {
        let t = CategoryTotals::new(Decimal::ZERO, &[alloc(1, 5, 1)], &[]);
        assert_eq!(t.allocation_percentage(), Decimal::ZERO);
        assert!(t.is_over_budget());
    }

    #[test]
    fn exact_allocation_is_complete() {
        let t = CategoryTotals::new(Decimal::new(500, 0), &[alloc(1, 500, 1)], &[]);
        assert_eq!(t.fill_status(), FillStatus::Complete);
        assert!(t.over_allocation(1).is_none());
    }

    #[test]
    fn soft_delete_and_restore_transitions() {
        let mut a = alloc(1, 10, 1);
        assert!(a.restore().is_err());
        a.soft_delete(Utc::now()).unwrap();
        assert!(a.soft_delete(Utc::now()).is_err());
        a.restore().unwrap();
        assert!(a.is_active());
    }

    #[test]
    fn expense_requires_allocation() {
        let t = CategoryTotals::new(Decimal::new(100, 0), &[], &[]);
        let err = t.require_allocation().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input: No allocation found for this category. Please allocate funds first."
        );
    }

    #[test]
    fn ledger_orders_and_paginates() {
        let mut allocations: Vec<Allocation> = (1..=12).map(|i| alloc(i, 100, i as u32)).collect();
        let early = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        allocations.push(Allocation {
            state: RecordState::Deleted { at: early },
            ..alloc(13, 5, 13)
        });
        allocations.push(Allocation {
            state: RecordState::Deleted { at: late },
            ..alloc(14, 5, 14)
        });

        let t = CategoryTotals::new(Decimal::new(2000, 0), &allocations, &[]);
        let budget = BudgetCategory {
            id: 1,
            project_id: 1,
            scope_id: 1,
            category: CostCategory::Labor,
            category_other: None,
            planned_amount: Decimal::new(2000, 0),
            created_at: early,
            updated_at: early,
        };
        let ledger = AllocationLedger::build(CategorySummary::new(budget, t), allocations, 1);
        assert_eq!(ledger.total_pages, 2);
        assert_eq!(ledger.active.len(), 10);
        assert_eq!(ledger.active[0].id, 12);
        assert_eq!(ledger.deleted[0].id, 14);
        assert_eq!(ledger.summary.total_allocated, Decimal::new(1200, 0));
    }

    #[test]
    fn other_category_keeps_custom_name() {
        assert_eq!(
            normalize_category_other(CostCategory::Other, Some(" Permits ".into())),
            Some("Permits".into())
        );
        assert_eq!(
            normalize_category_other(CostCategory::Labor, Some("x".into())),
            None
        );
    }

    #[test]
    fn plan_overage_warns_only_above_approved() {
        let approved = Decimal::new(1000, 0);
        assert!(plan_overage(1, approved, approved).is_none());
        let w = plan_overage(1, approved, Decimal::new(1500, 0)).unwrap();
        assert_eq!(w.overage(), Some(Decimal::new(500, 0)));
    }
}
