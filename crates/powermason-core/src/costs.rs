//! Project-level costs and their split across tasks.
//!
//! A [`ProjectCost`] is money spent on the project as a whole, optionally
//! tied to one task. [`TaskCost`] rows divide a cost between tasks; together
//! they never exceed the cost amount.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PowermasonError, Result};
use crate::money::{percentage, validate_amount};
use crate::types::{CostCategory, CostId, ProjectId, TaskCostId, TaskId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCost {
    pub id: CostId,
    pub project_id: ProjectId,
    pub category: CostCategory,
    pub description: String,
    pub amount: Decimal,
    pub date_incurred: NaiveDate,
    pub linked_task: Option<TaskId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProjectCost {
    pub project_id: ProjectId,
    pub category: CostCategory,
    pub description: String,
    pub amount: Decimal,
    pub date_incurred: NaiveDate,
    pub linked_task: Option<TaskId>,
}

/// Request body for recording a cost. `date_incurred` defaults to today.
#[derive(Debug, Clone, Deserialize)]
pub struct CostInput {
    pub category: CostCategory,
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub date_incurred: Option<NaiveDate>,
    #[serde(default)]
    pub linked_task: Option<TaskId>,
}

impl CostInput {
    pub fn into_new(self, project_id: ProjectId, today: NaiveDate) -> Result<NewProjectCost> {
        validate_amount(self.amount)?;
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(PowermasonError::validation("A cost description is required."));
        }
        Ok(NewProjectCost {
            project_id,
            category: self.category,
            description,
            amount: self.amount,
            date_incurred: self.date_incurred.unwrap_or(today),
            linked_task: self.linked_task,
        })
    }
}

/// Newest first; same-day costs by descending id.
pub fn order_costs(mut costs: Vec<ProjectCost>) -> Vec<ProjectCost> {
    costs.sort_by(|a, b| {
        b.date_incurred
            .cmp(&a.date_incurred)
            .then_with(|| b.id.cmp(&a.id))
    });
    costs
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCost {
    pub id: TaskCostId,
    pub task_id: TaskId,
    pub cost_id: CostId,
    pub allocated_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskCost {
    pub task_id: TaskId,
    pub cost_id: CostId,
    pub allocated_amount: Decimal,
}

/// Refuse a split that would push the cost's task allocations past its amount.
pub fn check_task_allocation(
    cost_amount: Decimal,
    already_allocated: Decimal,
    requested: Decimal,
) -> Result<()> {
    if already_allocated + requested > cost_amount {
        return Err(PowermasonError::validation(
            "Allocated amount exceeds available cost",
        ));
    }
    Ok(())
}

/// Spend figures for one project.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProjectCostMetrics {
    pub total_expenses: Decimal,
    pub total_task_allocations: Decimal,
    pub remaining_budget: Decimal,
    /// Spend as a percentage of the approved budget; absent without one.
    pub cost_performance: Option<Decimal>,
}

impl ProjectCostMetrics {
    pub fn new(
        approved_budget: Option<Decimal>,
        total_expenses: Decimal,
        total_task_allocations: Decimal,
    ) -> Self {
        let cost_performance = approved_budget
            .filter(|b| *b > Decimal::ZERO)
            .map(|b| percentage(total_expenses, b));
        Self {
            total_expenses,
            total_task_allocations,
            remaining_budget: approved_budget.unwrap_or_default() - total_task_allocations,
            cost_performance,
        }
    }
}
