//! Non-fatal business-rule notices returned next to a successful result.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::money::format_php;
use crate::types::{BudgetId, ProjectId, ScopeId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Active allocations now exceed the category's planned amount.
    OverAllocated {
        budget_id: BudgetId,
        planned: Decimal,
        allocated: Decimal,
        overage: Decimal,
    },
    /// The project's total planned amount exceeds its approved budget.
    PlanExceedsApprovedBudget {
        project_id: ProjectId,
        approved: Decimal,
        planned: Decimal,
        overage: Decimal,
    },
    /// Recorded expenses exceed what was allocated to the category.
    ExpensesExceedAllocation {
        budget_id: BudgetId,
        allocated: Decimal,
        spent: Decimal,
        overage: Decimal,
    },
    /// Task weights within a scope add up to more than 100%.
    ScopeWeightExceeded {
        scope_id: ScopeId,
        total_weight: Decimal,
    },
}

impl Warning {
    pub fn overage(&self) -> Option<Decimal> {
        match self {
            Self::OverAllocated { overage, .. }
            | Self::PlanExceedsApprovedBudget { overage, .. }
            | Self::ExpensesExceedAllocation { overage, .. } => Some(*overage),
            Self::ScopeWeightExceeded { .. } => None,
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverAllocated { overage, .. } => {
                write!(f, "Over-allocated by {}", format_php(*overage))
            }
            Self::PlanExceedsApprovedBudget {
                approved,
                planned,
                overage,
                ..
            } => write!(
                f,
                "Total planned ({}) exceeds approved budget ({}) by {}",
                format_php(*planned),
                format_php(*approved),
                format_php(*overage)
            ),
            Self::ExpensesExceedAllocation { overage, .. } => {
                write!(f, "Expenses exceed allocation by {}", format_php(*overage))
            }
            Self::ScopeWeightExceeded { total_weight, .. } => write!(
                f,
                "Task weights in this scope total {}%, above 100%",
                total_weight.normalize()
            ),
        }
    }
}

/// A successful result together with any warnings it raised.
#[derive(Debug, Clone, Serialize)]
pub struct Warned<T> {
    #[serde(flatten)]
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Warned<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with(value: T, warning: Option<Warning>) -> Self {
        Self {
            value,
            warnings: warning.into_iter().collect(),
        }
    }

    pub fn push(&mut self, warning: Option<Warning>) {
        self.warnings.extend(warning);
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Warned<U> {
        Warned {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_allocation_message_embeds_overage() {
        let w = Warning::OverAllocated {
            budget_id: 1,
            planned: Decimal::new(100_000, 0),
            allocated: Decimal::new(110_000, 0),
            overage: Decimal::new(10_000, 0),
        };
        assert_eq!(w.to_string(), "Over-allocated by ₱10,000.00");
        assert_eq!(w.overage(), Some(Decimal::new(10_000, 0)));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let w = Warning::ScopeWeightExceeded {
            scope_id: 3,
            total_weight: Decimal::new(120, 0),
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "scope_weight_exceeded");
        assert_eq!(json["scope_id"], 3);
    }
}
