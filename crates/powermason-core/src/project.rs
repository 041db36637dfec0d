//! Projects, their editable details and the staged draft payload.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::costs::ProjectCostMetrics;
use crate::error::{PowermasonError, Result};
use crate::money::max_amount;
use crate::types::{
    ClientId, ProjectCategory, ProjectId, ProjectSource, ProjectStatus, UserId,
};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_LOCATION_LEN: usize = 300;

/// `GC-001`, `DC-1234`.
pub fn format_project_code(source: ProjectSource, id: ProjectId) -> String {
    format!("{}-{:03}", source.code(), id)
}

pub fn clamp_progress(progress: Decimal) -> Decimal {
    progress.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

/// Everything about a project that a submitter or editor supplies.
///
/// This is also the staged draft payload: dates are ISO-8601 strings,
/// money travels as JSON numbers, related rows as numeric ids and the
/// contract as a storage-relative path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    #[serde(rename = "project_name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "project_category")]
    pub category: Option<ProjectCategory>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default, alias = "project_manager_id")]
    pub project_manager: Option<UserId>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub gps_coordinates: Option<String>,
    #[serde(default)]
    pub city_province: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub actual_completion_date: Option<NaiveDate>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub estimated_cost: Option<Decimal>,
    #[serde(
        default,
        alias = "budget",
        with = "rust_decimal::serde::float_option"
    )]
    pub approved_budget: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub expense: Option<Decimal>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub site_engineer: Option<String>,
    #[serde(default)]
    pub subcontractors: Option<String>,
    #[serde(default)]
    pub contract_agreement: Option<String>,
    #[serde(default)]
    pub permits_licenses: Option<String>,
}

impl ProjectDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Field rules shared by live projects and staged drafts.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(PowermasonError::validation("Project name is required."));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(PowermasonError::validation(format!(
                "Project name must be at most {MAX_NAME_LEN} characters."
            )));
        }
        if let Some(location) = &self.location {
            if location.chars().count() > MAX_LOCATION_LEN {
                return Err(PowermasonError::validation(format!(
                    "Location must be at most {MAX_LOCATION_LEN} characters."
                )));
            }
        }
        for (label, value) in [
            ("Estimated cost", self.estimated_cost),
            ("Approved budget", self.approved_budget),
            ("Expense", self.expense),
        ] {
            if let Some(v) = value {
                if v < Decimal::ZERO {
                    return Err(PowermasonError::validation(format!(
                        "{label} cannot be negative."
                    )));
                }
                if v > max_amount() {
                    return Err(PowermasonError::validation(format!(
                        "{label} exceeds the maximum allowed amount."
                    )));
                }
            }
        }
        if let (Some(start), Some(target)) = (self.start_date, self.target_completion_date) {
            if target < start {
                return Err(PowermasonError::validation(
                    "Target completion date cannot be before the start date.",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub project_code: String,
    pub source: ProjectSource,
    #[serde(flatten)]
    pub details: ProjectDraft,
    pub created_by: Option<UserId>,
    pub status: ProjectStatus,
    pub progress: Decimal,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn approved_budget(&self) -> Option<Decimal> {
        self.details.approved_budget
    }

    pub fn is_managed_by(&self, user: UserId) -> bool {
        self.details.project_manager == Some(user)
    }

    pub fn is_created_or_assigned_to(&self, user: UserId) -> bool {
        self.created_by == Some(user) || self.details.assigned_to == Some(user)
    }
}

/// Input to [`crate::ports::ProjectStore::insert_project`]. The store issues
/// the id and code in the same transaction as the insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub source: ProjectSource,
    pub details: ProjectDraft,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFilter {
    #[serde(default)]
    pub source: Option<ProjectSource>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub project_manager: Option<UserId>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
}

impl ProjectFilter {
    pub fn matches(&self, p: &Project) -> bool {
        self.source.map_or(true, |s| p.source == s)
            && self.archived.map_or(true, |a| p.archived == a)
            && self
                .project_manager
                .map_or(true, |u| p.details.project_manager == Some(u))
            && self
                .client_id
                .map_or(true, |c| p.details.client_id == Some(c))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: i64,
    pub project_id: ProjectId,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One row of the costing dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectCosting {
    pub project_id: ProjectId,
    pub project_code: String,
    pub project_name: String,
    pub approved_budget: Decimal,
    pub total_planned: Decimal,
    pub total_allocated: Decimal,
    pub remaining: Decimal,
    #[serde(flatten)]
    pub costs: ProjectCostMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostingDashboard {
    pub projects: Vec<ProjectCosting>,
    pub total_planned: Decimal,
    pub total_allocated: Decimal,
    pub total_remaining: Decimal,
    pub total_expenses: Decimal,
}

impl CostingDashboard {
    pub fn from_rows(projects: Vec<ProjectCosting>) -> Self {
        let total_planned = projects.iter().map(|p| p.total_planned).sum();
        let total_allocated = projects.iter().map(|p| p.total_allocated).sum();
        let total_remaining = projects.iter().map(|p| p.remaining).sum();
        let total_expenses = projects.iter().map(|p| p.costs.total_expenses).sum();
        Self {
            projects,
            total_planned,
            total_allocated,
            total_remaining,
            total_expenses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn code_is_zero_padded_to_three() {
        assert_eq!(format_project_code(ProjectSource::GeneralContractor, 1), "GC-001");
        assert_eq!(format_project_code(ProjectSource::DirectClient, 42), "DC-042");
        assert_eq!(format_project_code(ProjectSource::DirectClient, 1234), "DC-1234");
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(Decimal::new(-5, 0)), Decimal::ZERO);
        assert_eq!(clamp_progress(Decimal::new(150, 0)), Decimal::ONE_HUNDRED);
        assert_eq!(clamp_progress(Decimal::new(425, 1)), Decimal::new(425, 1));
    }

    #[test]
    fn draft_accepts_budget_alias() {
        let draft: ProjectDraft =
            serde_json::from_value(json!({"project_name": "Warehouse A", "budget": 500000}))
                .unwrap();
        assert_eq!(draft.name, "Warehouse A");
        assert_eq!(draft.approved_budget, Some(Decimal::new(500_000, 0)));
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn draft_money_serializes_as_number() {
        let mut draft = ProjectDraft::named("Depot");
        draft.approved_budget = Some(Decimal::from_str("1250.5").unwrap());
        draft.start_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        let v = serde_json::to_value(&draft).unwrap();
        assert_eq!(v["approved_budget"], json!(1250.5));
        assert_eq!(v["start_date"], json!("2024-03-01"));
        assert_eq!(v["project_name"], json!("Depot"));
    }

    #[test]
    fn validate_rejects_blank_name_and_bad_dates() {
        assert!(ProjectDraft::named("   ").validate().is_err());

        let mut draft = ProjectDraft::named("Bridge");
        draft.start_date = NaiveDate::from_ymd_opt(2024, 5, 10);
        draft.target_completion_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(draft.validate().is_err());

        let mut draft = ProjectDraft::named("Bridge");
        draft.estimated_cost = Some(Decimal::new(-1, 0));
        assert!(draft.validate().is_err());
    }

    #[test]
    fn costing_dashboard_totals() {
        let row = |id, planned, allocated| ProjectCosting {
            project_id: id,
            project_code: format_project_code(ProjectSource::GeneralContractor, id),
            project_name: format!("P{id}"),
            approved_budget: Decimal::new(1000, 0),
            total_planned: Decimal::new(planned, 0),
            total_allocated: Decimal::new(allocated, 0),
            remaining: Decimal::new(planned - allocated, 0),
            costs: ProjectCostMetrics::new(
                Some(Decimal::new(1000, 0)),
                Decimal::new(allocated / 2, 0),
                Decimal::ZERO,
            ),
        };
        let dash = CostingDashboard::from_rows(vec![row(1, 500, 200), row(2, 300, 400)]);
        assert_eq!(dash.total_planned, Decimal::new(800, 0));
        assert_eq!(dash.total_allocated, Decimal::new(600, 0));
        assert_eq!(dash.total_remaining, Decimal::new(200, 0));
        assert_eq!(dash.total_expenses, Decimal::new(300, 0));
        assert_eq!(dash.projects[0].costs.cost_performance, Some(Decimal::new(10, 0)));
    }
}
