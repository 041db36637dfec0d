//! Row structs for runtime-checked queries and their conversion into core
//! types. Coded enums arrive as TEXT and are parsed here; an unknown code
//! is a corrupt row, reported as a `String` error.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use powermason_core::budget::{Allocation, BudgetCategory, Expense};
use powermason_core::costs::{ProjectCost, ProjectCostMetrics, TaskCost};
use powermason_core::project::{Project, ProjectCosting, ProjectDraft, ProjectFile};
use powermason_core::schedule::{ProgressFile, ProgressUpdate, Scope, Task};
use powermason_core::staging::{StagingDecision, StagingProject};
use powermason_core::types::{Client, ProjectCategory, ProjectSource, RecordState, UserProfile};

pub(crate) const USER_COLUMNS: &str = "id, full_name, email, role";

pub(crate) const PROJECT_COLUMNS: &str = r#"
    id, project_code, source, project_name, description, project_category, project_type,
    assigned_to, project_manager_id, client_id, location, gps_coordinates, city_province,
    start_date, target_completion_date, actual_completion_date,
    estimated_cost, approved_budget, expense, payment_terms, site_engineer,
    subcontractors, contract_agreement, permits_licenses,
    created_by, status, progress, archived, created_at, updated_at
"#;

pub(crate) const STAGING_COLUMNS: &str = "id, source, draft, submitted_by, submitted_at, status";

pub(crate) const DECISION_COLUMNS: &str =
    "id, staging_id, project_name, decision, reviewed_by, comments, project_id, decided_at";

pub(crate) const BUDGET_COLUMNS: &str =
    "id, project_id, scope_id, category, category_other, planned_amount, created_at, updated_at";

pub(crate) const ALLOCATION_COLUMNS: &str =
    "id, budget_id, amount, note, date_allocated, deleted_at";

pub(crate) const EXPENSE_COLUMNS: &str = r#"
    id, project_id, budget_id, expense_type, expense_other, amount, vendor,
    receipt_number, expense_date, description, created_by, created_at
"#;

pub(crate) const TASK_COLUMNS: &str = r#"
    id, project_id, scope_id, name, description, assigned_to, start_date, end_date,
    duration_days, manhours, weight, progress, status, archived, created_at, updated_at
"#;

pub(crate) const COST_COLUMNS: &str =
    "id, project_id, category, description, amount, date_incurred, linked_task, created_at";

pub(crate) const TASK_COST_COLUMNS: &str = "id, task_id, cost_id, allocated_amount";

pub(crate) const UPDATE_COLUMNS: &str = r#"
    id, task_id, reported_by, progress_percent, remarks, status,
    reviewed_by, reviewed_at, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgUserRow {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: String,
}

impl TryFrom<PgUserRow> for UserProfile {
    type Error = String;

    fn try_from(r: PgUserRow) -> Result<Self, Self::Error> {
        Ok(UserProfile {
            id: r.id,
            full_name: r.full_name,
            email: r.email,
            role: r.role.try_into()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgClientRow {
    pub id: i64,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub email: String,
    pub client_type: Option<String>,
}

impl TryFrom<PgClientRow> for Client {
    type Error = String;

    fn try_from(r: PgClientRow) -> Result<Self, Self::Error> {
        Ok(Client {
            id: r.id,
            company_name: r.company_name,
            contact_name: r.contact_name,
            email: r.email,
            client_type: r.client_type.map(ProjectSource::try_from).transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgProjectRow {
    pub id: i64,
    pub project_code: String,
    pub source: String,
    pub project_name: String,
    pub description: Option<String>,
    pub project_category: Option<String>,
    pub project_type: Option<String>,
    pub assigned_to: Option<i64>,
    pub project_manager_id: Option<i64>,
    pub client_id: Option<i64>,
    pub location: Option<String>,
    pub gps_coordinates: Option<String>,
    pub city_province: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<NaiveDate>,
    pub estimated_cost: Option<Decimal>,
    pub approved_budget: Option<Decimal>,
    pub expense: Option<Decimal>,
    pub payment_terms: Option<String>,
    pub site_engineer: Option<String>,
    pub subcontractors: Option<String>,
    pub contract_agreement: Option<String>,
    pub permits_licenses: Option<String>,
    pub created_by: Option<i64>,
    pub status: String,
    pub progress: Decimal,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgProjectRow> for Project {
    type Error = String;

    fn try_from(r: PgProjectRow) -> Result<Self, Self::Error> {
        let details = ProjectDraft {
            name: r.project_name,
            description: r.description,
            category: r
                .project_category
                .map(ProjectCategory::try_from)
                .transpose()?,
            project_type: r.project_type,
            assigned_to: r.assigned_to,
            project_manager: r.project_manager_id,
            client_id: r.client_id,
            location: r.location,
            gps_coordinates: r.gps_coordinates,
            city_province: r.city_province,
            start_date: r.start_date,
            target_completion_date: r.target_completion_date,
            actual_completion_date: r.actual_completion_date,
            estimated_cost: r.estimated_cost,
            approved_budget: r.approved_budget,
            expense: r.expense,
            payment_terms: r.payment_terms,
            site_engineer: r.site_engineer,
            subcontractors: r.subcontractors,
            contract_agreement: r.contract_agreement,
            permits_licenses: r.permits_licenses,
        };
        Ok(Project {
            id: r.id,
            project_code: r.project_code,
            source: r.source.try_into()?,
            details,
            created_by: r.created_by,
            status: r.status.try_into()?,
            progress: r.progress,
            archived: r.archived,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgProjectFileRow {
    pub id: i64,
    pub project_id: i64,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<PgProjectFileRow> for ProjectFile {
    fn from(r: PgProjectFileRow) -> Self {
        ProjectFile {
            id: r.id,
            project_id: r.project_id,
            path: r.path,
            uploaded_at: r.uploaded_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgCostingRow {
    pub project_id: i64,
    pub project_code: String,
    pub project_name: String,
    pub approved_budget: Decimal,
    pub total_planned: Decimal,
    pub total_allocated: Decimal,
    pub total_expenses: Decimal,
    pub total_task_allocations: Decimal,
}

impl From<PgCostingRow> for ProjectCosting {
    fn from(r: PgCostingRow) -> Self {
        ProjectCosting {
            project_id: r.project_id,
            project_code: r.project_code,
            project_name: r.project_name,
            approved_budget: r.approved_budget,
            remaining: r.total_planned - r.total_allocated,
            total_planned: r.total_planned,
            total_allocated: r.total_allocated,
            // a zero budget here is a missing one; neither yields a performance figure
            costs: ProjectCostMetrics::new(
                Some(r.approved_budget),
                r.total_expenses,
                r.total_task_allocations,
            ),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgProjectCostRow {
    pub id: i64,
    pub project_id: i64,
    pub category: String,
    pub description: String,
    pub amount: Decimal,
    pub date_incurred: NaiveDate,
    pub linked_task: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PgProjectCostRow> for ProjectCost {
    type Error = String;

    fn try_from(r: PgProjectCostRow) -> Result<Self, Self::Error> {
        Ok(ProjectCost {
            id: r.id,
            project_id: r.project_id,
            category: r.category.try_into()?,
            description: r.description,
            amount: r.amount,
            date_incurred: r.date_incurred,
            linked_task: r.linked_task,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgTaskCostRow {
    pub id: i64,
    pub task_id: i64,
    pub cost_id: i64,
    pub allocated_amount: Decimal,
}

impl From<PgTaskCostRow> for TaskCost {
    fn from(r: PgTaskCostRow) -> Self {
        TaskCost {
            id: r.id,
            task_id: r.task_id,
            cost_id: r.cost_id,
            allocated_amount: r.allocated_amount,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgProgressFileRow {
    pub id: i64,
    pub update_id: i64,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<PgProgressFileRow> for ProgressFile {
    fn from(r: PgProgressFileRow) -> Self {
        ProgressFile {
            id: r.id,
            update_id: r.update_id,
            path: r.path,
            uploaded_at: r.uploaded_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgStagingRow {
    pub id: i64,
    pub source: String,
    pub draft: serde_json::Value,
    pub submitted_by: i64,
    pub submitted_at: DateTime<Utc>,
    pub status: String,
}

impl TryFrom<PgStagingRow> for StagingProject {
    type Error = String;

    fn try_from(r: PgStagingRow) -> Result<Self, Self::Error> {
        let draft: ProjectDraft = serde_json::from_value(r.draft)
            .map_err(|e| format!("staging {} has an unreadable draft: {e}", r.id))?;
        Ok(StagingProject {
            id: r.id,
            source: r.source.try_into()?,
            draft,
            submitted_by: r.submitted_by,
            submitted_at: r.submitted_at,
            status: r.status.try_into()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgDecisionRow {
    pub id: i64,
    pub staging_id: i64,
    pub project_name: String,
    pub decision: String,
    pub reviewed_by: i64,
    pub comments: Option<String>,
    pub project_id: Option<i64>,
    pub decided_at: DateTime<Utc>,
}

impl TryFrom<PgDecisionRow> for StagingDecision {
    type Error = String;

    fn try_from(r: PgDecisionRow) -> Result<Self, Self::Error> {
        Ok(StagingDecision {
            id: r.id,
            staging_id: r.staging_id,
            project_name: r.project_name,
            decision: r.decision.try_into()?,
            reviewed_by: r.reviewed_by,
            comments: r.comments,
            project_id: r.project_id,
            decided_at: r.decided_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgScopeRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub weight: Decimal,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<PgScopeRow> for Scope {
    fn from(r: PgScopeRow) -> Self {
        Scope {
            id: r.id,
            project_id: r.project_id,
            name: r.name,
            weight: r.weight,
            state: RecordState::from_deleted_at(r.deleted_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgBudgetRow {
    pub id: i64,
    pub project_id: i64,
    pub scope_id: i64,
    pub category: String,
    pub category_other: Option<String>,
    pub planned_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgBudgetRow> for BudgetCategory {
    type Error = String;

    fn try_from(r: PgBudgetRow) -> Result<Self, Self::Error> {
        Ok(BudgetCategory {
            id: r.id,
            project_id: r.project_id,
            scope_id: r.scope_id,
            category: r.category.try_into()?,
            category_other: r.category_other,
            planned_amount: r.planned_amount,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgAllocationRow {
    pub id: i64,
    pub budget_id: i64,
    pub amount: Decimal,
    pub note: Option<String>,
    pub date_allocated: NaiveDate,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<PgAllocationRow> for Allocation {
    fn from(r: PgAllocationRow) -> Self {
        Allocation {
            id: r.id,
            budget_id: r.budget_id,
            amount: r.amount,
            note: r.note,
            date_allocated: r.date_allocated,
            state: RecordState::from_deleted_at(r.deleted_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgExpenseRow {
    pub id: i64,
    pub project_id: i64,
    pub budget_id: i64,
    pub expense_type: String,
    pub expense_other: Option<String>,
    pub amount: Decimal,
    pub vendor: Option<String>,
    pub receipt_number: Option<String>,
    pub expense_date: NaiveDate,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PgExpenseRow> for Expense {
    type Error = String;

    fn try_from(r: PgExpenseRow) -> Result<Self, Self::Error> {
        Ok(Expense {
            id: r.id,
            project_id: r.project_id,
            budget_id: r.budget_id,
            expense_type: r.expense_type.try_into()?,
            expense_other: r.expense_other,
            amount: r.amount,
            vendor: r.vendor,
            receipt_number: r.receipt_number,
            expense_date: r.expense_date,
            description: r.description,
            created_by: r.created_by,
            created_at: r.created_at,
        })
    }
}

/// Dependencies live in their own table; the store fills them in.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgTaskRow {
    pub id: i64,
    pub project_id: i64,
    pub scope_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub assigned_to: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
    pub manhours: Decimal,
    pub weight: Decimal,
    pub progress: Decimal,
    pub status: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgTaskRow> for Task {
    type Error = String;

    fn try_from(r: PgTaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: r.id,
            project_id: r.project_id,
            scope_id: r.scope_id,
            name: r.name,
            description: r.description,
            assigned_to: r.assigned_to,
            start_date: r.start_date,
            end_date: r.end_date,
            duration_days: r.duration_days,
            manhours: r.manhours,
            weight: r.weight,
            progress: r.progress,
            status: r.status.try_into()?,
            archived: r.archived,
            dependencies: Vec::new(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgDependencyRow {
    pub task_id: i64,
    pub depends_on_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgProgressUpdateRow {
    pub id: i64,
    pub task_id: i64,
    pub reported_by: i64,
    pub progress_percent: Decimal,
    pub remarks: Option<String>,
    pub status: String,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PgProgressUpdateRow> for ProgressUpdate {
    type Error = String;

    fn try_from(r: PgProgressUpdateRow) -> Result<Self, Self::Error> {
        Ok(ProgressUpdate {
            id: r.id,
            task_id: r.task_id,
            reported_by: r.reported_by,
            progress_percent: r.progress_percent,
            remarks: r.remarks,
            status: r.status.try_into()?,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            created_at: r.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powermason_core::types::{ProjectStatus, ReviewStatus};

    fn project_row() -> PgProjectRow {
        PgProjectRow {
            id: 7,
            project_code: "GC-007".into(),
            source: "GC".into(),
            project_name: "Harbour Bridge".into(),
            description: None,
            project_category: Some("PUB".into()),
            project_type: None,
            assigned_to: None,
            project_manager_id: Some(3),
            client_id: None,
            location: None,
            gps_coordinates: None,
            city_province: None,
            start_date: None,
            target_completion_date: None,
            actual_completion_date: None,
            estimated_cost: None,
            approved_budget: Some(Decimal::new(250_000, 0)),
            expense: None,
            payment_terms: None,
            site_engineer: None,
            subcontractors: None,
            contract_agreement: None,
            permits_licenses: None,
            created_by: Some(1),
            status: "OG".into(),
            progress: Decimal::new(4250, 2),
            archived: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn costing_row_without_budget_has_no_performance() {
        let row = PgCostingRow {
            project_id: 2,
            project_code: "GC-002".into(),
            project_name: "Depot".into(),
            approved_budget: Decimal::ZERO,
            total_planned: Decimal::new(500, 0),
            total_allocated: Decimal::new(200, 0),
            total_expenses: Decimal::new(90, 0),
            total_task_allocations: Decimal::new(40, 0),
        };
        let costing = ProjectCosting::from(row);
        assert_eq!(costing.remaining, Decimal::new(300, 0));
        assert_eq!(costing.costs.cost_performance, None);
        assert_eq!(costing.costs.remaining_budget, Decimal::new(-40, 0));
    }

    #[test]
    fn cost_row_parses_category() {
        let row = PgProjectCostRow {
            id: 1,
            project_id: 2,
            category: "EQP".into(),
            description: "Crane".into(),
            amount: Decimal::new(1200, 0),
            date_incurred: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            linked_task: None,
            created_at: Utc::now(),
        };
        let cost: ProjectCost = row.try_into().unwrap();
        assert_eq!(cost.category, powermason_core::types::CostCategory::Equipment);
    }

    #[test]
    fn project_row_maps_codes() {
        let project: Project = project_row().try_into().unwrap();
        assert_eq!(project.source, ProjectSource::GeneralContractor);
        assert_eq!(project.status, ProjectStatus::Ongoing);
        assert_eq!(project.details.project_manager, Some(3));
        assert_eq!(project.name(), "Harbour Bridge");
    }

    #[test]
    fn unknown_code_is_an_error() {
        let mut row = project_row();
        row.status = "XX".into();
        let err = Project::try_from(row).unwrap_err();
        assert!(err.contains("XX"));

        let user = PgUserRow {
            id: 1,
            full_name: "A".into(),
            email: "a@example.com".into(),
            role: "ZZ".into(),
        };
        assert!(UserProfile::try_from(user).is_err());
    }

    #[test]
    fn staging_draft_is_read_from_json() {
        let row = PgStagingRow {
            id: 4,
            source: "DC".into(),
            draft: serde_json::json!({"project_name": "Warehouse A", "budget": 500000}),
            submitted_by: 2,
            submitted_at: Utc::now(),
            status: "PL".into(),
        };
        let staging: StagingProject = row.try_into().unwrap();
        assert_eq!(staging.status, ReviewStatus::Pending);
        assert_eq!(staging.draft.approved_budget, Some(Decimal::new(500_000, 0)));
    }

    #[test]
    fn deleted_at_becomes_record_state() {
        let at = Utc::now();
        let scope: Scope = PgScopeRow {
            id: 1,
            project_id: 1,
            name: "Shell".into(),
            weight: Decimal::ONE_HUNDRED,
            deleted_at: Some(at),
        }
        .into();
        assert_eq!(scope.state, RecordState::Deleted { at });
    }
}
