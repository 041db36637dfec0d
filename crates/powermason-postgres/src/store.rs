//! Postgres implementation of [`ProjectStore`].
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) to avoid a
//! compile-time DB requirement. Every check-then-write runs in one
//! transaction with the parent row locked `FOR UPDATE`.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgConnection, PgPool, Postgres};

use powermason_core::budget::{
    Allocation, AllocationRecorded, BudgetCategory, CategoryTotals, Expense, ExpenseRecorded,
    NewAllocation, NewBudgetCategory, NewExpense,
};
use powermason_core::costs::{
    check_task_allocation, NewProjectCost, NewTaskCost, ProjectCost, TaskCost,
};
use powermason_core::error::{PowermasonError, Result};
use powermason_core::ports::ProjectStore;
use powermason_core::project::{
    format_project_code, NewProject, Project, ProjectCosting, ProjectDraft, ProjectFile,
    ProjectFilter,
};
use powermason_core::schedule::{
    duplicate_scope_name, plan_scope_deletion, NewProgressUpdate, NewScope, NewTask,
    ProgressFile, ProgressUpdate, Scope, ScopeDeleted, ScopeDeletion, Task, TaskInput,
};
use powermason_core::staging::{
    ApprovedStaging, NewStaging, Resolution, StagingDecision, StagingProject,
};
use powermason_core::types::{
    AllocationId, BudgetId, Client, CostId, ProjectId, ProjectSource, ProjectStatus,
    ReviewStatus, Role, ScopeId, StagingId, TaskId, TaskStatus, UpdateId, UserId, UserProfile,
};

use crate::sqlx_types::{
    PgAllocationRow, PgBudgetRow, PgClientRow, PgCostingRow, PgDecisionRow, PgDependencyRow,
    PgExpenseRow, PgProgressFileRow, PgProgressUpdateRow, PgProjectCostRow, PgProjectFileRow,
    PgProjectRow, PgScopeRow, PgStagingRow, PgTaskCostRow, PgTaskRow, PgUserRow,
    ALLOCATION_COLUMNS, BUDGET_COLUMNS, COST_COLUMNS, DECISION_COLUMNS, EXPENSE_COLUMNS,
    PROJECT_COLUMNS, STAGING_COLUMNS, TASK_COLUMNS, TASK_COST_COLUMNS, UPDATE_COLUMNS,
    USER_COLUMNS,
};

/// Columns of [`ProjectDraft`], in bind order.
const DETAIL_COLUMNS: [&str; 21] = [
    "project_name",
    "description",
    "project_category",
    "project_type",
    "assigned_to",
    "project_manager_id",
    "client_id",
    "location",
    "gps_coordinates",
    "city_province",
    "start_date",
    "target_completion_date",
    "actual_completion_date",
    "estimated_cost",
    "approved_budget",
    "expense",
    "payment_terms",
    "site_engineer",
    "subcontractors",
    "contract_agreement",
    "permits_licenses",
];

/// Shared `WHERE` clause for [`ProjectFilter`]; binds `$1..$4`.
const FILTER_CLAUSE: &str = r#"
    ($1::text IS NULL OR p.source = $1)
    AND ($2::boolean IS NULL OR p.archived = $2)
    AND ($3::bigint IS NULL OR p.project_manager_id = $3)
    AND ($4::bigint IS NULL OR p.client_id = $4)
"#;

fn decode<R, T>(row: R) -> Result<T>
where
    R: TryInto<T, Error = String>,
{
    row.try_into()
        .map_err(|e: String| PowermasonError::Internal(anyhow!(e)))
}

fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    R: TryInto<T, Error = String>,
{
    rows.into_iter().map(decode).collect()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// A task row pointing at a scope that vanished mid-write.
fn task_write_error(e: sqlx::Error, scope_id: ScopeId) -> PowermasonError {
    if is_foreign_key_violation(&e) {
        PowermasonError::not_found("scope", scope_id)
    } else {
        PowermasonError::Internal(anyhow!(e))
    }
}

/// `LIKE` pattern matching `query` anywhere, with wildcards escaped.
fn contains_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn bind_details<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    d: &'q ProjectDraft,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    query
        .bind(d.name.trim())
        .bind(d.description.as_deref())
        .bind(d.category.map(|c| c.code()))
        .bind(d.project_type.as_deref())
        .bind(d.assigned_to)
        .bind(d.project_manager)
        .bind(d.client_id)
        .bind(d.location.as_deref())
        .bind(d.gps_coordinates.as_deref())
        .bind(d.city_province.as_deref())
        .bind(d.start_date)
        .bind(d.target_completion_date)
        .bind(d.actual_completion_date)
        .bind(d.estimated_cost)
        .bind(d.approved_budget)
        .bind(d.expense)
        .bind(d.payment_terms.as_deref())
        .bind(d.site_engineer.as_deref())
        .bind(d.subcontractors.as_deref())
        .bind(d.contract_agreement.as_deref())
        .bind(d.permits_licenses.as_deref())
}

// ── Row helpers usable inside and outside a transaction ──────

/// Lock one row by id. Returns false when it does not exist.
async fn lock_row(conn: &mut PgConnection, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT id FROM powermason.{table} WHERE id = $1 FOR UPDATE");
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    Ok(found.is_some())
}

async fn insert_project_row(conn: &mut PgConnection, new: &NewProject) -> Result<Project> {
    let id: i64 =
        sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('powermason.projects', 'id'))")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| anyhow!(e))?;
    let code = format_project_code(new.source, id);

    let placeholders: Vec<String> = (4..4 + DETAIL_COLUMNS.len())
        .map(|n| format!("${n}"))
        .collect();
    let sql = format!(
        r#"
        INSERT INTO powermason.projects AS p
            (id, project_code, source, {details}, created_by)
        VALUES ($1, $2, $3, {placeholders}, ${created_by})
        RETURNING {PROJECT_COLUMNS}
        "#,
        details = DETAIL_COLUMNS.join(", "),
        placeholders = placeholders.join(", "),
        created_by = 4 + DETAIL_COLUMNS.len(),
    );
    let query = sqlx::query_as::<_, PgProjectRow>(&sql)
        .bind(id)
        .bind(&code)
        .bind(new.source.code());
    let row = bind_details(query, &new.details)
        .bind(new.created_by)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    decode(row)
}

async fn fetch_budget(conn: &mut PgConnection, id: BudgetId) -> Result<Option<BudgetCategory>> {
    let sql = format!("SELECT {BUDGET_COLUMNS} FROM powermason.budget_categories WHERE id = $1");
    let row = sqlx::query_as::<_, PgBudgetRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    row.map(decode).transpose()
}

/// Planned amount against active allocations and recorded expenses.
async fn fetch_totals(conn: &mut PgConnection, budget_id: BudgetId) -> Result<CategoryTotals> {
    let row: Option<(Decimal, Decimal, Decimal)> = sqlx::query_as(
        r#"
        SELECT b.planned_amount,
               COALESCE((SELECT SUM(a.amount) FROM powermason.allocations a
                         WHERE a.budget_id = b.id AND a.deleted_at IS NULL), 0),
               COALESCE((SELECT SUM(e.amount) FROM powermason.expenses e
                         WHERE e.budget_id = b.id), 0)
        FROM powermason.budget_categories b
        WHERE b.id = $1
        "#,
    )
    .bind(budget_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?;
    let (planned, allocated, spent) =
        row.ok_or_else(|| PowermasonError::not_found("budget category", budget_id))?;
    Ok(CategoryTotals {
        planned,
        allocated,
        spent,
    })
}

async fn fetch_allocation_for_update(
    conn: &mut PgConnection,
    id: AllocationId,
) -> Result<Allocation> {
    let sql =
        format!("SELECT {ALLOCATION_COLUMNS} FROM powermason.allocations WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, PgAllocationRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?
        .map(Allocation::from)
        .ok_or_else(|| PowermasonError::not_found("allocation", id))
}

async fn fetch_scope_for_update(conn: &mut PgConnection, id: ScopeId) -> Result<Scope> {
    sqlx::query_as::<_, PgScopeRow>(
        r#"
        SELECT id, project_id, name, weight, deleted_at
        FROM powermason.scopes
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?
    .map(Scope::from)
    .ok_or_else(|| PowermasonError::not_found("scope", id))
}

async fn scope_name_taken(
    conn: &mut PgConnection,
    project_id: ProjectId,
    name: &str,
    except: Option<ScopeId>,
) -> Result<bool> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM powermason.scopes
            WHERE project_id = $1 AND name = $2 AND ($3::bigint IS NULL OR id <> $3)
        )
        "#,
    )
    .bind(project_id)
    .bind(name)
    .bind(except)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?;
    Ok(taken)
}

async fn fetch_staging_for_update(conn: &mut PgConnection, id: StagingId) -> Result<StagingProject> {
    let sql = format!(
        "SELECT {STAGING_COLUMNS} FROM powermason.staging_projects WHERE id = $1 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, PgStagingRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?
        .ok_or_else(|| PowermasonError::not_found("staging project", id))?;
    decode(row)
}

/// Remove the staging row and append the decision, in the caller's
/// transaction.
async fn close_staging(
    conn: &mut PgConnection,
    staging: &StagingProject,
    resolution: &Resolution,
    project_id: Option<ProjectId>,
) -> Result<StagingDecision> {
    sqlx::query("DELETE FROM powermason.staging_projects WHERE id = $1")
        .bind(staging.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;

    let sql = format!(
        r#"
        INSERT INTO powermason.staging_decisions
            (staging_id, project_name, decision, reviewed_by, comments, project_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {DECISION_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, PgDecisionRow>(&sql)
        .bind(staging.id)
        .bind(&staging.draft.name)
        .bind(resolution.decision.code())
        .bind(resolution.reviewed_by)
        .bind(resolution.comments.as_deref())
        .bind(project_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    decode(row)
}

async fn fetch_update_for_update(conn: &mut PgConnection, id: UpdateId) -> Result<ProgressUpdate> {
    let sql = format!(
        "SELECT {UPDATE_COLUMNS} FROM powermason.progress_updates WHERE id = $1 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, PgProgressUpdateRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?
        .ok_or_else(|| PowermasonError::not_found("progress update", id))?;
    decode(row)
}

async fn mark_reviewed(
    conn: &mut PgConnection,
    id: UpdateId,
    status: ReviewStatus,
    reviewer: UserId,
) -> Result<ProgressUpdate> {
    let sql = format!(
        r#"
        UPDATE powermason.progress_updates
        SET status = $2, reviewed_by = $3, reviewed_at = now()
        WHERE id = $1
        RETURNING {UPDATE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, PgProgressUpdateRow>(&sql)
        .bind(id)
        .bind(status.code())
        .bind(reviewer)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    decode(row)
}

/// Fill `dependencies` for each task from the join table.
async fn attach_dependencies(conn: &mut PgConnection, tasks: &mut [Task]) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }
    let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
    let rows = sqlx::query_as::<_, PgDependencyRow>(
        r#"
        SELECT task_id, depends_on_id
        FROM powermason.task_dependencies
        WHERE task_id = ANY($1)
        ORDER BY task_id, depends_on_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?;
    for task in tasks.iter_mut() {
        task.dependencies = rows
            .iter()
            .filter(|r| r.task_id == task.id)
            .map(|r| r.depends_on_id)
            .collect();
    }
    Ok(())
}

async fn replace_dependencies(
    conn: &mut PgConnection,
    task_id: TaskId,
    dependencies: &[TaskId],
) -> Result<()> {
    sqlx::query("DELETE FROM powermason.task_dependencies WHERE task_id = $1")
        .bind(task_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    if dependencies.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO powermason.task_dependencies (task_id, depends_on_id)
        SELECT $1, dep FROM UNNEST($2::bigint[]) AS dep
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(task_id)
    .bind(dependencies)
    .execute(&mut *conn)
    .await
    .map_err(|e| anyhow!(e))?;
    Ok(())
}

async fn fetch_task(conn: &mut PgConnection, id: TaskId, lock: bool) -> Result<Option<Task>> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM powermason.tasks WHERE id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, PgTaskRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| anyhow!(e))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut tasks = vec![decode::<_, Task>(row)?];
    attach_dependencies(conn, &mut tasks).await?;
    Ok(tasks.pop())
}

// ── PgStore ──────────────────────────────────────────────────

/// Postgres-backed project store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Provision an account. User management is otherwise external.
    pub async fn insert_user(&self, full_name: &str, email: &str, role: Role) -> Result<UserProfile> {
        let sql = format!(
            "INSERT INTO powermason.users (full_name, email, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PgUserRow>(&sql)
            .bind(full_name)
            .bind(email)
            .bind(role.code())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PowermasonError::Conflict(format!("user {email} already exists"))
                } else {
                    PowermasonError::Internal(anyhow!(e))
                }
            })?;
        decode(row)
    }

    pub async fn insert_client(
        &self,
        company_name: &str,
        email: &str,
        client_type: Option<ProjectSource>,
    ) -> Result<Client> {
        let row = sqlx::query_as::<_, PgClientRow>(
            r#"
            INSERT INTO powermason.clients (company_name, email, client_type)
            VALUES ($1, $2, $3)
            RETURNING id, company_name, contact_name, email, client_type
            "#,
        )
        .bind(company_name)
        .bind(email)
        .bind(client_type.map(|c| c.code()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        decode(row)
    }

    pub async fn list_project_files(&self, project_id: ProjectId) -> Result<Vec<ProjectFile>> {
        let rows = sqlx::query_as::<_, PgProjectFileRow>(
            r#"
            SELECT id, project_id, path, uploaded_at
            FROM powermason.project_files
            WHERE project_id = $1
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(ProjectFile::from).collect())
    }

    async fn update_project(&self, id: ProjectId, set: &str, bind: ProjectPatch) -> Result<Project> {
        let sql = format!(
            r#"
            UPDATE powermason.projects AS p
            SET {set}, updated_at = now()
            WHERE p.id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        let query = sqlx::query_as::<_, PgProjectRow>(&sql).bind(id);
        let query = match bind {
            ProjectPatch::Flag(v) => query.bind(v),
            ProjectPatch::Code(v) => query.bind(v),
            ProjectPatch::Amount(v) => query.bind(v),
            ProjectPatch::Progress(progress, status) => query.bind(progress).bind(status),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .ok_or_else(|| PowermasonError::not_found("project", id))?;
        decode(row)
    }
}

/// Values for the single-column project updates.
enum ProjectPatch {
    Flag(bool),
    Code(&'static str),
    Amount(Decimal),
    Progress(Decimal, &'static str),
}

#[async_trait]
impl ProjectStore for PgStore {
    // ── Users & clients ──────────────────────────────────────

    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM powermason.users WHERE id = $1");
        let row = sqlx::query_as::<_, PgUserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(decode).transpose()
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM powermason.users WHERE role = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, PgUserRow>(&sql)
            .bind(role.code())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn search_users(&self, role: Role, query: &str) -> Result<Vec<UserProfile>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM powermason.users
            WHERE role = $1 AND (full_name ILIKE $2 OR email ILIKE $2)
            ORDER BY full_name, id
            "#
        );
        let rows = sqlx::query_as::<_, PgUserRow>(&sql)
            .bind(role.code())
            .bind(contains_pattern(query))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn client_by_email(&self, email: &str) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, PgClientRow>(
            r#"
            SELECT id, company_name, contact_name, email, client_type
            FROM powermason.clients
            WHERE lower(email) = lower($1)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        row.map(decode).transpose()
    }

    // ── Projects ─────────────────────────────────────────────

    async fn insert_project(&self, new: NewProject) -> Result<Project> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let project = insert_project_row(&mut tx, &new).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        tracing::debug!(project_id = project.id, code = %project.project_code, "project inserted");
        Ok(project)
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM powermason.projects p WHERE p.id = $1");
        let row = sqlx::query_as::<_, PgProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(decode).transpose()
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM powermason.projects p WHERE {FILTER_CLAUSE} ORDER BY p.id DESC"
        );
        let rows = sqlx::query_as::<_, PgProjectRow>(&sql)
            .bind(filter.source.map(|s| s.code()))
            .bind(filter.archived)
            .bind(filter.project_manager)
            .bind(filter.client_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn update_project_details(
        &self,
        id: ProjectId,
        details: &ProjectDraft,
    ) -> Result<Project> {
        let assignments: Vec<String> = DETAIL_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ${}", i + 2))
            .collect();
        let sql = format!(
            r#"
            UPDATE powermason.projects AS p
            SET {}, updated_at = now()
            WHERE p.id = $1
            RETURNING {PROJECT_COLUMNS}
            "#,
            assignments.join(", ")
        );
        let query = sqlx::query_as::<_, PgProjectRow>(&sql).bind(id);
        let row = bind_details(query, details)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .ok_or_else(|| PowermasonError::not_found("project", id))?;
        decode(row)
    }

    async fn set_archived(&self, id: ProjectId, archived: bool) -> Result<Project> {
        self.update_project(id, "archived = $2", ProjectPatch::Flag(archived))
            .await
    }

    async fn set_status(&self, id: ProjectId, status: ProjectStatus) -> Result<Project> {
        self.update_project(id, "status = $2", ProjectPatch::Code(status.code()))
            .await
    }

    async fn set_approved_budget(&self, id: ProjectId, amount: Decimal) -> Result<Project> {
        self.update_project(id, "approved_budget = $2", ProjectPatch::Amount(amount))
            .await
    }

    async fn set_progress(
        &self,
        id: ProjectId,
        progress: Decimal,
        status: ProjectStatus,
    ) -> Result<Project> {
        self.update_project(
            id,
            "progress = $2, status = $3",
            ProjectPatch::Progress(progress, status.code()),
        )
        .await
    }

    async fn insert_project_file(&self, project_id: ProjectId, path: &str) -> Result<ProjectFile> {
        let row = sqlx::query_as::<_, PgProjectFileRow>(
            r#"
            INSERT INTO powermason.project_files (project_id, path)
            VALUES ($1, $2)
            RETURNING id, project_id, path, uploaded_at
            "#,
        )
        .bind(project_id)
        .bind(path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                PowermasonError::not_found("project", project_id)
            } else {
                PowermasonError::Internal(anyhow!(e))
            }
        })?;
        Ok(row.into())
    }

    async fn project_costing(&self, filter: &ProjectFilter) -> Result<Vec<ProjectCosting>> {
        let sql = format!(
            r#"
            SELECT p.id AS project_id, p.project_code, p.project_name,
                   COALESCE(p.approved_budget, 0) AS approved_budget,
                   COALESCE((SELECT SUM(b.planned_amount)
                             FROM powermason.budget_categories b
                             JOIN powermason.scopes s ON s.id = b.scope_id
                             WHERE b.project_id = p.id AND s.deleted_at IS NULL), 0)
                       AS total_planned,
                   COALESCE((SELECT SUM(a.amount)
                             FROM powermason.allocations a
                             JOIN powermason.budget_categories b ON b.id = a.budget_id
                             JOIN powermason.scopes s ON s.id = b.scope_id
                             WHERE b.project_id = p.id AND a.deleted_at IS NULL
                               AND s.deleted_at IS NULL), 0)
                       AS total_allocated,
                   COALESCE((SELECT SUM(c.amount)
                             FROM powermason.project_costs c
                             WHERE c.project_id = p.id), 0) AS total_expenses,
                   COALESCE((SELECT SUM(tc.allocated_amount)
                             FROM powermason.task_costs tc
                             JOIN powermason.tasks t ON t.id = tc.task_id
                             WHERE t.project_id = p.id), 0) AS total_task_allocations
            FROM powermason.projects p
            WHERE {FILTER_CLAUSE}
            ORDER BY p.id
            "#
        );
        let rows = sqlx::query_as::<_, PgCostingRow>(&sql)
            .bind(filter.source.map(|s| s.code()))
            .bind(filter.archived)
            .bind(filter.project_manager)
            .bind(filter.client_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(ProjectCosting::from).collect())
    }

    // ── Staging ──────────────────────────────────────────────

    async fn insert_staging(&self, new: NewStaging) -> Result<StagingProject> {
        let draft = serde_json::to_value(&new.draft).map_err(|e| anyhow!(e))?;
        let sql = format!(
            r#"
            INSERT INTO powermason.staging_projects (source, draft, submitted_by)
            VALUES ($1, $2, $3)
            RETURNING {STAGING_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgStagingRow>(&sql)
            .bind(new.source.code())
            .bind(draft)
            .bind(new.submitted_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode(row)
    }

    async fn get_staging(&self, id: StagingId) -> Result<Option<StagingProject>> {
        let sql = format!("SELECT {STAGING_COLUMNS} FROM powermason.staging_projects WHERE id = $1");
        let row = sqlx::query_as::<_, PgStagingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(decode).transpose()
    }

    async fn list_staging(&self, status: ReviewStatus) -> Result<Vec<StagingProject>> {
        let sql = format!(
            "SELECT {STAGING_COLUMNS} FROM powermason.staging_projects WHERE status = $1 ORDER BY submitted_at, id"
        );
        let rows = sqlx::query_as::<_, PgStagingRow>(&sql)
            .bind(status.code())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn approve_staging(
        &self,
        id: StagingId,
        resolution: Resolution,
    ) -> Result<ApprovedStaging> {
        if resolution.decision != ReviewStatus::Approved {
            return Err(PowermasonError::validation("approve_staging needs an approval"));
        }
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let staging = fetch_staging_for_update(&mut tx, id).await?;
        staging.status.resolve(resolution.decision)?;

        let mut details = staging.draft.clone();
        details.contract_agreement = resolution.contract_agreement.clone();
        let project = insert_project_row(
            &mut tx,
            &NewProject {
                source: staging.source,
                details,
                created_by: Some(staging.submitted_by),
            },
        )
        .await?;
        let decision = close_staging(&mut tx, &staging, &resolution, Some(project.id)).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
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
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let staging = fetch_staging_for_update(&mut tx, id).await?;
        staging.status.resolve(resolution.decision)?;
        let decision = close_staging(&mut tx, &staging, &resolution, None).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(decision)
    }

    async fn staging_decisions(&self, staging_id: StagingId) -> Result<Vec<StagingDecision>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM powermason.staging_decisions WHERE staging_id = $1 ORDER BY decided_at, id"
        );
        let rows = sqlx::query_as::<_, PgDecisionRow>(&sql)
            .bind(staging_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    // ── Scopes ───────────────────────────────────────────────

    async fn insert_scope(&self, new: NewScope) -> Result<Scope> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !lock_row(&mut tx, "projects", new.project_id).await? {
            return Err(PowermasonError::not_found("project", new.project_id));
        }
        if scope_name_taken(&mut tx, new.project_id, &new.name, None).await? {
            return Err(duplicate_scope_name(&new.name));
        }
        let row = sqlx::query_as::<_, PgScopeRow>(
            r#"
            INSERT INTO powermason.scopes (project_id, name, weight)
            VALUES ($1, $2, $3)
            RETURNING id, project_id, name, weight, deleted_at
            "#,
        )
        .bind(new.project_id)
        .bind(&new.name)
        .bind(new.weight)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_scope_name(&new.name)
            } else {
                PowermasonError::Internal(anyhow!(e))
            }
        })?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn get_scope(&self, id: ScopeId) -> Result<Option<Scope>> {
        let row = sqlx::query_as::<_, PgScopeRow>(
            "SELECT id, project_id, name, weight, deleted_at FROM powermason.scopes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Scope::from))
    }

    async fn list_scopes(&self, project_id: ProjectId, include_deleted: bool) -> Result<Vec<Scope>> {
        let rows = sqlx::query_as::<_, PgScopeRow>(
            r#"
            SELECT id, project_id, name, weight, deleted_at
            FROM powermason.scopes
            WHERE project_id = $1 AND ($2 OR deleted_at IS NULL)
            ORDER BY id
            "#,
        )
        .bind(project_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Scope::from).collect())
    }

    async fn update_scope(&self, id: ScopeId, name: &str, weight: Decimal) -> Result<Scope> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let scope = fetch_scope_for_update(&mut tx, id).await?;
        if scope_name_taken(&mut tx, scope.project_id, name, Some(id)).await? {
            return Err(duplicate_scope_name(name));
        }
        let row = sqlx::query_as::<_, PgScopeRow>(
            r#"
            UPDATE powermason.scopes SET name = $2, weight = $3
            WHERE id = $1
            RETURNING id, project_id, name, weight, deleted_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(weight)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_scope_name(name)
            } else {
                PowermasonError::Internal(anyhow!(e))
            }
        })?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn delete_scope(&self, id: ScopeId, force: bool) -> Result<ScopeDeleted> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let scope = fetch_scope_for_update(&mut tx, id).await?;
        let task_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM powermason.tasks WHERE scope_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
        let kind = plan_scope_deletion(task_count as u64, force)?;
        let sql = match kind {
            ScopeDeletion::Soft => "UPDATE powermason.scopes SET deleted_at = now() WHERE id = $1",
            // budget categories, allocations and expenses cascade
            ScopeDeletion::Hard => "DELETE FROM powermason.scopes WHERE id = $1",
        };
        sqlx::query(sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(ScopeDeleted::new(&scope, kind))
    }

    async fn restore_scope(&self, id: ScopeId) -> Result<Scope> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let scope = fetch_scope_for_update(&mut tx, id).await?;
        if scope.state.is_active() {
            return Err(PowermasonError::validation(
                "Scope is not deleted and cannot be restored.",
            ));
        }
        let row = sqlx::query_as::<_, PgScopeRow>(
            r#"
            UPDATE powermason.scopes SET deleted_at = NULL
            WHERE id = $1
            RETURNING id, project_id, name, weight, deleted_at
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    // ── Budget categories ────────────────────────────────────

    async fn insert_budget_category(&self, new: NewBudgetCategory) -> Result<BudgetCategory> {
        let sql = format!(
            r#"
            INSERT INTO powermason.budget_categories
                (project_id, scope_id, category, category_other, planned_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {BUDGET_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgBudgetRow>(&sql)
            .bind(new.project_id)
            .bind(new.scope_id)
            .bind(new.category.code())
            .bind(new.category_other.as_deref())
            .bind(new.planned_amount)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PowermasonError::Conflict(format!(
                        "A {} budget already exists for this scope.",
                        new.category.label()
                    ))
                } else if is_foreign_key_violation(&e) {
                    PowermasonError::not_found("scope", new.scope_id)
                } else {
                    PowermasonError::Internal(anyhow!(e))
                }
            })?;
        decode(row)
    }

    async fn get_budget_category(&self, id: BudgetId) -> Result<Option<BudgetCategory>> {
        let mut conn = self.pool.acquire().await.map_err(|e| anyhow!(e))?;
        fetch_budget(&mut conn, id).await
    }

    async fn list_budget_categories(&self, project_id: ProjectId) -> Result<Vec<BudgetCategory>> {
        let sql = format!(
            "SELECT {BUDGET_COLUMNS} FROM powermason.budget_categories WHERE project_id = $1 ORDER BY scope_id, id"
        );
        let rows = sqlx::query_as::<_, PgBudgetRow>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn update_planned_amount(&self, id: BudgetId, amount: Decimal) -> Result<BudgetCategory> {
        let sql = format!(
            r#"
            UPDATE powermason.budget_categories
            SET planned_amount = $2, updated_at = now()
            WHERE id = $1
            RETURNING {BUDGET_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgBudgetRow>(&sql)
            .bind(id)
            .bind(amount)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .ok_or_else(|| PowermasonError::not_found("budget category", id))?;
        decode(row)
    }

    async fn delete_budget_category(&self, id: BudgetId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !lock_row(&mut tx, "budget_categories", id).await? {
            return Err(PowermasonError::not_found("budget category", id));
        }
        // soft-deleted allocations count too
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM powermason.allocations WHERE budget_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
        if n > 0 {
            return Err(PowermasonError::validation(format!(
                "Cannot delete budget with {n} existing allocations. Remove allocations first."
            )));
        }
        sqlx::query("DELETE FROM powermason.budget_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    // ── Allocations ──────────────────────────────────────────

    async fn insert_allocation(&self, new: NewAllocation) -> Result<AllocationRecorded> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !lock_row(&mut tx, "budget_categories", new.budget_id).await? {
            return Err(PowermasonError::not_found("budget category", new.budget_id));
        }
        let sql = format!(
            r#"
            INSERT INTO powermason.allocations (budget_id, amount, note, date_allocated)
            VALUES ($1, $2, $3, $4)
            RETURNING {ALLOCATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgAllocationRow>(&sql)
            .bind(new.budget_id)
            .bind(new.amount)
            .bind(new.note.as_deref())
            .bind(new.date_allocated)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        let totals = fetch_totals(&mut tx, new.budget_id).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(AllocationRecorded {
            allocation: row.into(),
            totals,
        })
    }

    async fn get_allocation(&self, id: AllocationId) -> Result<Option<Allocation>> {
        let sql = format!("SELECT {ALLOCATION_COLUMNS} FROM powermason.allocations WHERE id = $1");
        let row = sqlx::query_as::<_, PgAllocationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(row.map(Allocation::from))
    }

    async fn list_allocations(&self, budget_id: BudgetId) -> Result<Vec<Allocation>> {
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM powermason.allocations WHERE budget_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, PgAllocationRow>(&sql)
            .bind(budget_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Allocation::from).collect())
    }

    async fn soft_delete_allocation(&self, id: AllocationId) -> Result<Allocation> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let mut allocation = fetch_allocation_for_update(&mut tx, id).await?;
        allocation.soft_delete(Utc::now())?;
        sqlx::query("UPDATE powermason.allocations SET deleted_at = $2 WHERE id = $1")
            .bind(id)
            .bind(allocation.state.deleted_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(allocation)
    }

    async fn restore_allocation(&self, id: AllocationId) -> Result<Allocation> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let mut allocation = fetch_allocation_for_update(&mut tx, id).await?;
        allocation.restore()?;
        sqlx::query("UPDATE powermason.allocations SET deleted_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(allocation)
    }

    async fn hard_delete_allocation(&self, id: AllocationId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM powermason.allocations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .rows_affected();
        if deleted == 0 {
            return Err(PowermasonError::not_found("allocation", id));
        }
        Ok(())
    }

    // ── Expenses ─────────────────────────────────────────────

    async fn insert_expense(&self, new: NewExpense) -> Result<ExpenseRecorded> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !lock_row(&mut tx, "budget_categories", new.budget_id).await? {
            return Err(PowermasonError::not_found("budget category", new.budget_id));
        }
        fetch_totals(&mut tx, new.budget_id)
            .await?
            .require_allocation()?;

        let sql = format!(
            r#"
            INSERT INTO powermason.expenses
                (project_id, budget_id, expense_type, expense_other, amount, vendor,
                 receipt_number, expense_date, description, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {EXPENSE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgExpenseRow>(&sql)
            .bind(new.project_id)
            .bind(new.budget_id)
            .bind(new.expense_type.code())
            .bind(new.expense_other.as_deref())
            .bind(new.amount)
            .bind(new.vendor.as_deref())
            .bind(new.receipt_number.as_deref())
            .bind(new.expense_date)
            .bind(new.description.as_deref())
            .bind(new.created_by)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        let expense: Expense = decode(row)?;
        let totals = fetch_totals(&mut tx, new.budget_id).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(ExpenseRecorded { expense, totals })
    }

    async fn list_expenses(&self, budget_id: BudgetId) -> Result<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM powermason.expenses WHERE budget_id = $1 ORDER BY expense_date DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PgExpenseRow>(&sql)
            .bind(budget_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn category_totals(&self, budget_id: BudgetId) -> Result<CategoryTotals> {
        let mut conn = self.pool.acquire().await.map_err(|e| anyhow!(e))?;
        fetch_totals(&mut conn, budget_id).await
    }

    // ── Project costs ────────────────────────────────────────

    async fn insert_project_cost(&self, new: NewProjectCost) -> Result<ProjectCost> {
        let sql = format!(
            r#"
            INSERT INTO powermason.project_costs
                (project_id, category, description, amount, date_incurred, linked_task)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgProjectCostRow>(&sql)
            .bind(new.project_id)
            .bind(new.category.code())
            .bind(&new.description)
            .bind(new.amount)
            .bind(new.date_incurred)
            .bind(new.linked_task)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    PowermasonError::NotFound(format!(
                        "project {} or linked task",
                        new.project_id
                    ))
                } else {
                    PowermasonError::Internal(anyhow!(e))
                }
            })?;
        decode(row)
    }

    async fn get_project_cost(&self, id: CostId) -> Result<Option<ProjectCost>> {
        let sql = format!("SELECT {COST_COLUMNS} FROM powermason.project_costs WHERE id = $1");
        sqlx::query_as::<_, PgProjectCostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .map(decode)
            .transpose()
    }

    async fn list_project_costs(&self, project_id: ProjectId) -> Result<Vec<ProjectCost>> {
        let sql = format!(
            "SELECT {COST_COLUMNS} FROM powermason.project_costs WHERE project_id = $1 ORDER BY date_incurred DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PgProjectCostRow>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn insert_task_cost(&self, new: NewTaskCost) -> Result<TaskCost> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let cost_amount: Option<Decimal> = sqlx::query_scalar(
            "SELECT amount FROM powermason.project_costs WHERE id = $1 FOR UPDATE",
        )
        .bind(new.cost_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;
        let cost_amount =
            cost_amount.ok_or_else(|| PowermasonError::not_found("project cost", new.cost_id))?;
        let already: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(allocated_amount), 0) FROM powermason.task_costs WHERE cost_id = $1",
        )
        .bind(new.cost_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;
        check_task_allocation(cost_amount, already, new.allocated_amount)?;

        let sql = format!(
            r#"
            INSERT INTO powermason.task_costs (task_id, cost_id, allocated_amount)
            VALUES ($1, $2, $3)
            RETURNING {TASK_COST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgTaskCostRow>(&sql)
            .bind(new.task_id)
            .bind(new.cost_id)
            .bind(new.allocated_amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    PowermasonError::not_found("task", new.task_id)
                } else {
                    PowermasonError::Internal(anyhow!(e))
                }
            })?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }

    async fn list_task_costs(&self, project_id: ProjectId) -> Result<Vec<TaskCost>> {
        let rows = sqlx::query_as::<_, PgTaskCostRow>(
            r#"
            SELECT tc.id, tc.task_id, tc.cost_id, tc.allocated_amount
            FROM powermason.task_costs tc
            JOIN powermason.tasks t ON t.id = tc.task_id
            WHERE t.project_id = $1
            ORDER BY tc.id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(TaskCost::from).collect())
    }

    // ── Tasks ────────────────────────────────────────────────

    async fn insert_task(&self, new: NewTask) -> Result<Task> {
        let input = &new.input;
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !lock_row(&mut tx, "scopes", input.scope_id).await? {
            return Err(PowermasonError::not_found("scope", input.scope_id));
        }
        let sql = format!(
            r#"
            INSERT INTO powermason.tasks
                (project_id, scope_id, name, description, assigned_to, start_date, end_date,
                 duration_days, manhours, weight)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgTaskRow>(&sql)
            .bind(new.project_id)
            .bind(input.scope_id)
            .bind(input.name.trim())
            .bind(input.description.as_deref())
            .bind(input.assigned_to)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.duration_days())
            .bind(input.manhours())
            .bind(input.weight)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| task_write_error(e, input.scope_id))?;
        let mut task: Task = decode(row)?;
        replace_dependencies(&mut tx, task.id, &input.dependencies).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        task.dependencies = input.dependencies.clone();
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let mut conn = self.pool.acquire().await.map_err(|e| anyhow!(e))?;
        fetch_task(&mut conn, id, false).await
    }

    async fn list_tasks(&self, project_id: ProjectId, include_archived: bool) -> Result<Vec<Task>> {
        let mut conn = self.pool.acquire().await.map_err(|e| anyhow!(e))?;
        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS} FROM powermason.tasks
            WHERE project_id = $1 AND ($2 OR NOT archived)
            ORDER BY start_date, id
            "#
        );
        let rows = sqlx::query_as::<_, PgTaskRow>(&sql)
            .bind(project_id)
            .bind(include_archived)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| anyhow!(e))?;
        let mut tasks: Vec<Task> = decode_all(rows)?;
        attach_dependencies(&mut conn, &mut tasks).await?;
        Ok(tasks)
    }

    async fn update_task(&self, id: TaskId, input: &TaskInput) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        if !lock_row(&mut tx, "scopes", input.scope_id).await? {
            return Err(PowermasonError::not_found("scope", input.scope_id));
        }
        let sql = format!(
            r#"
            UPDATE powermason.tasks
            SET scope_id = $2, name = $3, description = $4, assigned_to = $5,
                start_date = $6, end_date = $7, duration_days = $8, manhours = $9,
                weight = $10, updated_at = now()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgTaskRow>(&sql)
            .bind(id)
            .bind(input.scope_id)
            .bind(input.name.trim())
            .bind(input.description.as_deref())
            .bind(input.assigned_to)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.duration_days())
            .bind(input.manhours())
            .bind(input.weight)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| task_write_error(e, input.scope_id))?
            .ok_or_else(|| PowermasonError::not_found("task", id))?;
        let mut task: Task = decode(row)?;
        replace_dependencies(&mut tx, id, &input.dependencies).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        task.dependencies = input.dependencies.clone();
        Ok(task)
    }

    async fn set_tasks_archived(
        &self,
        project_id: ProjectId,
        ids: &[TaskId],
        archived: bool,
    ) -> Result<u64> {
        let changed = sqlx::query(
            r#"
            UPDATE powermason.tasks SET archived = $3, updated_at = now()
            WHERE project_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(project_id)
        .bind(ids)
        .bind(archived)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?
        .rows_affected();
        Ok(changed)
    }

    // ── Progress updates ─────────────────────────────────────

    async fn insert_progress_update(&self, new: NewProgressUpdate) -> Result<ProgressUpdate> {
        let sql = format!(
            r#"
            INSERT INTO powermason.progress_updates (task_id, reported_by, progress_percent, remarks)
            VALUES ($1, $2, $3, $4)
            RETURNING {UPDATE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PgProgressUpdateRow>(&sql)
            .bind(new.task_id)
            .bind(new.reported_by)
            .bind(new.progress_percent)
            .bind(new.remarks.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    PowermasonError::not_found("task", new.task_id)
                } else {
                    PowermasonError::Internal(anyhow!(e))
                }
            })?;
        decode(row)
    }

    async fn get_progress_update(&self, id: UpdateId) -> Result<Option<ProgressUpdate>> {
        let sql = format!("SELECT {UPDATE_COLUMNS} FROM powermason.progress_updates WHERE id = $1");
        let row = sqlx::query_as::<_, PgProgressUpdateRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(decode).transpose()
    }

    async fn list_progress_updates(
        &self,
        status: Option<ReviewStatus>,
        reported_by: Option<UserId>,
    ) -> Result<Vec<ProgressUpdate>> {
        let sql = format!(
            r#"
            SELECT {UPDATE_COLUMNS} FROM powermason.progress_updates
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::bigint IS NULL OR reported_by = $2)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows = sqlx::query_as::<_, PgProgressUpdateRow>(&sql)
            .bind(status.map(|s| s.code()))
            .bind(reported_by)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        decode_all(rows)
    }

    async fn approve_progress_update(
        &self,
        id: UpdateId,
        reviewer: UserId,
    ) -> Result<(ProgressUpdate, Task)> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let pending = fetch_update_for_update(&mut tx, id).await?;
        if fetch_task(&mut tx, pending.task_id, true).await?.is_none() {
            return Err(PowermasonError::not_found("task", pending.task_id));
        }
        let status = pending.status.resolve(ReviewStatus::Approved)?;
        let update = mark_reviewed(&mut tx, id, status, reviewer).await?;

        let percent = update.progress_percent;
        sqlx::query(
            r#"
            UPDATE powermason.tasks SET progress = $2, status = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(update.task_id)
        .bind(percent)
        .bind(TaskStatus::from_progress(percent).code())
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;
        let task = fetch_task(&mut tx, update.task_id, false)
            .await?
            .ok_or_else(|| PowermasonError::not_found("task", update.task_id))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok((update, task))
    }

    async fn reject_progress_update(&self, id: UpdateId, reviewer: UserId) -> Result<ProgressUpdate> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let pending = fetch_update_for_update(&mut tx, id).await?;
        let status = pending.status.resolve(ReviewStatus::Rejected)?;
        let update = mark_reviewed(&mut tx, id, status, reviewer).await?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(update)
    }

    async fn count_pending_updates(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM powermason.progress_updates WHERE status = $1",
        )
        .bind(ReviewStatus::Pending.code())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(n as u64)
    }

    async fn insert_progress_file(&self, update_id: UpdateId, path: &str) -> Result<ProgressFile> {
        let row = sqlx::query_as::<_, PgProgressFileRow>(
            r#"
            INSERT INTO powermason.progress_files (update_id, path)
            VALUES ($1, $2)
            RETURNING id, update_id, path, uploaded_at
            "#,
        )
        .bind(update_id)
        .bind(path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                PowermasonError::not_found("progress update", update_id)
            } else {
                PowermasonError::Internal(anyhow!(e))
            }
        })?;
        Ok(row.into())
    }

    async fn list_progress_files(&self, update_id: UpdateId) -> Result<Vec<ProgressFile>> {
        let rows = sqlx::query_as::<_, PgProgressFileRow>(
            r#"
            SELECT id, update_id, path, uploaded_at FROM powermason.progress_files
            WHERE update_id = $1 ORDER BY id
            "#,
        )
        .bind(update_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(ProgressFile::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(contains_pattern("ana"), "%ana%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn unrelated_errors_stay_internal() {
        let err = task_write_error(sqlx::Error::RowNotFound, 9);
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn detail_columns_match_draft_fields() {
        // one bind per column in bind_details
        assert_eq!(DETAIL_COLUMNS.len(), 21);
        assert_eq!(DETAIL_COLUMNS[0], "project_name");
        assert_eq!(DETAIL_COLUMNS[5], "project_manager_id");
    }
}
