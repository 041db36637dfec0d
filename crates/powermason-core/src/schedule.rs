//! Scopes, tasks, progress updates and the progress roll-up.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PowermasonError, Result};
use crate::types::{
    ProgressFileId, ProjectId, RecordState, ReviewStatus, ScopeId, TaskId, TaskStatus, UpdateId,
    UserId,
};
use crate::warning::Warning;

pub const HOURS_PER_DAY: i64 = 8;

// ─── Scopes ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub project_id: ProjectId,
    pub name: String,
    pub weight: Decimal,
    pub state: RecordState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewScope {
    pub project_id: ProjectId,
    pub name: String,
    pub weight: Decimal,
}

/// Trimmed name and weight in `(0, 100]`.
pub fn validate_scope(name: &str, weight: Decimal) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PowermasonError::validation("Scope name is required."));
    }
    if weight <= Decimal::ZERO || weight > Decimal::ONE_HUNDRED {
        return Err(PowermasonError::validation(
            "Weight must be between 0.01 and 100.",
        ));
    }
    Ok(name.to_string())
}

pub fn duplicate_scope_name(name: &str) -> PowermasonError {
    PowermasonError::Conflict(format!("A scope with name \"{name}\" already exists."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeDeletion {
    Soft,
    Hard,
}

/// A scope with tasks can only be hidden; a forced hard delete of such a
/// scope is refused.
pub fn plan_scope_deletion(task_count: u64, force: bool) -> Result<ScopeDeletion> {
    match (task_count, force) {
        (0, _) => Ok(ScopeDeletion::Hard),
        (_, true) => Err(PowermasonError::validation(
            "Cannot permanently delete scope with associated tasks. Use soft delete instead.",
        )),
        (_, false) => Ok(ScopeDeletion::Soft),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeDeleted {
    pub scope_id: ScopeId,
    pub kind: ScopeDeletion,
    pub message: String,
}

impl ScopeDeleted {
    pub fn new(scope: &Scope, kind: ScopeDeletion) -> Self {
        let message = match kind {
            ScopeDeletion::Soft => format!(
                "Scope '{}' has been soft deleted (hidden but preserved for existing tasks).",
                scope.name
            ),
            ScopeDeletion::Hard => format!("Scope '{}' has been permanently deleted.", scope.name),
        };
        Self {
            scope_id: scope.id,
            kind,
            message,
        }
    }
}

// ─── Tasks ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub scope_id: ScopeId,
    pub name: String,
    pub description: Option<String>,
    pub assigned_to: Option<UserId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
    pub manhours: Decimal,
    pub weight: Decimal,
    pub progress: Decimal,
    pub status: TaskStatus,
    pub archived: bool,
    pub dependencies: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating or editing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    pub scope_id: ScopeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weight: Decimal,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl TaskInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PowermasonError::validation("Task name is required."));
        }
        if self.end_date < self.start_date {
            return Err(PowermasonError::validation(
                "End date cannot be before start date.",
            ));
        }
        if self.weight <= Decimal::ZERO || self.weight > Decimal::ONE_HUNDRED {
            return Err(PowermasonError::validation(
                "Task weight must be between 0.01 and 100.",
            ));
        }
        Ok(())
    }

    /// Inclusive day count.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn manhours(&self) -> Decimal {
        Decimal::from(self.duration_days() * HOURS_PER_DAY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub input: TaskInput,
}

/// Warn when the weights of a scope's tasks add up past 100%.
///
/// `tasks` are the scope's other tasks; `weight` is the one being saved.
pub fn scope_weight_overflow(scope_id: ScopeId, tasks: &[Task], weight: Decimal) -> Option<Warning> {
    let total: Decimal = tasks
        .iter()
        .filter(|t| t.scope_id == scope_id)
        .map(|t| t.weight)
        .sum::<Decimal>()
        + weight;
    (total > Decimal::ONE_HUNDRED).then_some(Warning::ScopeWeightExceeded {
        scope_id,
        total_weight: total,
    })
}

/// Reject self-dependencies, foreign tasks and cycles.
///
/// `task_id` is `None` for a task not yet inserted; such a task cannot be
/// part of a cycle.
pub fn validate_dependencies(
    task_id: Option<TaskId>,
    dependencies: &[TaskId],
    project_tasks: &[Task],
) -> Result<()> {
    let graph: HashMap<TaskId, &[TaskId]> = project_tasks
        .iter()
        .map(|t| (t.id, t.dependencies.as_slice()))
        .collect();

    for dep in dependencies {
        if Some(*dep) == task_id {
            return Err(PowermasonError::validation("A task cannot depend on itself."));
        }
        if !graph.contains_key(dep) {
            return Err(PowermasonError::validation(format!(
                "Dependency {dep} is not a task of this project."
            )));
        }
    }

    let Some(task_id) = task_id else {
        return Ok(());
    };

    let mut stack: Vec<TaskId> = dependencies.to_vec();
    let mut seen: HashSet<TaskId> = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == task_id {
            return Err(PowermasonError::validation(
                "Dependencies would create a cycle.",
            ));
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = graph.get(&current) {
            stack.extend(next.iter().copied());
        }
    }
    Ok(())
}

// ─── Roll-up ──────────────────────────────────────────────────

/// Percentage points a scope contributes to its project: each task adds
/// `progress% × weight% × scope weight`, capped at the scope's weight.
pub fn scope_contribution(scope: &Scope, tasks: &[Task]) -> Decimal {
    let raw: Decimal = tasks
        .iter()
        .filter(|t| t.scope_id == scope.id)
        .map(|t| {
            (t.progress / Decimal::ONE_HUNDRED) * (t.weight / Decimal::ONE_HUNDRED) * scope.weight
        })
        .sum();
    raw.min(scope.weight)
}

/// Overall project progress in `[0, 100]`.
pub fn project_progress(scopes: &[Scope], tasks: &[Task]) -> Decimal {
    let total: Decimal = scopes.iter().map(|s| scope_contribution(s, tasks)).sum();
    total.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED).round_dp(2)
}

// ─── Progress updates ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub id: UpdateId,
    pub task_id: TaskId,
    pub reported_by: UserId,
    pub progress_percent: Decimal,
    pub remarks: Option<String>,
    pub status: ReviewStatus,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProgressUpdate {
    pub task_id: TaskId,
    pub reported_by: UserId,
    pub progress_percent: Decimal,
    pub remarks: Option<String>,
}

/// Photo or document backing a progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressFile {
    pub id: ProgressFileId,
    pub update_id: UpdateId,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A submitted update together with the proof stored alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    #[serde(flatten)]
    pub update: ProgressUpdate,
    pub files: Vec<ProgressFile>,
}

pub fn validate_progress_percent(percent: Decimal) -> Result<()> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(PowermasonError::validation(
            "Progress must be between 0 and 100.",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(id: i64, weight: i64) -> Scope {
        Scope {
            id,
            project_id: 1,
            name: format!("S{id}"),
            weight: Decimal::new(weight, 0),
            state: RecordState::Active,
        }
    }

    fn task(id: i64, scope_id: i64, weight: i64, progress: i64) -> Task {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Task {
            id,
            project_id: 1,
            scope_id,
            name: format!("T{id}"),
            description: None,
            assigned_to: None,
            start_date: day,
            end_date: day,
            duration_days: 1,
            manhours: Decimal::new(8, 0),
            weight: Decimal::new(weight, 0),
            progress: Decimal::new(progress, 0),
            status: TaskStatus::from_progress(Decimal::new(progress, 0)),
            archived: false,
            dependencies: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overweight_scope_contributes_exactly_its_weight() {
        let scopes = [scope(1, 40)];
        let tasks = [task(1, 1, 60, 100), task(2, 1, 60, 100)];
        assert_eq!(scope_contribution(&scopes[0], &tasks), Decimal::new(40, 0));
        assert_eq!(project_progress(&scopes, &tasks), Decimal::new(40, 0));
    }

    #[test]
    fn progress_is_weighted_across_scopes() {
        let scopes = [scope(1, 50), scope(2, 50)];
        let tasks = [task(1, 1, 100, 50), task(2, 2, 50, 100)];
        // 0.5 × 1.0 × 50 + 1.0 × 0.5 × 50
        assert_eq!(project_progress(&scopes, &tasks), Decimal::new(50, 0));
    }

    #[test]
    fn progress_never_exceeds_one_hundred() {
        let scopes = [scope(1, 100), scope(2, 100)];
        let tasks = [task(1, 1, 100, 100), task(2, 2, 100, 100)];
        assert_eq!(project_progress(&scopes, &tasks), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn scope_deletion_policy() {
        assert_eq!(plan_scope_deletion(0, false).unwrap(), ScopeDeletion::Hard);
        assert_eq!(plan_scope_deletion(0, true).unwrap(), ScopeDeletion::Hard);
        assert_eq!(plan_scope_deletion(3, false).unwrap(), ScopeDeletion::Soft);
        assert!(plan_scope_deletion(3, true).is_err());
    }

    #[test]
    fn scope_validation_bounds() {
        assert!(validate_scope("Foundation", Decimal::ZERO).is_err());
        assert!(validate_scope("Foundation", Decimal::new(10001, 2)).is_err());
        assert!(validate_scope("  ", Decimal::ONE).is_err());
        assert_eq!(
            validate_scope(" Roofing ", Decimal::ONE_HUNDRED).unwrap(),
            "Roofing"
        );
    }

    #[test]
    fn duration_and_manhours_are_inclusive() {
        let input = TaskInput {
            scope_id: 1,
            name: "Pour slab".into(),
            description: None,
            assigned_to: None,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            weight: Decimal::new(25, 0),
            dependencies: vec![],
        };
        assert!(input.validate().is_ok());
        assert_eq!(input.duration_days(), 5);
        assert_eq!(input.manhours(), Decimal::new(40, 0));

        let backwards = TaskInput {
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            ..input
        };
        assert!(backwards.validate().is_err());
    }

    #[test]
    fn weight_overflow_warns() {
        let tasks = [task(1, 1, 60, 0), task(2, 2, 90, 0)];
        assert!(scope_weight_overflow(1, &tasks, Decimal::new(40, 0)).is_none());
        let w = scope_weight_overflow(1, &tasks, Decimal::new(50, 0)).unwrap();
        assert_eq!(
            w,
            Warning::ScopeWeightExceeded {
                scope_id: 1,
                total_weight: Decimal::new(110, 0)
            }
        );
    }

    #[test]
    fn dependency_rules() {
        let mut a = task(1, 1, 10, 0);
        let mut b = task(2, 1, 10, 0);
        let c = task(3, 1, 10, 0);
        b.dependencies = vec![1];
        a.dependencies = vec![];
        let tasks = vec![a, b, c];

        assert!(validate_dependencies(Some(1), &[1], &tasks).is_err());
        assert!(validate_dependencies(Some(1), &[99], &tasks).is_err());
        // 1 → 2 while 2 → 1 already
        assert!(validate_dependencies(Some(1), &[2], &tasks).is_err());
        assert!(validate_dependencies(Some(3), &[1, 2], &tasks).is_ok());
        assert!(validate_dependencies(None, &[2], &tasks).is_ok());
    }

    #[test]
    fn progress_percent_bounds() {
        assert!(validate_progress_percent(Decimal::new(-1, 0)).is_err());
        assert!(validate_progress_percent(Decimal::new(101, 0)).is_err());
        assert!(validate_progress_percent(Decimal::ONE_HUNDRED).is_ok());
    }
}
