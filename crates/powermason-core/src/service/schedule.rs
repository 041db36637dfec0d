use rust_decimal::Decimal;

use super::{ProjectService, MANAGERS, TASK_EDITORS};
use crate::error::{PowermasonError, Result};
use crate::files::{save_unique, upload_name, Upload};
use crate::principal::Principal;
use crate::schedule::{
    scope_weight_overflow, validate_dependencies, validate_progress_percent, validate_scope,
    NewProgressUpdate, NewScope, NewTask, ProgressFile, ProgressReport, ProgressUpdate, Scope,
    ScopeDeleted, Task, TaskInput,
};
use crate::types::{ProjectId, ReviewStatus, Role, ScopeId, TaskId, UpdateId};
use crate::warning::{Warned, Warning};

/// Progress update review.
const UPDATE_REVIEWERS: &[Role] = &[Role::Engineer, Role::OperationsManager];

impl ProjectService {
    async fn scope_in(&self, project_id: ProjectId, scope_id: ScopeId) -> Result<Scope> {
        match self.store.get_scope(scope_id).await? {
            Some(s) if s.project_id == project_id => Ok(s),
            _ => Err(PowermasonError::NotFound(format!(
                "scope {scope_id} in project {project_id}"
            ))),
        }
    }

    pub(super) async fn task_in(&self, project_id: ProjectId, task_id: TaskId) -> Result<Task> {
        match self.store.get_task(task_id).await? {
            Some(t) if t.project_id == project_id => Ok(t),
            _ => Err(PowermasonError::NotFound(format!(
                "task {task_id} in project {project_id}"
            ))),
        }
    }

    // ── Scopes ───────────────────────────────────────────────

    pub async fn list_scopes(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        include_deleted: bool,
    ) -> Result<Vec<Scope>> {
        self.project_for_editor(principal, project_id).await?;
        self.store.list_scopes(project_id, include_deleted).await
    }

    pub async fn create_scope(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        name: &str,
        weight: Decimal,
    ) -> Result<Scope> {
        principal.require_any(MANAGERS)?;
        let name = validate_scope(name, weight)?;
        self.load_project(project_id).await?;
        let scope = self
            .store
            .insert_scope(NewScope {
                project_id,
                name,
                weight,
            })
            .await?;
        tracing::info!(project_id, scope_id = scope.id, "scope created");
        Ok(scope)
    }

    pub async fn edit_scope(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        scope_id: ScopeId,
        name: &str,
        weight: Decimal,
    ) -> Result<Scope> {
        principal.require_any(MANAGERS)?;
        let name = validate_scope(name, weight)?;
        self.scope_in(project_id, scope_id).await?;
        let scope = self.store.update_scope(scope_id, &name, weight).await?;
        self.recompute_progress(project_id).await?;
        Ok(scope)
    }

    pub async fn delete_scope(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        scope_id: ScopeId,
        force: bool,
    ) -> Result<ScopeDeleted> {
        principal.require_any(MANAGERS)?;
        self.scope_in(project_id, scope_id).await?;
        let deleted = self.store.delete_scope(scope_id, force).await?;
        tracing::info!(project_id, scope_id, kind = ?deleted.kind, "scope deleted");
        Ok(deleted)
    }

    pub async fn restore_scope(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        scope_id: ScopeId,
    ) -> Result<Scope> {
        principal.require_any(MANAGERS)?;
        self.scope_in(project_id, scope_id).await?;
        let scope = self.store.restore_scope(scope_id).await?;
        tracing::info!(project_id, scope_id, "scope restored");
        Ok(scope)
    }

    // ── Tasks ────────────────────────────────────────────────

    pub async fn list_tasks(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        include_archived: bool,
    ) -> Result<Vec<Task>> {
        self.project_for_editor(principal, project_id).await?;
        self.store.list_tasks(project_id, include_archived).await
    }

    /// Shared checks for create and edit; returns the scope-weight warning.
    async fn check_task(
        &self,
        project_id: ProjectId,
        task_id: Option<TaskId>,
        input: &TaskInput,
    ) -> Result<Option<Warning>> {
        input.validate()?;
        match self.store.get_scope(input.scope_id).await? {
            Some(s) if s.project_id == project_id && s.state.is_active() => {}
            _ => {
                return Err(PowermasonError::validation(
                    "Scope must belong to this project.",
                ))
            }
        }
        let tasks = self.store.list_tasks(project_id, true).await?;
        validate_dependencies(task_id, &input.dependencies, &tasks)?;
        let siblings: Vec<Task> = tasks
            .into_iter()
            .filter(|t| !t.archived && Some(t.id) != task_id)
            .collect();
        Ok(scope_weight_overflow(input.scope_id, &siblings, input.weight))
    }

    pub async fn create_task(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        input: TaskInput,
    ) -> Result<Warned<Task>> {
        self.project_for_editor(principal, project_id).await?;
        let warning = self.check_task(project_id, None, &input).await?;
        let task = self.store.insert_task(NewTask { project_id, input }).await?;
        tracing::info!(project_id, task_id = task.id, "task created");
        if let Some(w) = &warning {
            tracing::warn!(project_id, warning = %w, "scope task weights exceed 100%");
        }
        self.recompute_progress(project_id).await?;
        Ok(Warned::with(task, warning))
    }

    pub async fn edit_task(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        task_id: TaskId,
        input: TaskInput,
    ) -> Result<Warned<Task>> {
        self.project_for_editor(principal, project_id).await?;
        self.task_in(project_id, task_id).await?;
        let warning = self.check_task(project_id, Some(task_id), &input).await?;
        let task = self.store.update_task(task_id, &input).await?;
        tracing::info!(project_id, task_id, "task updated");
        self.recompute_progress(project_id).await?;
        Ok(Warned::with(task, warning))
    }

    /// Archive or unarchive a selection of the project's tasks.
    pub async fn set_tasks_archived(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        task_ids: &[TaskId],
        archived: bool,
    ) -> Result<u64> {
        self.project_for_editor(principal, project_id).await?;
        if task_ids.is_empty() {
            return Err(PowermasonError::validation("No tasks selected."));
        }
        let changed = self
            .store
            .set_tasks_archived(project_id, task_ids, archived)
            .await?;
        tracing::info!(project_id, changed, archived, "tasks archive flag changed");
        self.recompute_progress(project_id).await?;
        Ok(changed)
    }

    // ── Progress updates ─────────────────────────────────────

    /// Report progress on a task, storing any proof files under
    /// `progress_proofs/{update_id}/`.
    pub async fn submit_progress_update(
        &self,
        principal: &Principal,
        task_id: TaskId,
        progress_percent: Decimal,
        remarks: Option<String>,
        attachments: Vec<Upload>,
    ) -> Result<ProgressReport> {
        principal.require_any(&[Role::ProjectManager])?;
        validate_progress_percent(progress_percent)?;
        for upload in &attachments {
            upload_name(&upload.name)
                .ok_or_else(|| PowermasonError::validation("A file name is required."))?;
        }
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| PowermasonError::not_found("task", task_id))?;
        self.project_for_editor(principal, task.project_id).await?;
        let update = self
            .store
            .insert_progress_update(NewProgressUpdate {
                task_id,
                reported_by: principal.user_id,
                progress_percent,
                remarks: remarks.filter(|r| !r.trim().is_empty()),
            })
            .await?;
        tracing::info!(task_id, update_id = update.id, "progress update submitted");

        let mut files = Vec::with_capacity(attachments.len());
        for upload in attachments {
            files.push(self.store_proof(update.id, &upload.name, &upload.content).await?);
        }
        Ok(ProgressReport { update, files })
    }

    async fn store_proof(
        &self,
        update_id: UpdateId,
        file_name: &str,
        content: &[u8],
    ) -> Result<ProgressFile> {
        let name = upload_name(file_name)
            .ok_or_else(|| PowermasonError::validation("A file name is required."))?;
        let dir = format!("progress_proofs/{update_id}");
        let stored = save_unique(self.files.as_ref(), &dir, name, content).await?;
        let file = self.store.insert_progress_file(update_id, &stored).await?;
        tracing::info!(update_id, path = %stored, "progress proof stored");
        Ok(file)
    }

    async fn load_update(&self, update_id: UpdateId) -> Result<ProgressUpdate> {
        self.store
            .get_progress_update(update_id)
            .await?
            .ok_or_else(|| PowermasonError::not_found("progress update", update_id))
    }

    /// Add proof to one of the caller's own updates while it awaits review.
    pub async fn attach_progress_proof(
        &self,
        principal: &Principal,
        update_id: UpdateId,
        file_name: &str,
        content: &[u8],
    ) -> Result<ProgressFile> {
        principal.require_any(&[Role::ProjectManager])?;
        let update = self.load_update(update_id).await?;
        if update.reported_by != principal.user_id {
            return Err(PowermasonError::Unauthorized(format!(
                "progress update {update_id} was reported by another user"
            )));
        }
        if update.status != ReviewStatus::Pending {
            return Err(PowermasonError::Conflict(format!(
                "progress update {update_id} has already been reviewed"
            )));
        }
        self.store_proof(update_id, file_name, content).await
    }

    /// Reviewers see proof for any update; Project Managers for their own.
    pub async fn progress_files(
        &self,
        principal: &Principal,
        update_id: UpdateId,
    ) -> Result<Vec<ProgressFile>> {
        principal.require_any(TASK_EDITORS)?;
        let update = self.load_update(update_id).await?;
        if principal.is(Role::ProjectManager) && update.reported_by != principal.user_id {
            return Err(PowermasonError::Unauthorized(format!(
                "progress update {update_id} was reported by another user"
            )));
        }
        self.store.list_progress_files(update_id).await
    }

    pub async fn review_queue(&self, principal: &Principal) -> Result<Vec<ProgressUpdate>> {
        principal.require_any(UPDATE_REVIEWERS)?;
        self.store
            .list_progress_updates(Some(ReviewStatus::Pending), None)
            .await
    }

    /// Reviewers see every update; Project Managers see their own.
    pub async fn progress_history(&self, principal: &Principal) -> Result<Vec<ProgressUpdate>> {
        principal.require_any(TASK_EDITORS)?;
        let reported_by = principal
            .is(Role::ProjectManager)
            .then_some(principal.user_id);
        self.store.list_progress_updates(None, reported_by).await
    }

    pub async fn pending_update_count(&self, principal: &Principal) -> Result<u64> {
        principal.require_any(UPDATE_REVIEWERS)?;
        self.store.count_pending_updates().await
    }

    pub async fn approve_update(
        &self,
        principal: &Principal,
        update_id: UpdateId,
    ) -> Result<ProgressUpdate> {
        principal.require_any(UPDATE_REVIEWERS)?;
        let (update, task) = self
            .store
            .approve_progress_update(update_id, principal.user_id)
            .await?;
        tracing::info!(update_id, task_id = task.id, progress = %task.progress, "progress update approved");
        self.recompute_progress(task.project_id).await?;
        Ok(update)
    }

    pub async fn reject_update(
        &self,
        principal: &Principal,
        update_id: UpdateId,
    ) -> Result<ProgressUpdate> {
        principal.require_any(UPDATE_REVIEWERS)?;
        let update = self
            .store
            .reject_progress_update(update_id, principal.user_id)
            .await?;
        tracing::info!(update_id, "progress update rejected");
        Ok(update)
    }
}
