//! ProjectService: the domain service behind every HTTP handler.
//!
//! Takes its collaborators as `Arc<dyn Port>` so the same rules run against
//! Postgres or the in-memory store. Every method takes `&Principal`
//! explicitly and enforces the role table itself.

use std::sync::Arc;

use crate::error::{PowermasonError, Result};
use crate::files::FileStore;
use crate::ports::{Notifier, ProjectStore};
use crate::principal::Principal;
use crate::project::Project;
use crate::schedule::project_progress;
use crate::types::{ProjectId, ProjectStatus, Role};

mod budget;
mod costs;
mod projects;
mod schedule;
mod staging;

pub use budget::ExpenseInput;
pub use projects::Submission;

/// Project, budget, allocation, expense, cost, scope and dashboard operations.
pub const MANAGERS: &[Role] = &[Role::Engineer, Role::OperationsManager];
/// Staging review.
pub const REVIEWERS: &[Role] = &[Role::Engineer];
/// Task CRUD.
pub const TASK_EDITORS: &[Role] = &[Role::Engineer, Role::OperationsManager, Role::ProjectManager];

pub struct ProjectService {
    pub store: Arc<dyn ProjectStore>,
    pub files: Arc<dyn FileStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl ProjectService {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            files,
            notifier,
        }
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project> {
        self.store
            .get_project(id)
            .await?
            .ok_or_else(|| PowermasonError::not_found("project", id))
    }

    /// Load a project the caller may work on. PMs are limited to the
    /// projects they manage.
    async fn project_for_editor(&self, principal: &Principal, id: ProjectId) -> Result<Project> {
        principal.require_any(TASK_EDITORS)?;
        let project = self.load_project(id).await?;
        if principal.is(Role::ProjectManager) && !project.is_managed_by(principal.user_id) {
            return Err(PowermasonError::Unauthorized(format!(
                "project {id} is not managed by user {}",
                principal.user_id
            )));
        }
        Ok(project)
    }

    /// Recompute project progress from every scope and task, including
    /// soft-deleted scopes and archived tasks, and persist it.
    pub async fn recompute_progress(&self, project_id: ProjectId) -> Result<Project> {
        let scopes = self.store.list_scopes(project_id, true).await?;
        let tasks = self.store.list_tasks(project_id, true).await?;
        let progress = project_progress(&scopes, &tasks);
        let status = ProjectStatus::from_progress(progress);
        tracing::debug!(project_id, %progress, %status, "recomputed project progress");
        self.store.set_progress(project_id, progress, status).await
    }

    /// Fire-and-log: a failed notification never fails the caller.
    async fn notify(&self, user: i64, message: &str, link: Option<&str>) {
        if let Err(e) = self.notifier.notify(user, message, link).await {
            tracing::warn!(user, error = %e, "notification failed");
        }
    }
}
