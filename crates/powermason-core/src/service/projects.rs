use rust_decimal::Decimal;
use serde::Serialize;

use super::{ProjectService, MANAGERS, TASK_EDITORS};
use crate::error::{PowermasonError, Result};
use crate::files::{save_unique, upload_name};
use crate::money::validate_amount;
use crate::principal::Principal;
use crate::project::{
    CostingDashboard, NewProject, Project, ProjectDraft, ProjectFile, ProjectFilter,
};
use crate::staging::{NewStaging, StagingProject};
use crate::types::{ProjectId, ProjectSource, ProjectStatus, Role, UserProfile};

/// Outcome of a submission: Engineers create directly, Operations Managers
/// go through staging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum Submission {
    Created(Project),
    Staged(StagingProject),
}

impl ProjectService {
    pub async fn submit_project(
        &self,
        principal: &Principal,
        source: ProjectSource,
        draft: ProjectDraft,
    ) -> Result<Submission> {
        principal.require_any(MANAGERS)?;
        draft.validate()?;

        if principal.is(Role::Engineer) {
            let project = self
                .store
                .insert_project(NewProject {
                    source,
                    details: draft,
                    created_by: Some(principal.user_id),
                })
                .await?;
            tracing::info!(project_id = project.id, code = %project.project_code, "project created");
            return Ok(Submission::Created(project));
        }

        let name = draft.name.clone();
        let staged = self
            .store
            .insert_staging(NewStaging {
                source,
                draft,
                submitted_by: principal.user_id,
            })
            .await?;
        tracing::info!(staging_id = staged.id, "project submitted for approval");

        let submitter = self
            .store
            .get_user(principal.user_id)
            .await?
            .map(|u| u.full_name)
            .unwrap_or_else(|| format!("User {}", principal.user_id));
        let message = format!("{submitter} submitted a new project '{name}' for approval.");
        for engineer in self.store.users_with_role(Role::Engineer).await? {
            self.notify(engineer.id, &message, Some("/staging")).await;
        }
        self.notify(
            principal.user_id,
            &format!("You submitted the project '{name}'. Waiting for approval from Engineers."),
            None,
        )
        .await;

        Ok(Submission::Staged(staged))
    }

    /// Non-archived projects visible to the caller's role.
    pub async fn list_projects(&self, principal: &Principal) -> Result<Vec<Project>> {
        let mut filter = ProjectFilter {
            archived: Some(false),
            ..ProjectFilter::default()
        };
        match principal.role {
            Role::Engineer | Role::OperationsManager => {}
            Role::ProjectManager => filter.project_manager = Some(principal.user_id),
            Role::Viewer => {
                let Some(client) = self.client_of(principal).await? else {
                    return Ok(Vec::new());
                };
                filter.client_id = Some(client);
            }
        }
        self.store.list_projects(&filter).await
    }

    pub async fn list_projects_by_source(
        &self,
        principal: &Principal,
        source: ProjectSource,
        archived: bool,
    ) -> Result<Vec<Project>> {
        principal.require_any(MANAGERS)?;
        self.store
            .list_projects(&ProjectFilter {
                source: Some(source),
                archived: Some(archived),
                ..ProjectFilter::default()
            })
            .await
    }

    pub async fn get_project(&self, principal: &Principal, id: ProjectId) -> Result<Project> {
        let project = self.load_project(id).await?;
        let visible = match principal.role {
            Role::Engineer | Role::OperationsManager => true,
            Role::ProjectManager => project.is_managed_by(principal.user_id),
            Role::Viewer => {
                let client = self.client_of(principal).await?;
                client.is_some() && client == project.details.client_id
            }
        };
        if !visible {
            return Err(PowermasonError::Unauthorized(format!(
                "project {id} is not visible to user {}",
                principal.user_id
            )));
        }
        Ok(project)
    }

    /// Replace the editable details. A missing contract path keeps the
    /// current one.
    pub async fn edit_project(
        &self,
        principal: &Principal,
        id: ProjectId,
        mut draft: ProjectDraft,
    ) -> Result<Project> {
        principal.require_any(MANAGERS)?;
        draft.validate()?;
        let current = self.load_project(id).await?;
        if draft.contract_agreement.is_none() {
            draft.contract_agreement = current.details.contract_agreement;
        }
        let project = self.store.update_project_details(id, &draft).await?;
        tracing::info!(project_id = id, "project updated");
        Ok(project)
    }

    pub async fn set_archived(
        &self,
        principal: &Principal,
        id: ProjectId,
        archived: bool,
    ) -> Result<Project> {
        principal.require_any(MANAGERS)?;
        self.load_project(id).await?;
        let project = self.store.set_archived(id, archived).await?;
        tracing::info!(project_id = id, archived, "project archive flag changed");
        Ok(project)
    }

    pub async fn update_status(
        &self,
        principal: &Principal,
        id: ProjectId,
        status: ProjectStatus,
    ) -> Result<Project> {
        principal.require_any(MANAGERS)?;
        self.load_project(id).await?;
        let project = self.store.set_status(id, status).await?;
        tracing::info!(project_id = id, %status, "project status updated");
        Ok(project)
    }

    pub async fn approve_budget(
        &self,
        principal: &Principal,
        id: ProjectId,
        amount: Decimal,
    ) -> Result<Project> {
        principal.require_any(MANAGERS)?;
        validate_amount(amount)?;
        self.load_project(id).await?;
        let project = self.store.set_approved_budget(id, amount).await?;
        tracing::info!(project_id = id, %amount, "budget approved");
        Ok(project)
    }

    /// Store an uploaded file under `project_files/` and record it.
    pub async fn attach_file(
        &self,
        principal: &Principal,
        id: ProjectId,
        file_name: &str,
        content: &[u8],
    ) -> Result<ProjectFile> {
        principal.require_any(TASK_EDITORS)?;
        let project = self.load_project(id).await?;
        let allowed = match principal.role {
            Role::Engineer => true,
            Role::ProjectManager => project.is_managed_by(principal.user_id),
            Role::OperationsManager => project.is_created_or_assigned_to(principal.user_id),
            Role::Viewer => false,
        };
        if !allowed {
            return Err(PowermasonError::Unauthorized(format!(
                "user {} may not upload to project {id}",
                principal.user_id
            )));
        }
        let name = upload_name(file_name)
            .ok_or_else(|| PowermasonError::validation("A file name is required."))?;
        let dir = format!("project_files/{id}");
        let stored = save_unique(self.files.as_ref(), &dir, name, content).await?;
        let file = self.store.insert_project_file(id, &stored).await?;
        tracing::info!(project_id = id, path = %stored, "file attached");
        Ok(file)
    }

    pub async fn costing_dashboard(&self, principal: &Principal) -> Result<CostingDashboard> {
        principal.require_any(MANAGERS)?;
        let rows = self.store.project_costing(&ProjectFilter::default()).await?;
        Ok(CostingDashboard::from_rows(rows))
    }

    pub async fn search_project_managers(
        &self,
        principal: &Principal,
        query: &str,
    ) -> Result<Vec<UserProfile>> {
        principal.require_any(MANAGERS)?;
        self.store
            .search_users(Role::ProjectManager, query.trim())
            .await
    }

    async fn client_of(&self, principal: &Principal) -> Result<Option<i64>> {
        let email = match &principal.email {
            Some(email) => email.clone(),
            None => match self.store.get_user(principal.user_id).await? {
                Some(user) => user.email,
                None => return Ok(None),
            },
        };
        Ok(self.store.client_by_email(&email).await?.map(|c| c.id))
    }
}
