use rand::seq::SliceRandom;

use super::{ProjectService, REVIEWERS};
use crate::error::{PowermasonError, Result};
use crate::files::{save_unique, upload_name};
use crate::principal::Principal;
use crate::staging::{
    approval_message, order_staging, project_link, ApprovedStaging, Resolution, SortOrder,
    StagingDecision, StagingProject,
};
use crate::types::{ReviewStatus, Role, StagingId};

impl ProjectService {
    pub async fn list_pending_staging(
        &self,
        principal: &Principal,
        order: SortOrder,
    ) -> Result<Vec<StagingProject>> {
        principal.require_any(REVIEWERS)?;
        let rows = self.store.list_staging(ReviewStatus::Pending).await?;
        Ok(order_staging(rows, order))
    }

    pub async fn get_staging(
        &self,
        principal: &Principal,
        id: StagingId,
    ) -> Result<StagingProject> {
        principal.require_any(REVIEWERS)?;
        self.store
            .get_staging(id)
            .await?
            .ok_or_else(|| PowermasonError::not_found("staging project", id))
    }

    /// Turn a pending draft into a live project, then tell one Operations
    /// Manager about it.
    pub async fn approve_staging(
        &self,
        principal: &Principal,
        id: StagingId,
    ) -> Result<ApprovedStaging> {
        let staging = self.get_staging(principal, id).await?;
        staging.status.resolve(ReviewStatus::Approved)?;
        staging.draft.validate()?;

        let contract_agreement = match staging.draft.contract_agreement.as_deref() {
            Some(path) => self.copy_contract(id, path).await?,
            None => None,
        };

        let approved = match self
            .store
            .approve_staging(
                id,
                Resolution {
                    decision: ReviewStatus::Approved,
                    reviewed_by: principal.user_id,
                    comments: None,
                    contract_agreement: contract_agreement.clone(),
                },
            )
            .await
        {
            Ok(approved) => approved,
            Err(err) => {
                if let Some(copied) = contract_agreement.as_deref() {
                    if let Err(cleanup) = self.files.delete(copied).await {
                        tracing::warn!(path = copied, error = %cleanup, "orphaned contract copy");
                    }
                }
                return Err(err);
            }
        };
        tracing::info!(
            staging_id = id,
            project_id = approved.project.id,
            code = %approved.project.project_code,
            "staged project approved"
        );

        let managers = self.store.users_with_role(Role::OperationsManager).await?;
        let chosen = managers.choose(&mut rand::thread_rng()).cloned();
        match chosen {
            Some(om) => {
                let link = project_link(approved.project.id);
                self.notify(om.id, &approval_message(approved.project.name()), Some(&link))
                    .await;
            }
            None => tracing::warn!(staging_id = id, "no operations manager to notify"),
        }

        Ok(approved)
    }

    pub async fn reject_staging(
        &self,
        principal: &Principal,
        id: StagingId,
        comments: Option<String>,
    ) -> Result<StagingDecision> {
        principal.require_any(REVIEWERS)?;
        let decision = self
            .store
            .reject_staging(
                id,
                Resolution {
                    decision: ReviewStatus::Rejected,
                    reviewed_by: principal.user_id,
                    comments,
                    contract_agreement: None,
                },
            )
            .await?;
        tracing::info!(staging_id = id, "staged project rejected");
        Ok(decision)
    }

    pub async fn staging_history(
        &self,
        principal: &Principal,
        id: StagingId,
    ) -> Result<Vec<StagingDecision>> {
        principal.require_any(REVIEWERS)?;
        self.store.staging_decisions(id).await
    }

    /// Copy a staged contract into the project file area, one directory per
    /// staging entry. A reference to a file that no longer exists is dropped.
    async fn copy_contract(&self, id: StagingId, path: &str) -> Result<Option<String>> {
        if !self.files.exists(path).await? {
            tracing::warn!(path, "staged contract file missing, skipping copy");
            return Ok(None);
        }
        let content = self.files.open(path).await?;
        let name = upload_name(path).unwrap_or("contract");
        let dir = format!("project_files/staging-{id}");
        let stored = save_unique(self.files.as_ref(), &dir, name, &content).await?;
        Ok(Some(stored))
    }
}
