//! Staged project submissions awaiting an Engineer's decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PowermasonError, Result};
use crate::project::{Project, ProjectDraft};
use crate::types::{ProjectId, ProjectSource, ReviewStatus, StagingId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingProject {
    pub id: StagingId,
    pub source: ProjectSource,
    pub draft: ProjectDraft,
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    pub status: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStaging {
    pub source: ProjectSource,
    pub draft: ProjectDraft,
    pub submitted_by: UserId,
}

impl ReviewStatus {
    /// Pending → Approved | Rejected. Every other transition is a conflict.
    pub fn resolve(self, to: ReviewStatus) -> Result<ReviewStatus> {
        match (self, to) {
            (ReviewStatus::Pending, ReviewStatus::Approved | ReviewStatus::Rejected) => Ok(to),
            (from, to) => Err(PowermasonError::Conflict(format!(
                "cannot move from {} to {}",
                from.label(),
                to.label()
            ))),
        }
    }
}

/// Append-only record of how a staged submission was resolved. Outlives
/// the staging row itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingDecision {
    pub id: i64,
    pub staging_id: StagingId,
    pub project_name: String,
    pub decision: ReviewStatus,
    pub reviewed_by: UserId,
    pub comments: Option<String>,
    pub project_id: Option<ProjectId>,
    pub decided_at: DateTime<Utc>,
}

/// What the store needs to resolve a staging row in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub decision: ReviewStatus,
    pub reviewed_by: UserId,
    pub comments: Option<String>,
    /// Contract path already copied out of the staging area, if any.
    pub contract_agreement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovedStaging {
    pub project: Project,
    pub decision: StagingDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Pending submissions by submission time.
pub fn order_staging(mut rows: Vec<StagingProject>, order: SortOrder) -> Vec<StagingProject> {
    rows.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    if order == SortOrder::Desc {
        rows.reverse();
    }
    rows
}

pub fn approval_message(project_name: &str) -> String {
    format!("A new project '{project_name}' has been approved.")
}

pub fn project_link(project_id: ProjectId) -> String {
    format!("/projects/{project_id}/details/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn only_pending_resolves() {
        assert_eq!(
            ReviewStatus::Pending.resolve(ReviewStatus::Approved).unwrap(),
            ReviewStatus::Approved
        );
        assert_eq!(
            ReviewStatus::Pending.resolve(ReviewStatus::Rejected).unwrap(),
            ReviewStatus::Rejected
        );
        let err = ReviewStatus::Approved
            .resolve(ReviewStatus::Rejected)
            .unwrap_err();
        assert_eq!(err.http_status(), 409);
        assert!(ReviewStatus::Pending.resolve(ReviewStatus::Pending).is_err());
    }

    #[test]
    fn staging_order_follows_submission_time() {
        let now = Utc::now();
        let row = |id, offset| StagingProject {
            id,
            source: ProjectSource::DirectClient,
            draft: ProjectDraft::named(format!("P{id}")),
            submitted_by: 1,
            submitted_at: now + Duration::minutes(offset),
            status: ReviewStatus::Pending,
        };
        let rows = vec![row(1, 5), row(2, 0), row(3, 10)];
        let asc: Vec<_> = order_staging(rows.clone(), SortOrder::Asc)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(asc, vec![2, 1, 3]);
        let desc: Vec<_> = order_staging(rows, SortOrder::Desc)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(desc, vec![3, 1, 2]);
    }

    #[test]
    fn approval_notification_text() {
        assert_eq!(
            approval_message("Warehouse A"),
            "A new project 'Warehouse A' has been approved."
        );
        assert_eq!(project_link(7), "/projects/7/details/");
    }
}
