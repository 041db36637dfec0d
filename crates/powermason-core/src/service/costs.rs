use chrono::Utc;
use rust_decimal::Decimal;

use super::{ProjectService, MANAGERS};
use crate::costs::{CostInput, NewTaskCost, ProjectCost, ProjectCostMetrics, TaskCost};
use crate::error::{PowermasonError, Result};
use crate::money::validate_amount;
use crate::principal::Principal;
use crate::types::{CostId, ProjectId, TaskId};

impl ProjectService {
    async fn cost_in(&self, project_id: ProjectId, cost_id: CostId) -> Result<ProjectCost> {
        match self.store.get_project_cost(cost_id).await? {
            Some(c) if c.project_id == project_id => Ok(c),
            _ => Err(PowermasonError::NotFound(format!(
                "project cost {cost_id} in project {project_id}"
            ))),
        }
    }

    pub async fn record_project_cost(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        input: CostInput,
    ) -> Result<ProjectCost> {
        principal.require_any(MANAGERS)?;
        self.load_project(project_id).await?;
        let new = input.into_new(project_id, Utc::now().date_naive())?;
        if let Some(task_id) = new.linked_task {
            self.task_in(project_id, task_id).await?;
        }
        let cost = self.store.insert_project_cost(new).await?;
        tracing::info!(
            project_id,
            cost_id = cost.id,
            amount = %cost.amount,
            category = %cost.category,
            "project cost recorded"
        );
        Ok(cost)
    }

    pub async fn list_project_costs(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<ProjectCost>> {
        principal.require_any(MANAGERS)?;
        self.load_project(project_id).await?;
        self.store.list_project_costs(project_id).await
    }

    /// Split part of a cost onto a task of the same project.
    pub async fn allocate_task_cost(
        &self,
        principal: &Principal,
        project_id: ProjectId,
        cost_id: CostId,
        task_id: TaskId,
        allocated_amount: Decimal,
    ) -> Result<TaskCost> {
        principal.require_any(MANAGERS)?;
        validate_amount(allocated_amount)?;
        self.cost_in(project_id, cost_id).await?;
        self.task_in(project_id, task_id).await?;
        let task_cost = self
            .store
            .insert_task_cost(NewTaskCost {
                task_id,
                cost_id,
                allocated_amount,
            })
            .await?;
        tracing::info!(project_id, cost_id, task_id, amount = %allocated_amount, "cost split onto task");
        Ok(task_cost)
    }

    pub async fn list_task_costs(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<TaskCost>> {
        principal.require_any(MANAGERS)?;
        self.load_project(project_id).await?;
        self.store.list_task_costs(project_id).await
    }

    pub async fn project_cost_metrics(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<ProjectCostMetrics> {
        principal.require_any(MANAGERS)?;
        let project = self.load_project(project_id).await?;
        let total_expenses = self
            .store
            .list_project_costs(project_id)
            .await?
            .iter()
            .map(|c| c.amount)
            .sum();
        let total_task_allocations = self
            .store
            .list_task_costs(project_id)
            .await?
            .iter()
            .map(|tc| tc.allocated_amount)
            .sum();
        Ok(ProjectCostMetrics::new(
            project.approved_budget(),
            total_expenses,
            total_task_allocations,
        ))
    }
}
