//! Project costs, their split across tasks, and the spend figures.

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use powermason_core::costs::CostInput;
use powermason_core::files::MemoryFileStore;
use powermason_core::memory::MemoryStore;
use powermason_core::principal::Principal;
use powermason_core::project::{Project, ProjectDraft};
use powermason_core::schedule::TaskInput;
use powermason_core::service::Submission;
use powermason_core::types::{CostCategory, ProjectSource, Role, TaskId};
use powermason_core::{PowermasonError, ProjectService};
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn setup(budget: Option<&str>) -> (ProjectService, Principal, Project, TaskId) {
    let store = Arc::new(MemoryStore::new());
    let eg = store.add_user("Erin", "erin@example.com", Role::Engineer).await;
    let service = ProjectService::new(store.clone(), Arc::new(MemoryFileStore::new()), store);
    let engineer = Principal::new(eg.id, Role::Engineer);
    let mut draft = ProjectDraft::named("Seawall");
    draft.approved_budget = budget.map(d);
    let Submission::Created(project) = service
        .submit_project(&engineer, ProjectSource::GeneralContractor, draft)
        .await
        .unwrap()
    else {
        panic!("expected direct creation");
    };
    let scope = service
        .create_scope(&engineer, project.id, "Marine", d("60"))
        .await
        .unwrap();
    let task = service
        .create_task(
            &engineer,
            project.id,
            TaskInput {
                scope_id: scope.id,
                name: "Drive piles".into(),
                description: None,
                assigned_to: None,
                start_date: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 8, 20).unwrap(),
                weight: d("100"),
                dependencies: vec![],
            },
        )
        .await
        .unwrap()
        .value;
    (service, engineer, project, task.id)
}

fn cost(amount: &str, day: u32) -> CostInput {
    CostInput {
        category: CostCategory::Equipment,
        description: "Pile driver rental".into(),
        amount: d(amount),
        date_incurred: NaiveDate::from_ymd_opt(2024, 8, day),
        linked_task: None,
    }
}

#[tokio::test]
async fn task_allocations_cannot_exceed_the_cost() {
    let (service, eg, project, task_id) = setup(Some("100000")).await;
    let rental = service
        .record_project_cost(&eg, project.id, cost("10000", 2))
        .await
        .unwrap();

    service
        .allocate_task_cost(&eg, project.id, rental.id, task_id, d("6000"))
        .await
        .unwrap();
    let err = service
        .allocate_task_cost(&eg, project.id, rental.id, task_id, d("4000.01"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PowermasonError::Validation(ref m) if m == "Allocated amount exceeds available cost"
    ));
    service
        .allocate_task_cost(&eg, project.id, rental.id, task_id, d("4000"))
        .await
        .unwrap();

    let splits = service.list_task_costs(&eg, project.id).await.unwrap();
    let total: Decimal = splits.iter().map(|tc| tc.allocated_amount).sum();
    assert_eq!(total, d("10000"));
}

#[tokio::test]
async fn metrics_follow_costs_and_splits() {
    let (service, eg, project, task_id) = setup(Some("80000")).await;
    let first = service
        .record_project_cost(&eg, project.id, cost("12000", 3))
        .await
        .unwrap();
    let mut linked = cost("8000", 9);
    linked.linked_task = Some(task_id);
    service
        .record_project_cost(&eg, project.id, linked)
        .await
        .unwrap();
    service
        .allocate_task_cost(&eg, project.id, first.id, task_id, d("12000"))
        .await
        .unwrap();

    let listed = service.list_project_costs(&eg, project.id).await.unwrap();
    assert_eq!(listed[0].amount, d("8000"));
    assert_eq!(listed[0].linked_task, Some(task_id));

    let m = service.project_cost_metrics(&eg, project.id).await.unwrap();
    assert_eq!(m.total_expenses, d("20000"));
    assert_eq!(m.total_task_allocations, d("12000"));
    assert_eq!(m.remaining_budget, d("68000"));
    assert_eq!(m.cost_performance, Some(d("25")));

    let dashboard = service.costing_dashboard(&eg).await.unwrap();
    assert_eq!(dashboard.projects[0].costs, m);
    assert_eq!(dashboard.total_expenses, d("20000"));
}

#[tokio::test]
async fn no_approved_budget_means_no_cost_performance() {
    let (service, eg, project, _) = setup(None).await;
    service
        .record_project_cost(&eg, project.id, cost("500", 1))
        .await
        .unwrap();
    let m = service.project_cost_metrics(&eg, project.id).await.unwrap();
    assert_eq!(m.cost_performance, None);
    assert_eq!(m.remaining_budget, Decimal::ZERO);
}

#[tokio::test]
async fn costs_stay_inside_their_project() {
    let (service, eg, project, task_id) = setup(Some("1000")).await;
    let mut foreign = cost("100", 1);
    foreign.linked_task = Some(task_id + 50);
    let err = service
        .record_project_cost(&eg, project.id, foreign)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);

    let err = service
        .allocate_task_cost(&eg, project.id, 42, task_id, d("1"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);

    let pm = Principal::new(eg.user_id + 1, Role::ProjectManager);
    let err = service
        .list_project_costs(&pm, project.id)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);
}
