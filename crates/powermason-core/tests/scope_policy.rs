//! Scope creation, editing, deletion and restore rules.

use std::sync::Arc;

use chrono::NaiveDate;
use powermason_core::files::MemoryFileStore;
use powermason_core::memory::MemoryStore;
use powermason_core::ports::ProjectStore;
use powermason_core::principal::Principal;
use powermason_core::project::{Project, ProjectDraft};
use powermason_core::schedule::{NewScope, NewTask, ScopeDeletion, TaskInput};
use powermason_core::service::Submission;
use powermason_core::types::{CostCategory, ProjectSource, Role};
use powermason_core::{PowermasonError, ProjectService};
use rust_decimal::Decimal;

async fn setup() -> (ProjectService, Principal, Project) {
    let store = Arc::new(MemoryStore::new());
    let eg = store.add_user("Erin", "erin@example.com", Role::Engineer).await;
    let service = ProjectService::new(store.clone(), Arc::new(MemoryFileStore::new()), store);
    let engineer = Principal::new(eg.id, Role::Engineer);
    let mut draft = ProjectDraft::named("Library");
    draft.approved_budget = Some(Decimal::new(1_000_000, 0));
    let Submission::Created(project) = service
        .submit_project(&engineer, ProjectSource::GeneralContractor, draft)
        .await
        .unwrap()
    else {
        panic!("expected direct creation");
    };
    (service, engineer, project)
}

fn task_in(scope_id: i64) -> TaskInput {
    TaskInput {
        scope_id,
        name: "Excavate".into(),
        description: None,
        assigned_to: None,
        start_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 2, 3).unwrap(),
        weight: Decimal::new(50, 0),
        dependencies: vec![],
    }
}

#[tokio::test]
async fn scope_with_tasks_can_only_be_soft_deleted() {
    let (service, eg, project) = setup().await;
    let scope = service
        .create_scope(&eg, project.id, "Earthworks", Decimal::new(30, 0))
        .await
        .unwrap();
    service
        .create_task(&eg, project.id, task_in(scope.id))
        .await
        .unwrap();

    let err = service
        .delete_scope(&eg, project.id, scope.id, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PowermasonError::Validation(ref m)
            if m == "Cannot permanently delete scope with associated tasks. Use soft delete instead."
    ));

    let deleted = service
        .delete_scope(&eg, project.id, scope.id, false)
        .await
        .unwrap();
    assert_eq!(deleted.kind, ScopeDeletion::Soft);
    assert_eq!(
        deleted.message,
        "Scope 'Earthworks' has been soft deleted (hidden but preserved for existing tasks)."
    );
    assert!(service
        .list_scopes(&eg, project.id, false)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(service.list_scopes(&eg, project.id, true).await.unwrap().len(), 1);

    let restored = service
        .restore_scope(&eg, project.id, scope.id)
        .await
        .unwrap();
    assert!(restored.state.is_active());

    let err = service
        .restore_scope(&eg, project.id, scope.id)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid input: Scope is not deleted and cannot be restored."
    );
}

#[tokio::test]
async fn empty_scope_hard_delete_cascades_to_budgets() {
    let (service, eg, project) = setup().await;
    let scope = service
        .create_scope(&eg, project.id, "Landscaping", Decimal::new(10, 0))
        .await
        .unwrap();
    service
        .add_budget_category(
            &eg,
            project.id,
            scope.id,
            CostCategory::Materials,
            Decimal::new(5000, 0),
            None,
        )
        .await
        .unwrap();

    let deleted = service
        .delete_scope(&eg, project.id, scope.id, false)
        .await
        .unwrap();
    assert_eq!(deleted.kind, ScopeDeletion::Hard);
    assert_eq!(
        deleted.message,
        "Scope 'Landscaping' has been permanently deleted."
    );
    assert!(service
        .list_scopes(&eg, project.id, true)
        .await
        .unwrap()
        .is_empty());
    assert!(service
        .allocation_overview(&eg, project.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn scope_names_and_weights_are_checked() {
    let (service, eg, project) = setup().await;
    service
        .create_scope(&eg, project.id, "Roofing", Decimal::new(20, 0))
        .await
        .unwrap();

    let err = service
        .create_scope(&eg, project.id, " Roofing ", Decimal::new(5, 0))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 409);
    assert_eq!(
        err.to_string(),
        "conflict: A scope with name \"Roofing\" already exists."
    );

    let err = service
        .create_scope(&eg, project.id, "Paint", Decimal::new(101, 0))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid input: Weight must be between 0.01 and 100."
    );

    let other = service
        .create_scope(&eg, project.id, "Paint", Decimal::new(15, 0))
        .await
        .unwrap();
    let err = service
        .edit_scope(&eg, project.id, other.id, "Roofing", Decimal::new(15, 0))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 409);

    let renamed = service
        .edit_scope(&eg, project.id, other.id, "Painting", Decimal::new(25, 0))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Painting");
    assert_eq!(renamed.weight, Decimal::new(25, 0));
}

#[tokio::test]
async fn tasks_need_an_active_scope_of_the_project() {
    let (service, eg, project) = setup().await;
    let scope = service
        .create_scope(&eg, project.id, "Plumbing", Decimal::new(10, 0))
        .await
        .unwrap();
    service
        .delete_scope(&eg, project.id, scope.id, false)
        .await
        .unwrap();
    let err = service
        .create_task(&eg, project.id, task_in(scope.id))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn soft_deleted_scope_drops_out_of_costing() {
    let (service, eg, project) = setup().await;
    let kept = service
        .create_scope(&eg, project.id, "Structure", Decimal::new(40, 0))
        .await
        .unwrap();
    let hidden = service
        .create_scope(&eg, project.id, "Earthworks", Decimal::new(30, 0))
        .await
        .unwrap();
    for (scope_id, planned) in [(kept.id, 7000), (hidden.id, 3000)] {
        service
            .add_budget_category(
                &eg,
                project.id,
                scope_id,
                CostCategory::Labor,
                Decimal::new(planned, 0),
                None,
            )
            .await
            .unwrap();
    }
    service
        .create_task(&eg, project.id, task_in(hidden.id))
        .await
        .unwrap();
    service
        .delete_scope(&eg, project.id, hidden.id, false)
        .await
        .unwrap();

    let plan = service.budget_plan(&eg, project.id).await.unwrap();
    let dashboard = service.costing_dashboard(&eg).await.unwrap();
    assert_eq!(plan.total_planned, Decimal::new(7000, 0));
    assert_eq!(dashboard.projects[0].total_planned, plan.total_planned);
    assert_eq!(dashboard.total_planned, Decimal::new(7000, 0));
}

#[tokio::test]
async fn store_refuses_tasks_for_a_removed_scope() {
    let store = MemoryStore::new();
    let scope = store
        .insert_scope(NewScope {
            project_id: 1,
            name: "Fencing".into(),
            weight: Decimal::new(10, 0),
        })
        .await
        .unwrap();
    store.delete_scope(scope.id, true).await.unwrap();

    let err = store
        .insert_task(NewTask {
            project_id: 1,
            input: task_in(scope.id),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PowermasonError::NotFound(ref m) if m == &format!("scope {}", scope.id)));
}
