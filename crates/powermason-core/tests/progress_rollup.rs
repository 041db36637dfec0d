//! Task progress rolled up into project progress.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use powermason_core::files::MemoryFileStore;
use powermason_core::memory::MemoryStore;
use powermason_core::principal::Principal;
use powermason_core::project::ProjectDraft;
use powermason_core::schedule::{project_progress, Scope, Task, TaskInput};
use powermason_core::service::Submission;
use powermason_core::types::{
    ProjectSource, ProjectStatus, RecordState, ReviewStatus, Role, TaskStatus,
};
use powermason_core::warning::Warning;
use powermason_core::ProjectService;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, n).unwrap()
}

fn input(scope_id: i64, name: &str, weight: &str) -> TaskInput {
    TaskInput {
        scope_id,
        name: name.into(),
        description: None,
        assigned_to: None,
        start_date: day(1),
        end_date: day(10),
        weight: d(weight),
        dependencies: vec![],
    }
}

#[tokio::test]
async fn approved_updates_roll_up_with_scope_cap() {
    let store = Arc::new(MemoryStore::new());
    let eg = store.add_user("Erin", "erin@example.com", Role::Engineer).await;
    let pm = store.add_user("Pia", "pia@example.com", Role::ProjectManager).await;
    let service = ProjectService::new(store.clone(), Arc::new(MemoryFileStore::new()), store);
    let engineer = Principal::new(eg.id, Role::Engineer);
    let manager = Principal::new(pm.id, Role::ProjectManager);

    let mut draft = ProjectDraft::named("Depot");
    draft.project_manager = Some(pm.id);
    let Submission::Created(project) = service
        .submit_project(&engineer, ProjectSource::GeneralContractor, draft)
        .await
        .unwrap()
    else {
        panic!("expected direct creation");
    };
    let scope = service
        .create_scope(&engineer, project.id, "Shell", d("40"))
        .await
        .unwrap();

    let a = service
        .create_task(&manager, project.id, input(scope.id, "Walls", "60"))
        .await
        .unwrap();
    assert!(a.warnings.is_empty());
    assert_eq!(a.value.duration_days, 10);
    assert_eq!(a.value.manhours, d("80"));

    let b = service
        .create_task(&manager, project.id, input(scope.id, "Roof", "60"))
        .await
        .unwrap();
    assert!(matches!(
        b.warnings.as_slice(),
        [Warning::ScopeWeightExceeded { total_weight, .. }] if *total_weight == d("120")
    ));

    for task_id in [a.value.id, b.value.id] {
        let report = service
            .submit_progress_update(&manager, task_id, d("100"), Some("done".into()), vec![])
            .await
            .unwrap();
        assert_eq!(report.update.status, ReviewStatus::Pending);
        assert!(report.files.is_empty());
    }
    assert_eq!(service.pending_update_count(&engineer).await.unwrap(), 2);

    let queue = service.review_queue(&engineer).await.unwrap();
    for update in &queue {
        let approved = service.approve_update(&engineer, update.id).await.unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(engineer.user_id));
    }

    let project = service.get_project(&engineer, project.id).await.unwrap();
    assert_eq!(project.progress, d("40"));
    assert_eq!(project.status, ProjectStatus::Ongoing);

    let tasks = service.list_tasks(&manager, project.id, false).await.unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

    // already approved: a second review is a conflict
    let err = service.reject_update(&engineer, queue[0].id).await.unwrap_err();
    assert_eq!(err.http_status(), 409);
    assert_eq!(service.pending_update_count(&engineer).await.unwrap(), 0);
    assert_eq!(service.progress_history(&manager).await.unwrap().len(), 2);
}

#[tokio::test]
async fn progress_updates_are_for_managed_projects_only() {
    let store = Arc::new(MemoryStore::new());
    let eg = store.add_user("Erin", "erin@example.com", Role::Engineer).await;
    let service = ProjectService::new(store.clone(), Arc::new(MemoryFileStore::new()), store);
    let engineer = Principal::new(eg.id, Role::Engineer);
    let stranger = Principal::new(777, Role::ProjectManager);

    let Submission::Created(project) = service
        .submit_project(
            &engineer,
            ProjectSource::GeneralContractor,
            ProjectDraft::named("Annex"),
        )
        .await
        .unwrap()
    else {
        panic!("expected direct creation");
    };
    let scope = service
        .create_scope(&engineer, project.id, "Main", d("100"))
        .await
        .unwrap();
    let task = service
        .create_task(&engineer, project.id, input(scope.id, "Dig", "50"))
        .await
        .unwrap()
        .value;

    let err = service
        .submit_progress_update(&stranger, task.id, d("10"), None, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);

    let err = service
        .submit_progress_update(&engineer, task.id, d("10"), None, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);
}

#[tokio::test]
async fn dependency_cycles_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let eg = store.add_user("Erin", "erin@example.com", Role::Engineer).await;
    let service = ProjectService::new(store.clone(), Arc::new(MemoryFileStore::new()), store);
    let engineer = Principal::new(eg.id, Role::Engineer);
    let Submission::Created(project) = service
        .submit_project(&engineer, ProjectSource::DirectClient, ProjectDraft::named("Tower"))
        .await
        .unwrap()
    else {
        panic!("expected direct creation");
    };
    let scope = service
        .create_scope(&engineer, project.id, "Core", d("100"))
        .await
        .unwrap();
    let first = service
        .create_task(&engineer, project.id, input(scope.id, "Pile", "30"))
        .await
        .unwrap()
        .value;
    let mut second_input = input(scope.id, "Cap", "30");
    second_input.dependencies = vec![first.id];
    let second = service
        .create_task(&engineer, project.id, second_input)
        .await
        .unwrap()
        .value;

    let mut looped = input(scope.id, "Pile", "30");
    looped.dependencies = vec![second.id];
    let err = service
        .edit_task(&engineer, project.id, first.id, looped)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    let mut selfish = input(scope.id, "Pile", "30");
    selfish.dependencies = vec![first.id];
    assert!(service
        .edit_task(&engineer, project.id, first.id, selfish)
        .await
        .is_err());

    let archived = service
        .set_tasks_archived(&engineer, project.id, &[first.id, second.id], true)
        .await
        .unwrap();
    assert_eq!(archived, 2);
    assert!(service
        .list_tasks(&engineer, project.id, false)
        .await
        .unwrap()
        .is_empty());
}

// ── Properties ────────────────────────────────────────────────

fn scope(id: i64, weight: u32) -> Scope {
    Scope {
        id,
        project_id: 1,
        name: format!("S{id}"),
        weight: Decimal::from(weight),
        state: RecordState::Active,
    }
}

fn task(id: i64, scope_id: i64, weight: u32, progress: u32) -> Task {
    Task {
        id,
        project_id: 1,
        scope_id,
        name: format!("T{id}"),
        description: None,
        assigned_to: None,
        start_date: day(1),
        end_date: day(1),
        duration_days: 1,
        manhours: Decimal::from(8),
        weight: Decimal::from(weight),
        progress: Decimal::from(progress),
        status: TaskStatus::from_progress(Decimal::from(progress)),
        archived: false,
        dependencies: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// (scope weights, tasks as (scope index, weight, progress)).
fn plan() -> impl Strategy<Value = (Vec<u32>, Vec<(usize, u32, u32)>)> {
    prop::collection::vec(1u32..=100, 1..4).prop_flat_map(|weights| {
        let n = weights.len();
        (
            Just(weights),
            prop::collection::vec((0..n, 1u32..=100, 0u32..=100), 1..8),
        )
    })
}

fn build(weights: &[u32], specs: &[(usize, u32, u32)]) -> (Vec<Scope>, Vec<Task>) {
    let scopes = weights
        .iter()
        .enumerate()
        .map(|(i, w)| scope(i as i64 + 1, *w))
        .collect();
    let tasks = specs
        .iter()
        .enumerate()
        .map(|(i, (s, w, p))| task(i as i64 + 1, *s as i64 + 1, *w, *p))
        .collect();
    (scopes, tasks)
}

proptest! {
    #[test]
    fn progress_stays_within_bounds((weights, specs) in plan()) {
        let (scopes, tasks) = build(&weights, &specs);
        let p = project_progress(&scopes, &tasks);
        prop_assert!(p >= Decimal::ZERO);
        prop_assert!(p <= Decimal::ONE_HUNDRED);
    }

    #[test]
    fn raising_task_progress_never_lowers_project_progress(
        (weights, specs) in plan(),
        pick in any::<prop::sample::Index>(),
        bump in 0u32..=100,
    ) {
        let (scopes, tasks) = build(&weights, &specs);
        let before = project_progress(&scopes, &tasks);

        let mut raised = tasks.clone();
        let i = pick.index(raised.len());
        let new_progress = (raised[i].progress + Decimal::from(bump)).min(Decimal::ONE_HUNDRED);
        raised[i].progress = new_progress;
        let after = project_progress(&scopes, &raised);

        prop_assert!(after >= before);
    }
}
