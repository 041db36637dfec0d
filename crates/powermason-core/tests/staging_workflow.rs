//! Submission, approval and rejection of staged projects.

use std::sync::Arc;

use powermason_core::files::{FileStore, MemoryFileStore};
use powermason_core::memory::MemoryStore;
use powermason_core::ports::ProjectStore;
use powermason_core::principal::Principal;
use powermason_core::project::{ProjectDraft, ProjectFilter};
use powermason_core::service::Submission;
use powermason_core::staging::SortOrder;
use powermason_core::types::{ProjectSource, ReviewStatus, Role};
use powermason_core::ProjectService;
use rust_decimal::Decimal;
use serde_json::json;

struct Fixture {
    store: Arc<MemoryStore>,
    files: MemoryFileStore,
    service: ProjectService,
    engineer: Principal,
    manager: Principal,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let files = MemoryFileStore::new();
    let eg = store.add_user("Erin Engineer", "erin@example.com", Role::Engineer).await;
    let om = store
        .add_user("Omar Operations", "omar@example.com", Role::OperationsManager)
        .await;
    let service = ProjectService::new(store.clone(), Arc::new(files.clone()), store.clone());
    Fixture {
        store,
        files,
        service,
        engineer: Principal::new(eg.id, Role::Engineer),
        manager: Principal::new(om.id, Role::OperationsManager),
    }
}

fn warehouse_draft() -> ProjectDraft {
    serde_json::from_value(json!({"project_name": "Warehouse A", "budget": 500000})).unwrap()
}

#[tokio::test]
async fn approving_creates_exactly_one_project() {
    let f = fixture().await;

    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, warehouse_draft())
        .await
        .unwrap()
    else {
        panic!("operations manager submissions are staged");
    };
    assert_eq!(staged.status, ReviewStatus::Pending);
    assert!(f
        .store
        .list_projects(&ProjectFilter::default())
        .await
        .unwrap()
        .is_empty());

    let approved = f
        .service
        .approve_staging(&f.engineer, staged.id)
        .await
        .unwrap();
    assert_eq!(approved.project.name(), "Warehouse A");
    assert_eq!(approved.project.approved_budget(), Some(Decimal::new(500_000, 0)));
    assert_eq!(approved.project.project_code, "DC-001");
    assert_eq!(approved.project.created_by, Some(f.manager.user_id));
    assert_eq!(approved.decision.decision, ReviewStatus::Approved);

    let projects = f.store.list_projects(&ProjectFilter::default()).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert!(f.store.get_staging(staged.id).await.unwrap().is_none());
    assert!(f
        .service
        .list_pending_staging(&f.engineer, SortOrder::Asc)
        .await
        .unwrap()
        .is_empty());

    // the side log outlives the staging row
    let history = f
        .service
        .staging_history(&f.engineer, staged.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].project_id, Some(approved.project.id));

    // a second approval finds nothing to approve
    let err = f
        .service
        .approve_staging(&f.engineer, staged.id)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn submission_and_approval_notify() {
    let f = fixture().await;
    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::GeneralContractor, warehouse_draft())
        .await
        .unwrap()
    else {
        panic!("expected staging");
    };

    let to_engineer = f.store.notifications_for(f.engineer.user_id).await;
    assert_eq!(
        to_engineer[0].message,
        "Omar Operations submitted a new project 'Warehouse A' for approval."
    );
    let to_self = f.store.notifications_for(f.manager.user_id).await;
    assert_eq!(
        to_self[0].message,
        "You submitted the project 'Warehouse A'. Waiting for approval from Engineers."
    );

    let approved = f
        .service
        .approve_staging(&f.engineer, staged.id)
        .await
        .unwrap();
    let to_manager = f.store.notifications_for(f.manager.user_id).await;
    let last = to_manager.last().unwrap();
    assert_eq!(last.message, "A new project 'Warehouse A' has been approved.");
    assert_eq!(
        last.link.as_deref(),
        Some(format!("/projects/{}/details/", approved.project.id).as_str())
    );
}

#[tokio::test]
async fn rejecting_creates_nothing() {
    let f = fixture().await;
    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, warehouse_draft())
        .await
        .unwrap()
    else {
        panic!("expected staging");
    };

    let decision = f
        .service
        .reject_staging(&f.engineer, staged.id, Some("Missing permits".into()))
        .await
        .unwrap();
    assert_eq!(decision.decision, ReviewStatus::Rejected);
    assert_eq!(decision.project_id, None);
    assert_eq!(decision.comments.as_deref(), Some("Missing permits"));

    assert!(f
        .store
        .list_projects(&ProjectFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert!(f.store.get_staging(staged.id).await.unwrap().is_none());
}

#[tokio::test]
async fn contract_is_copied_on_approval() {
    let f = fixture().await;
    f.files
        .save("staging_contracts/contract.pdf", b"signed")
        .await
        .unwrap();
    let mut draft = warehouse_draft();
    draft.contract_agreement = Some("staging_contracts/contract.pdf".into());

    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, draft)
        .await
        .unwrap()
    else {
        panic!("expected staging");
    };
    let approved = f
        .service
        .approve_staging(&f.engineer, staged.id)
        .await
        .unwrap();

    let path = approved.project.details.contract_agreement.unwrap();
    assert_eq!(path, format!("project_files/staging-{}/contract.pdf", staged.id));
    assert_eq!(f.files.open(&path).await.unwrap(), b"signed");
}

async fn stage_with_contract(f: &Fixture, name: &str, contract: &str) -> i64 {
    let mut draft: ProjectDraft =
        serde_json::from_value(json!({"project_name": name, "budget": 100000})).unwrap();
    draft.contract_agreement = Some(contract.into());
    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, draft)
        .await
        .unwrap()
    else {
        panic!("expected staging");
    };
    staged.id
}

#[tokio::test]
async fn same_named_contracts_stay_separate() {
    let f = fixture().await;
    f.files.save("a/contract.pdf", b"AAAA").await.unwrap();
    f.files.save("b/contract.pdf", b"BBBB").await.unwrap();
    let first = stage_with_contract(&f, "Depot North", "a/contract.pdf").await;
    let second = stage_with_contract(&f, "Depot South", "b/contract.pdf").await;

    let p1 = f.service.approve_staging(&f.engineer, first).await.unwrap();
    let p2 = f.service.approve_staging(&f.engineer, second).await.unwrap();

    let c1 = p1.project.details.contract_agreement.unwrap();
    let c2 = p2.project.details.contract_agreement.unwrap();
    assert_ne!(c1, c2);
    assert_eq!(f.files.open(&c1).await.unwrap(), b"AAAA");
    assert_eq!(f.files.open(&c2).await.unwrap(), b"BBBB");
}

#[tokio::test]
async fn resolved_entry_is_not_copied_again() {
    let f = fixture().await;
    f.files.save("a/contract.pdf", b"AAAA").await.unwrap();
    let id = stage_with_contract(&f, "Depot North", "a/contract.pdf").await;
    f.service.approve_staging(&f.engineer, id).await.unwrap();

    let err = f.service.approve_staging(&f.engineer, id).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
    let dir = format!("project_files/staging-{id}");
    assert!(f.files.exists(&format!("{dir}/contract.pdf")).await.unwrap());
    assert!(!f.files.exists(&format!("{dir}/contract_1.pdf")).await.unwrap());
}

#[tokio::test]
async fn missing_contract_is_dropped() {
    let f = fixture().await;
    let mut draft = warehouse_draft();
    draft.contract_agreement = Some("staging_contracts/gone.pdf".into());
    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, draft)
        .await
        .unwrap()
    else {
        panic!("expected staging");
    };
    let approved = f
        .service
        .approve_staging(&f.engineer, staged.id)
        .await
        .unwrap();
    assert_eq!(approved.project.details.contract_agreement, None);
}

#[tokio::test]
async fn only_engineers_review() {
    let f = fixture().await;
    let Submission::Staged(staged) = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, warehouse_draft())
        .await
        .unwrap()
    else {
        panic!("expected staging");
    };
    let err = f
        .service
        .approve_staging(&f.manager, staged.id)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);

    let viewer = Principal::new(50, Role::Viewer);
    let err = f
        .service
        .submit_project(&viewer, ProjectSource::DirectClient, warehouse_draft())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 403);
}

#[tokio::test]
async fn invalid_draft_is_rejected_before_staging() {
    let f = fixture().await;
    let err = f
        .service
        .submit_project(&f.manager, ProjectSource::DirectClient, ProjectDraft::named(""))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert!(f
        .service
        .list_pending_staging(&f.engineer, SortOrder::Desc)
        .await
        .unwrap()
        .is_empty());
}
