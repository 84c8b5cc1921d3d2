//! Role integration tests: the (user, application, name) grant must be
//! unique among live roles.

mod common;

use common::{create_test_application, create_test_client, create_test_user, test_database};
use identity_core::error::AppError;
use identity_service::models::CreateRoleRequest;
use serial_test::serial;
use uuid::Uuid;

fn role_request(user_uuid: Uuid, application_uuid: Uuid, name: &str) -> CreateRoleRequest {
    CreateRoleRequest {
        user_uuid,
        application_uuid,
        name: name.to_string(),
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn grant_role_succeeds() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    let role = db
        .create_role(&role_request(user.uuid, app.uuid, "editor"))
        .await
        .expect("grant failed");

    assert!(!role.uuid.is_nil());
    assert_eq!(role.user_uuid, user.uuid);
    assert_eq!(role.application_uuid, app.uuid);
    assert_eq!(role.name, "editor");
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn duplicate_grant_in_same_application_conflicts() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    db.create_role(&role_request(user.uuid, app.uuid, "editor"))
        .await
        .expect("first grant failed");

    let err = db
        .create_role(&role_request(user.uuid, app.uuid, "editor"))
        .await
        .expect_err("duplicate grant must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn same_name_in_another_application_is_allowed() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let first = create_test_application(&db, client.uuid, "dashboard").await;
    let second = create_test_application(&db, client.uuid, "mobile").await;
    let user = create_test_user(&db).await;

    db.create_role(&role_request(user.uuid, first.uuid, "editor"))
        .await
        .expect("first grant failed");
    db.create_role(&role_request(user.uuid, second.uuid, "editor"))
        .await
        .expect("grant in other application must succeed");
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn soft_deleted_grant_can_be_reissued() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    let role = db
        .create_role(&role_request(user.uuid, app.uuid, "editor"))
        .await
        .expect("grant failed");

    db.delete_role(role.uuid).await.expect("delete failed");

    db.create_role(&role_request(user.uuid, app.uuid, "editor"))
        .await
        .expect("regrant after soft delete must succeed");
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn grant_for_unknown_user_is_not_found() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;

    let err = db
        .create_role(&role_request(Uuid::new_v4(), app.uuid, "editor"))
        .await
        .expect_err("unknown user must be reported");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn list_roles_is_scoped_to_the_pair() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let first = create_test_application(&db, client.uuid, "dashboard").await;
    let second = create_test_application(&db, client.uuid, "mobile").await;
    let user = create_test_user(&db).await;

    db.create_role(&role_request(user.uuid, first.uuid, "editor"))
        .await
        .expect("grant failed");
    db.create_role(&role_request(user.uuid, second.uuid, "viewer"))
        .await
        .expect("grant failed");

    let roles = db
        .list_roles(user.uuid, first.uuid)
        .await
        .expect("list failed");

    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "editor");
}
