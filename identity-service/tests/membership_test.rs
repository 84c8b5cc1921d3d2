//! Membership integration tests: the user↔application association.

mod common;

use common::{create_test_application, create_test_client, create_test_user, test_database};
use identity_core::error::AppError;
use serial_test::serial;

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn enrollment_is_visible_from_both_sides() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    db.add_user_to_application(user.uuid, app.uuid)
        .await
        .expect("enroll failed");

    let apps = db
        .list_applications_for_user(user.uuid)
        .await
        .expect("list failed");
    assert!(apps.iter().any(|a| a.uuid == app.uuid));

    let users = db
        .list_users_for_application(app.uuid)
        .await
        .expect("list failed");
    assert!(users.iter().any(|u| u.uuid == user.uuid));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn duplicate_enrollment_conflicts() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    db.add_user_to_application(user.uuid, app.uuid)
        .await
        .expect("enroll failed");

    let err = db
        .add_user_to_application(user.uuid, app.uuid)
        .await
        .expect_err("duplicate enrollment must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn removal_deletes_the_association() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    db.add_user_to_application(user.uuid, app.uuid)
        .await
        .expect("enroll failed");
    db.remove_user_from_application(user.uuid, app.uuid)
        .await
        .expect("remove failed");

    let apps = db
        .list_applications_for_user(user.uuid)
        .await
        .expect("list failed");
    assert!(apps.is_empty());

    let err = db
        .remove_user_from_application(user.uuid, app.uuid)
        .await
        .expect_err("second removal must be reported");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn detail_shapes_include_memberships_and_grants() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    db.add_user_to_application(user.uuid, app.uuid)
        .await
        .expect("enroll failed");
    db.create_role(&identity_service::models::CreateRoleRequest {
        user_uuid: user.uuid,
        application_uuid: app.uuid,
        name: "editor".to_string(),
    })
    .await
    .expect("grant failed");

    let user_detail = db
        .get_user_with_relations(user.uuid)
        .await
        .expect("user detail failed");
    assert!(user_detail.applications.iter().any(|a| a.uuid == app.uuid));
    assert!(user_detail.roles.iter().any(|r| r.name == "editor"));

    let app_detail = db
        .get_application_with_relations(app.uuid)
        .await
        .expect("application detail failed");
    assert!(app_detail.users.iter().any(|u| u.uuid == user.uuid));
    assert!(app_detail.roles.iter().any(|r| r.name == "editor"));
}
