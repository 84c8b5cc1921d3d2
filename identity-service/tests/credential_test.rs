//! Credential integration tests: per-(user, application) username
//! uniqueness and hash-only storage.

mod common;

use common::{create_test_application, create_test_client, create_test_user, test_database};
use identity_core::error::AppError;
use identity_service::models::{CreateCredentialRequest, UpdateCredentialRequest};
use identity_service::utils::{verify_secret, Plaintext};
use serial_test::serial;
use uuid::Uuid;

fn credential_request(
    user_uuid: Uuid,
    application_uuid: Uuid,
    user_name: &str,
) -> CreateCredentialRequest {
    CreateCredentialRequest {
        user_uuid,
        application_uuid,
        user_name: user_name.to_string(),
        password: "correct horse battery staple".to_string(),
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn create_credential_stores_hash_only() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    let cred = db
        .create_credential(&credential_request(user.uuid, app.uuid, "ada.l"))
        .await
        .expect("create failed");

    assert!(!cred.uuid.is_nil());
    assert!(cred.password_hash.starts_with("$argon2"));
    assert_ne!(cred.password_hash, "correct horse battery staple");
    assert!(verify_secret(
        &Plaintext::new("correct horse battery staple"),
        &cred.password_hash
    )
    .unwrap());
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn duplicate_username_for_the_pair_conflicts() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    db.create_credential(&credential_request(user.uuid, app.uuid, "ada.l"))
        .await
        .expect("first create failed");

    let err = db
        .create_credential(&credential_request(user.uuid, app.uuid, "ada.l"))
        .await
        .expect_err("duplicate username must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn same_username_in_another_application_is_allowed() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let first = create_test_application(&db, client.uuid, "dashboard").await;
    let second = create_test_application(&db, client.uuid, "mobile").await;
    let user = create_test_user(&db).await;

    db.create_credential(&credential_request(user.uuid, first.uuid, "ada.l"))
        .await
        .expect("first create failed");
    db.create_credential(&credential_request(user.uuid, second.uuid, "ada.l"))
        .await
        .expect("credential in other application must succeed");
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn find_credential_by_username_resolves_the_application_scope() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let first = create_test_application(&db, client.uuid, "dashboard").await;
    let second = create_test_application(&db, client.uuid, "mobile").await;
    let user = create_test_user(&db).await;

    let created = db
        .create_credential(&credential_request(user.uuid, first.uuid, "ada.l"))
        .await
        .expect("create failed");

    let found = db
        .find_credential_by_username(first.uuid, "ada.l")
        .await
        .expect("find failed")
        .expect("credential must be found");
    assert_eq!(found.uuid, created.uuid);

    let missing = db
        .find_credential_by_username(second.uuid, "ada.l")
        .await
        .expect("find failed");
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn update_credential_rehashes_password() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    let cred = db
        .create_credential(&credential_request(user.uuid, app.uuid, "ada.l"))
        .await
        .expect("create failed");

    let updated = db
        .update_credential(
            cred.uuid,
            &UpdateCredentialRequest {
                new_pwd: Some("an entirely new passphrase".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update failed");

    assert_ne!(updated.password_hash, cred.password_hash);
    assert!(verify_secret(
        &Plaintext::new("an entirely new passphrase"),
        &updated.password_hash
    )
    .unwrap());
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn soft_deleted_credential_is_hidden_from_login_lookup() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let app = create_test_application(&db, client.uuid, "dashboard").await;
    let user = create_test_user(&db).await;

    let cred = db
        .create_credential(&credential_request(user.uuid, app.uuid, "ada.l"))
        .await
        .expect("create failed");

    db.delete_credential(cred.uuid).await.expect("delete failed");

    let missing = db
        .find_credential_by_username(app.uuid, "ada.l")
        .await
        .expect("find failed");
    assert!(missing.is_none());
}
