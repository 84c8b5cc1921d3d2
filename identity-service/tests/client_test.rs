//! Client lifecycle integration tests.

mod common;

use common::{create_test_client, test_database, unique_tag};
use identity_core::error::AppError;
use identity_service::models::{CreateClientRequest, UpdateClientRequest};
use identity_service::utils::{verify_secret, Plaintext};
use serial_test::serial;
use uuid::Uuid;

fn client_request(email: String) -> CreateClientRequest {
    CreateClientRequest {
        name: "Acme".to_string(),
        address_line1: "1 Main St".to_string(),
        address_line2: String::new(),
        address_line3: String::new(),
        phone: "555-0100".to_string(),
        email,
        password: "correct horse battery staple".to_string(),
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn create_client_issues_uuid_and_stores_hash_only() {
    let db = test_database().await;

    let request = client_request(format!("owner-{}@acme.test", unique_tag()));
    let client = db.create_client(&request).await.expect("create failed");

    assert!(!client.uuid.is_nil());
    assert!(client.id > 0);
    assert!(client.password_hash.starts_with("$argon2"));
    assert_ne!(client.password_hash, request.password);
    assert!(verify_secret(&Plaintext::new(request.password.clone()), &client.password_hash).unwrap());
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn create_client_rejects_duplicate_email() {
    let db = test_database().await;

    let email = format!("owner-{}@acme.test", unique_tag());
    db.create_client(&client_request(email.clone()))
        .await
        .expect("first create failed");

    let err = db
        .create_client(&client_request(email))
        .await
        .expect_err("duplicate email must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn create_client_validates_email() {
    let db = test_database().await;

    let err = db
        .create_client(&client_request("not-an-email".to_string()))
        .await
        .expect_err("invalid email must be rejected");
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn get_client_round_trips_and_unknown_uuid_is_not_found() {
    let db = test_database().await;

    let created = create_test_client(&db).await;
    let fetched = db.get_client(created.uuid).await.expect("get failed");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.email, created.email);

    let err = db
        .get_client(Uuid::new_v4())
        .await
        .expect_err("unknown uuid must be not found");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn update_client_changes_fields_and_rehashes_password() {
    let db = test_database().await;

    let client = create_test_client(&db).await;
    let update = UpdateClientRequest {
        name: Some("Acme Renamed".to_string()),
        new_pwd: Some("an entirely new passphrase".to_string()),
        ..Default::default()
    };

    let updated = db.update_client(client.uuid, &update).await.expect("update failed");

    assert_eq!(updated.name, "Acme Renamed");
    assert_eq!(updated.email, client.email);
    assert_ne!(updated.password_hash, client.password_hash);
    assert!(verify_secret(
        &Plaintext::new("an entirely new passphrase"),
        &updated.password_hash
    )
    .unwrap());
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn soft_delete_hides_client_but_keeps_row_and_frees_email() {
    let db = test_database().await;

    let email = format!("owner-{}@acme.test", unique_tag());
    let client = db
        .create_client(&client_request(email.clone()))
        .await
        .expect("create failed");

    db.delete_client(client.uuid).await.expect("delete failed");

    let err = db.get_client(client.uuid).await.expect_err("deleted client must be hidden");
    assert!(matches!(err, AppError::NotFound(_)));

    // The row is still there, just marked.
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT deleted_at FROM clients WHERE uuid = $1")
            .bind(client.uuid)
            .fetch_one(db.pool())
            .await
            .expect("row must still exist");
    assert!(deleted_at.is_some());

    // The email is reusable by a new live client.
    db.create_client(&client_request(email))
        .await
        .expect("email must be reusable after soft delete");
}

#[tokio::test]
#[serial]
#[ignore] // Requires running PostgreSQL
async fn list_clients_excludes_deleted() {
    let db = test_database().await;

    let kept = create_test_client(&db).await;
    let removed = create_test_client(&db).await;
    db.delete_client(removed.uuid).await.expect("delete failed");

    let mut listed = Vec::new();
    let mut token = None;
    loop {
        let page = db.list_clients(100, token).await.expect("list failed");
        let Some(last) = page.last() else { break };
        token = Some(last.uuid);
        listed.extend(page);
    }

    assert!(listed.iter().any(|c| c.uuid == kept.uuid));
    assert!(!listed.iter().any(|c| c.uuid == removed.uuid));
}
