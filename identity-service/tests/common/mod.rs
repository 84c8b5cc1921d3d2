//! Common test utilities for identity-service integration tests.

use identity_service::config::DatabaseConfig;
use identity_service::models::{
    Application, Client, CreateApplicationRequest, CreateClientRequest, CreateOrganizationRequest,
    CreateUserRequest, Organization, User,
};
use identity_service::services::Database;
use identity_service::db;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,identity_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Connect to the test database and apply migrations.
pub async fn test_database() -> Database {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run database-backed tests");

    let config = DatabaseConfig {
        url: database_url,
        max_connections: 2,
        min_connections: 1,
    };

    let pool = db::create_pool(&config)
        .await
        .expect("Failed to connect to test database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Database::new(pool)
}

/// Unique suffix so concurrent test runs never collide on unique columns.
pub fn unique_tag() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Helper to create a client with a unique email.
pub async fn create_test_client(db: &Database) -> Client {
    let request = CreateClientRequest {
        name: "Test Client".to_string(),
        address_line1: String::new(),
        address_line2: String::new(),
        address_line3: String::new(),
        phone: String::new(),
        email: format!("client-{}@example.test", unique_tag()),
        password: "correct horse battery staple".to_string(),
    };

    db.create_client(&request)
        .await
        .expect("Failed to create client")
}

/// Helper to create an organization under a client.
pub async fn create_test_organization(db: &Database, client_uuid: Uuid, name: &str) -> Organization {
    let request = CreateOrganizationRequest {
        name: name.to_string(),
        category: String::new(),
        comments: String::new(),
    };

    db.create_organization(client_uuid, &request)
        .await
        .expect("Failed to create organization")
}

/// Helper to create an application under a client.
pub async fn create_test_application(db: &Database, client_uuid: Uuid, name: &str) -> Application {
    let request = CreateApplicationRequest {
        name: name.to_string(),
        category: String::new(),
        redirect_route: "/home".to_string(),
        description: String::new(),
    };

    db.create_application(client_uuid, &request)
        .await
        .expect("Failed to create application")
}

/// Helper to create a user with a unique email.
pub async fn create_test_user(db: &Database) -> User {
    let request = CreateUserRequest {
        first_name: "Test".to_string(),
        middle_name: String::new(),
        last_name: "User".to_string(),
        preferred_name: String::new(),
        email: format!("user-{}@example.test", unique_tag()),
        email2: String::new(),
        phone1: String::new(),
        phone2: String::new(),
        address_line1: String::new(),
        address_line2: String::new(),
        address_line3: String::new(),
        location: String::new(),
    };

    db.create_user(&request).await.expect("Failed to create user")
}
