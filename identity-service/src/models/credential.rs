//! Credential model - per-application login identities for a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Credential entity. `user_name` is unique within the owning
/// (user, application) pair among live rows; only the salted hash of the
/// password is ever stored.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: i64,
    pub uuid: Uuid,
    pub user_id: i64,
    pub application_id: i64,
    pub user_uuid: Uuid,
    pub application_uuid: Uuid,
    pub user_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Convert to sanitized response (no hash, no internal ids).
    pub fn sanitized(&self) -> CredentialResponse {
        CredentialResponse::from(self.clone())
    }
}

/// Request to create a credential for a user within an application.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCredentialRequest {
    pub user_uuid: Uuid,
    pub application_uuid: Uuid,
    #[serde(rename = "username")]
    #[validate(length(min = 1, message = "username is required"))]
    pub user_name: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

/// Request to update a credential. `new_pwd` replaces the stored hash.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCredentialRequest {
    #[serde(rename = "username")]
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub user_name: Option<String>,
    #[serde(rename = "new_pwd")]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub new_pwd: Option<String>,
}

/// Credential response for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialResponse {
    pub uuid: Uuid,
    pub user_uuid: Uuid,
    pub application_uuid: Uuid,
    #[serde(rename = "username")]
    pub user_name: String,
}

impl From<Credential> for CredentialResponse {
    fn from(c: Credential) -> Self {
        Self {
            uuid: c.uuid,
            user_uuid: c.user_uuid,
            application_uuid: c.application_uuid,
            user_name: c.user_name,
        }
    }
}
