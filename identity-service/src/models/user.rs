//! User model - global accounts enrolled into applications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{ApplicationResponse, CredentialResponse, RoleResponse};

/// User entity. `email` is unique among live users. The `logged_in` flag
/// is persisted state flipped by the external session collaborator and is
/// never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: Uuid,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub preferred_name: String,
    pub email: String,
    pub email2: String,
    pub phone1: String,
    pub phone2: String,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub location: String,
    pub logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Convert to sanitized response (no internal id, no session state).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// Request to create a user.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[serde(rename = "first", default)]
    pub first_name: String,
    #[serde(rename = "middle", default)]
    pub middle_name: String,
    #[serde(rename = "last", default)]
    pub last_name: String,
    #[serde(rename = "preferred", default)]
    pub preferred_name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[serde(default)]
    pub email2: String,
    #[serde(default)]
    pub phone1: String,
    #[serde(default)]
    pub phone2: String,
    #[serde(rename = "addressline1", default)]
    pub address_line1: String,
    #[serde(rename = "addressline2", default)]
    pub address_line2: String,
    #[serde(rename = "addressline3", default)]
    pub address_line3: String,
    #[serde(default)]
    pub location: String,
}

/// Request to update a user. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[serde(rename = "first")]
    pub first_name: Option<String>,
    #[serde(rename = "middle")]
    pub middle_name: Option<String>,
    #[serde(rename = "last")]
    pub last_name: Option<String>,
    #[serde(rename = "preferred")]
    pub preferred_name: Option<String>,
    #[validate(email(message = "a valid email is required"))]
    pub email: Option<String>,
    pub email2: Option<String>,
    pub phone1: Option<String>,
    pub phone2: Option<String>,
    #[serde(rename = "addressline1")]
    pub address_line1: Option<String>,
    #[serde(rename = "addressline2")]
    pub address_line2: Option<String>,
    #[serde(rename = "addressline3")]
    pub address_line3: Option<String>,
    pub location: Option<String>,
}

/// User response for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub uuid: Uuid,
    #[serde(rename = "first")]
    pub first_name: String,
    #[serde(rename = "middle")]
    pub middle_name: String,
    #[serde(rename = "last")]
    pub last_name: String,
    #[serde(rename = "preferred")]
    pub preferred_name: String,
    pub email: String,
    pub email2: String,
    pub phone1: String,
    pub phone2: String,
    #[serde(rename = "addressline1")]
    pub address_line1: String,
    #[serde(rename = "addressline2")]
    pub address_line2: String,
    #[serde(rename = "addressline3")]
    pub address_line3: String,
    pub location: String,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            uuid: u.uuid,
            first_name: u.first_name,
            middle_name: u.middle_name,
            last_name: u.last_name,
            preferred_name: u.preferred_name,
            email: u.email,
            email2: u.email2,
            phone1: u.phone1,
            phone2: u.phone2,
            address_line1: u.address_line1,
            address_line2: u.address_line2,
            address_line3: u.address_line3,
            location: u.location,
        }
    }
}

/// User with roles, credentials and application memberships.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserResponse,
    pub roles: Vec<RoleResponse>,
    pub credentials: Vec<CredentialResponse>,
    pub applications: Vec<ApplicationResponse>,
}
