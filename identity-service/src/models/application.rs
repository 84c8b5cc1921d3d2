//! Application model - registered consumer systems with their own API key
//! and user roster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{RoleResponse, UserResponse};

/// Application entity. `name` is unique among the owning client's live
/// applications. The API key is generated at creation and rotated on
/// demand.
#[derive(Debug, Clone, FromRow)]
pub struct Application {
    pub id: i64,
    pub uuid: Uuid,
    pub client_id: i64,
    pub client_uuid: Uuid,
    pub name: String,
    pub category: String,
    pub api_key: String,
    pub redirect_route: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Convert to sanitized response (no internal ids).
    pub fn sanitized(&self) -> ApplicationResponse {
        ApplicationResponse::from(self.clone())
    }
}

/// Request to register an application under a client.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApplicationRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "redirect", default)]
    pub redirect_route: String,
    #[serde(default)]
    pub description: String,
}

/// Request to update an application. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateApplicationRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "redirect")]
    pub redirect_route: Option<String>,
    pub description: Option<String>,
}

/// Application response for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationResponse {
    pub uuid: Uuid,
    pub client_uuid: Uuid,
    pub name: String,
    pub category: String,
    #[serde(rename = "apikey")]
    pub api_key: String,
    #[serde(rename = "redirect")]
    pub redirect_route: String,
    pub description: String,
}

impl From<Application> for ApplicationResponse {
    fn from(a: Application) -> Self {
        Self {
            uuid: a.uuid,
            client_uuid: a.client_uuid,
            name: a.name,
            category: a.category,
            api_key: a.api_key,
            redirect_route: a.redirect_route,
            description: a.description,
        }
    }
}

/// Application with its roles and enrolled users.
#[derive(Debug, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: ApplicationResponse,
    pub roles: Vec<RoleResponse>,
    pub users: Vec<UserResponse>,
}
