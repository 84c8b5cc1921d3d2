//! Organization model - client-scoped groupings with a signing secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Organization entity. `name` is unique among the owning client's live
/// organizations; `jwt_secret` is issued at creation and never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub id: i64,
    pub uuid: Uuid,
    pub client_id: i64,
    pub client_uuid: Uuid,
    pub name: String,
    pub category: String,
    pub comments: String,
    pub jwt_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    /// Convert to sanitized response (no secret, no internal ids).
    pub fn sanitized(&self) -> OrganizationResponse {
        OrganizationResponse::from(self.clone())
    }
}

/// Request to create an organization under a client.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub comments: String,
}

/// Request to update an organization. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    pub category: Option<String>,
    pub comments: Option<String>,
}

/// Organization response for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationResponse {
    pub uuid: Uuid,
    pub client_uuid: Uuid,
    pub name: String,
    pub category: String,
    pub comments: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(o: Organization) -> Self {
        Self {
            uuid: o.uuid,
            client_uuid: o.client_uuid,
            name: o.name,
            category: o.category,
            comments: o.comments,
        }
    }
}
