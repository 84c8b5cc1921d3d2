//! Client model - tenant root owning organizations and applications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{ApplicationResponse, OrganizationResponse};

/// Client entity. The internal `id` is the storage primary key; external
/// callers only ever see the `uuid`.
#[derive(Debug, Clone, FromRow)]
pub struct Client {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Client {
    /// Convert to sanitized response (no hash, no internal ids).
    pub fn sanitized(&self) -> ClientResponse {
        ClientResponse::from(self.clone())
    }
}

/// Request to register a new client.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "addressline1", default)]
    pub address_line1: String,
    #[serde(rename = "addressline2", default)]
    pub address_line2: String,
    #[serde(rename = "addressline3", default)]
    pub address_line3: String,
    #[serde(default)]
    pub phone: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

/// Request to update a client. Absent fields are left unchanged;
/// `new_pwd` replaces the stored hash.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    #[serde(rename = "addressline1")]
    pub address_line1: Option<String>,
    #[serde(rename = "addressline2")]
    pub address_line2: Option<String>,
    #[serde(rename = "addressline3")]
    pub address_line3: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "a valid email is required"))]
    pub email: Option<String>,
    #[serde(rename = "new_pwd")]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub new_pwd: Option<String>,
}

/// Client response for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ClientResponse {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "addressline1")]
    pub address_line1: String,
    #[serde(rename = "addressline2")]
    pub address_line2: String,
    #[serde(rename = "addressline3")]
    pub address_line3: String,
    pub phone: String,
    pub email: String,
}

impl From<Client> for ClientResponse {
    fn from(c: Client) -> Self {
        Self {
            uuid: c.uuid,
            name: c.name,
            address_line1: c.address_line1,
            address_line2: c.address_line2,
            address_line3: c.address_line3,
            phone: c.phone,
            email: c.email,
        }
    }
}

/// Client with its organizations and applications.
#[derive(Debug, Serialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub client: ClientResponse,
    pub organizations: Vec<OrganizationResponse>,
    pub applications: Vec<ApplicationResponse>,
}
