//! Role model - named grants scoped to a (user, application) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Role entity. A user cannot hold the same named role twice within one
/// application; the store enforces this on live rows.
#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub id: i64,
    pub uuid: Uuid,
    pub user_id: i64,
    pub application_id: i64,
    pub user_uuid: Uuid,
    pub application_uuid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    /// Convert to sanitized response (no internal ids).
    pub fn sanitized(&self) -> RoleResponse {
        RoleResponse::from(self.clone())
    }
}

/// Request to grant a role to a user within an application.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    pub user_uuid: Uuid,
    pub application_uuid: Uuid,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
}

/// Request to rename a role.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
}

/// Role response for API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct RoleResponse {
    pub uuid: Uuid,
    pub user_uuid: Uuid,
    pub application_uuid: Uuid,
    pub name: String,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            uuid: r.uuid,
            user_uuid: r.user_uuid,
            application_uuid: r.application_uuid,
            name: r.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_exposes_uuids_only() {
        let role = Role {
            id: 11,
            uuid: Uuid::new_v4(),
            user_id: 9,
            application_id: 3,
            user_uuid: Uuid::new_v4(),
            application_uuid: Uuid::new_v4(),
            name: "editor".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let value = serde_json::to_value(role.sanitized()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(value["name"], "editor");
        assert!(obj.contains_key("user_uuid"));
        assert!(obj.contains_key("application_uuid"));
        assert!(!obj.contains_key("user_id"));
        assert!(!obj.contains_key("application_id"));
        assert!(!obj.contains_key("id"));
    }

    #[test]
    fn create_request_rejects_empty_name() {
        let req = CreateRoleRequest {
            user_uuid: Uuid::new_v4(),
            application_uuid: Uuid::new_v4(),
            name: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
