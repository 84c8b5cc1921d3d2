//! Transient login shapes. None of these are persisted; they exist only
//! on the wire between the external authentication collaborator and its
//! callers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::ClientResponse;

/// Login request carrying a client's email and plaintext password.
/// Deserialization-only: the plaintext never serializes back out.
#[derive(Debug, Deserialize, Validate)]
pub struct ClientCredential {
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// Response pairing an authenticated client with an issued token.
#[derive(Debug, Serialize)]
pub struct LoginToken {
    pub client: ClientResponse,
    pub token: String,
}

/// Post-login redirect instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRedirect {
    pub client_uuid: Uuid,
    pub application_uuid: Uuid,
    #[serde(rename = "redirect")]
    pub redirect_route: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_credential_requires_both_fields() {
        let req: ClientCredential = serde_json::from_value(serde_json::json!({
            "email": "owner@acme.test",
            "password": ""
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let ok: ClientCredential = serde_json::from_value(serde_json::json!({
            "email": "owner@acme.test",
            "password": "hunter2"
        }))
        .unwrap();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn login_redirect_round_trips() {
        let redirect = LoginRedirect {
            client_uuid: Uuid::new_v4(),
            application_uuid: Uuid::new_v4(),
            redirect_route: "/home".to_string(),
        };

        let value = serde_json::to_value(&redirect).unwrap();
        assert_eq!(value["redirect"], "/home");

        let back: LoginRedirect = serde_json::from_value(value).unwrap();
        assert_eq!(back.client_uuid, redirect.client_uuid);
    }
}
