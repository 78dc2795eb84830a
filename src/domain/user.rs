use crate::domain::session::SessionUser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current user as reported by the backend (Keycloak claims, camelCase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub realm_access: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub resource_access: Option<HashMap<String, HashMap<String, Vec<String>>>>,
}

/// Application profile record stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub profile_data: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OidcUserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

impl From<OidcUserInfo> for SessionUser {
    fn from(info: OidcUserInfo) -> Self {
        Self {
            id: info.sub,
            name: info.name,
            email: info.email,
            username: info.preferred_username,
            roles: info.realm_access.map(|access| access.roles).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_user_from_userinfo() {
        let info: OidcUserInfo = serde_json::from_value(serde_json::json!({
            "sub": "f3b1",
            "email_verified": true,
            "name": "Ada Lovelace",
            "preferred_username": "ada",
            "email": "ada@example.com",
            "realm_access": { "roles": ["admin", "user"] }
        }))
        .unwrap();

        let user = SessionUser::from(info);
        assert_eq!(user.id, "f3b1");
        assert_eq!(user.username.as_deref(), Some("ada"));
        assert_eq!(user.roles, vec!["admin".to_string(), "user".to_string()]);
    }

    #[test]
    fn test_userinfo_without_roles() {
        let info: OidcUserInfo = serde_json::from_str(r#"{"sub":"x"}"#).unwrap();
        assert!(SessionUser::from(info).roles.is_empty());
    }

    #[test]
    fn test_backend_user_info_is_camel_case() {
        let info: UserInfo = serde_json::from_value(serde_json::json!({
            "sub": "f3b1",
            "preferredUsername": "ada",
            "realmAccess": { "roles": ["admin"] }
        }))
        .unwrap();

        assert_eq!(info.preferred_username.as_deref(), Some("ada"));
        assert_eq!(info.realm_access.unwrap()["roles"], vec!["admin".to_string()]);
    }
}
