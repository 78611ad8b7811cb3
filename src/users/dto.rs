use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::User;

/// Request body for account creation.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub node_id: String,
}

/// Request body for partial updates. `password` is plaintext.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub node_id: Option<String>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        [&self.username, &self.password, &self.private_key, &self.node_id]
            .iter()
            .all(|f| f.as_deref().map_or(true, str::is_empty))
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyLoginRequest {
    pub private_key: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

/// Public part of the user returned to the client. Secrets never leave the
/// service, only whether they are set.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub node_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub has_password: bool,
    pub has_private_key: bool,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            node_id: u.node_id,
            created_at: u.created_at,
            last_login: u.last_login,
            has_password: u.password_hash.is_some(),
            has_private_key: u.private_key.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_never_serializes_secrets() {
        let user = User {
            id: Uuid::new_v4(),
            username: "CyberPunk".into(),
            password_hash: Some("$argon2id$secret-hash".into()),
            private_key: Some("secure-private-key-example".into()),
            node_id: "node-3b9c2d".into(),
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("CyberPunk"));
        assert!(json.contains("\"has_private_key\":true"));
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("secure-private-key-example"));
    }

    #[test]
    fn update_request_emptiness_ignores_blank_strings() {
        assert!(UpdateUserRequest::default().is_empty());
        let blank = UpdateUserRequest {
            node_id: Some(String::new()),
            ..Default::default()
        };
        assert!(blank.is_empty());
        let real = UpdateUserRequest {
            password: Some("p2".into()),
            ..Default::default()
        };
        assert!(!real.is_empty());
    }
}
