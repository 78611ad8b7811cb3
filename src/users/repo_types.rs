use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Marker that replaces secrets in bulk results.
pub const REDACTED: &str = "[REDACTED]";

/// Column list shared by every statement that returns a user row.
pub(crate) const USER_COLUMNS: &str =
    "id, username, password_hash, private_key, node_id, created_at, last_login";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>, // Argon2 PHC string, password accounts only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>, // key-based accounts only
    pub node_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl User {
    /// Replace present secrets with [`REDACTED`]; absent ones stay absent.
    pub fn redacted(mut self) -> Self {
        if self.password_hash.is_some() {
            self.password_hash = Some(REDACTED.to_string());
        }
        if self.private_key.is_some() {
            self.private_key = Some(REDACTED.to_string());
        }
        self
    }
}

/// Input for creating an account. `password` is plaintext and gets hashed
/// before it reaches storage.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub node_id: String,
}

/// Partial update. `None` and empty strings leave the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub private_key: Option<String>,
    pub node_id: Option<String>,
}

/// One column assignment of an UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate<'a> {
    Username(&'a str),
    PasswordHash(&'a str),
    PrivateKey(&'a str),
    NodeId(&'a str),
}

impl<'a> FieldUpdate<'a> {
    pub fn column(&self) -> &'static str {
        match self {
            FieldUpdate::Username(_) => "username",
            FieldUpdate::PasswordHash(_) => "password_hash",
            FieldUpdate::PrivateKey(_) => "private_key",
            FieldUpdate::NodeId(_) => "node_id",
        }
    }

    pub fn value(&self) -> &'a str {
        match *self {
            FieldUpdate::Username(v)
            | FieldUpdate::PasswordHash(v)
            | FieldUpdate::PrivateKey(v)
            | FieldUpdate::NodeId(v) => v,
        }
    }
}

impl UserPatch {
    /// Supplied fields, in column order.
    pub fn updates(&self) -> Vec<FieldUpdate<'_>> {
        fn supplied(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }

        let mut out = Vec::with_capacity(4);
        if let Some(v) = supplied(&self.username) {
            out.push(FieldUpdate::Username(v));
        }
        if let Some(v) = supplied(&self.password_hash) {
            out.push(FieldUpdate::PasswordHash(v));
        }
        if let Some(v) = supplied(&self.private_key) {
            out.push(FieldUpdate::PrivateKey(v));
        }
        if let Some(v) = supplied(&self.node_id) {
            out.push(FieldUpdate::NodeId(v));
        }
        out
    }
}

/// Aggregate account counts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UserStats {
    pub total_users: i64,
    pub active_users_last24h: i64,
    pub new_users_last7d: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "NetRunner_42".into(),
            password_hash: Some("$argon2id$v=19$...".into()),
            private_key: None,
            node_id: "node-42abc1".into(),
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        }
    }

    #[test]
    fn redaction_masks_present_secrets_only() {
        let u = user().redacted();
        assert_eq!(u.password_hash.as_deref(), Some(REDACTED));
        assert!(u.private_key.is_none());

        let keyed = User {
            password_hash: None,
            private_key: Some("ghost-private-key-example".into()),
            ..user()
        }
        .redacted();
        assert!(keyed.password_hash.is_none());
        assert_eq!(keyed.private_key.as_deref(), Some(REDACTED));
    }

    #[test]
    fn redaction_keeps_public_fields() {
        let original = user();
        let redacted = original.clone().redacted();
        assert_eq!(redacted.id, original.id);
        assert_eq!(redacted.username, original.username);
        assert_eq!(redacted.node_id, original.node_id);
        assert_eq!(redacted.created_at, original.created_at);
    }

    #[test]
    fn empty_patch_has_no_updates() {
        assert!(UserPatch::default().updates().is_empty());
        let blank = UserPatch {
            username: Some(String::new()),
            ..Default::default()
        };
        assert!(blank.updates().is_empty());
    }

    #[test]
    fn patch_updates_follow_column_order() {
        let patch = UserPatch {
            node_id: Some("node-9".into()),
            username: Some("X".into()),
            ..Default::default()
        };
        assert_eq!(
            patch.updates(),
            vec![FieldUpdate::Username("X"), FieldUpdate::NodeId("node-9")]
        );
        assert_eq!(patch.updates()[1].column(), "node_id");
        assert_eq!(patch.updates()[1].value(), "node-9");
    }

    #[test]
    fn stats_serialize_field_names() {
        let stats = UserStats {
            total_users: 4,
            active_users_last24h: 1,
            new_users_last7d: 2,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["total_users"], 4);
        assert_eq!(json["active_users_last24h"], 1);
        assert_eq!(json["new_users_last7d"], 2);
    }
}
