use thiserror::Error;

pub type UserResult<T> = Result<T, UserError>;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    #[error("Node ID already in use: {0}")]
    DuplicateNodeId(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

const USERNAME_CONSTRAINT: &str = "users_username_key";
const NODE_ID_CONSTRAINT: &str = "users_node_id_key";

impl UserError {
    /// Translate a unique violation on `users` into the matching duplicate
    /// error; anything else stays a storage failure.
    pub(crate) fn from_write(e: sqlx::Error, username: Option<&str>, node_id: Option<&str>) -> Self {
        let constraint = match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                db.constraint().map(str::to_owned)
            }
            _ => None,
        };
        match constraint.as_deref() {
            Some(USERNAME_CONSTRAINT) => {
                UserError::DuplicateUsername(username.unwrap_or_default().to_owned())
            }
            Some(NODE_ID_CONSTRAINT) => {
                UserError::DuplicateNodeId(node_id.unwrap_or_default().to_owned())
            }
            _ => UserError::Storage(e),
        }
    }
}
