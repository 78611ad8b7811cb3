use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::users::{
    error::{UserError, UserResult},
    password::{hash_password, verify_password},
    repo_types::{FieldUpdate, NewUser, User, UserPatch, UserStats, USER_COLUMNS},
};

pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Account storage over an explicit pool handle.
#[derive(Clone)]
pub struct UserRepo {
    db: PgPool,
}

impl UserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> UserResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, private_key, node_id, created_at, last_login
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %id, "error finding user by id");
            e.into()
        })
    }

    /// Exact, case-sensitive match.
    #[instrument(level = "debug", skip(self))]
    pub async fn find_by_username(&self, username: &str) -> UserResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, private_key, node_id, created_at, last_login
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, %username, "error finding user by username");
            e.into()
        })
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn find_by_private_key(&self, private_key: &str) -> UserResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, private_key, node_id, created_at, last_login
            FROM users
            WHERE private_key = $1
            "#,
        )
        .bind(private_key)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "error finding user by private key");
            e.into()
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn find_by_node_id(&self, node_id: &str) -> UserResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, private_key, node_id, created_at, last_login
            FROM users
            WHERE node_id = $1
            "#,
        )
        .bind(node_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, %node_id, "error finding user by node id");
            e.into()
        })
    }

    /// Create an account after checking username and node id are free.
    /// The unique constraints catch a concurrent insert that slips past the
    /// checks, and report it the same way.
    #[instrument(skip(self, new), fields(username = %new.username, node_id = %new.node_id))]
    pub async fn create(&self, new: &NewUser) -> UserResult<User> {
        let existing = self.find_by_username(&new.username).await.map_err(|e| {
            error!(error = %e, "error creating user: username check failed");
            e
        })?;
        if existing.is_some() {
            warn!("username already exists");
            return Err(UserError::DuplicateUsername(new.username.clone()));
        }
        let existing = self.find_by_node_id(&new.node_id).await.map_err(|e| {
            error!(error = %e, "error creating user: node id check failed");
            e
        })?;
        if existing.is_some() {
            warn!("node id already in use");
            return Err(UserError::DuplicateNodeId(new.node_id.clone()));
        }

        // Empty secrets count as not given.
        let password_hash = match new.password.as_deref().filter(|p| !p.is_empty()) {
            Some(plain) => Some(hash_password(plain)?),
            None => None,
        };
        let private_key = new.private_key.as_deref().filter(|k| !k.is_empty());

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, private_key, node_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, private_key, node_id, created_at, last_login
            "#,
        )
        .bind(&new.username)
        .bind(password_hash)
        .bind(private_key)
        .bind(&new.node_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            let err = UserError::from_write(
                e,
                Some(new.username.as_str()),
                Some(new.node_id.as_str()),
            );
            error!(error = %err, "error creating user");
            err
        })?;

        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn update_last_login(&self, id: Uuid) -> UserResult<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %id, "error updating last login");
                UserError::from(e)
            })?;
        Ok(())
    }

    /// All accounts, newest first, secrets redacted.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_all(&self) -> UserResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, private_key, node_id, created_at, last_login
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "error getting all users");
            UserError::from(e)
        })?;
        Ok(rows.into_iter().map(User::redacted).collect())
    }

    /// `None` for an unknown user, a key-only account or a wrong password.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> UserResult<Option<User>> {
        let found = self.find_by_username(username).await.map_err(|e| {
            error!(error = %e, "error verifying credentials: user lookup failed");
            e
        })?;
        let Some(user) = found else {
            return Ok(None);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            debug!(user_id = %user.id, "account has no password");
            return Ok(None);
        };

        // An unreadable stored hash is a failed comparison, not an error.
        match verify_password(password, hash) {
            Ok(matches) => Ok(matches.then_some(user)),
            Err(e) => {
                warn!(error = %e, user_id = %user.id, "stored password hash is unreadable");
                Ok(None)
            }
        }
    }

    /// Apply the supplied fields of `patch`. An empty patch returns `None`
    /// without issuing a statement.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: &UserPatch) -> UserResult<Option<User>> {
        let updates = patch.updates();
        if updates.is_empty() {
            debug!(user_id = %id, "nothing to update");
            return Ok(None);
        }

        let mut query = build_update(id, &updates);
        query
            .build_query_as::<User>()
            .fetch_optional(&self.db)
            .await
            .map_err(|e| {
                let err =
                    UserError::from_write(e, patch.username.as_deref(), patch.node_id.as_deref());
                error!(error = %err, user_id = %id, "error updating user");
                err
            })
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn delete(&self, id: Uuid) -> UserResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %id, "error deleting user");
                UserError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    /// Case-insensitive substring match on username or node id, ordered by
    /// username, secrets redacted. A negative `limit` returns nothing.
    #[instrument(level = "debug", skip(self))]
    pub async fn search(&self, query: &str, limit: Option<i64>) -> UserResult<Vec<User>> {
        let limit = search_limit(limit);
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, private_key, node_id, created_at, last_login
            FROM users
            WHERE username ILIKE $1 OR node_id ILIKE $1
            ORDER BY username ASC
            LIMIT $2
            "#,
        )
        .bind(contains_pattern(query))
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(|e| {
            error!(error = %e, %query, "error searching users");
            UserError::from(e)
        })?;
        Ok(rows.into_iter().map(User::redacted).collect())
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn stats(&self) -> UserResult<UserStats> {
        let (total_users, active_users_last24h, new_users_last7d) = tokio::try_join!(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users").fetch_one(&self.db),
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE last_login > NOW() - INTERVAL '24 hours'"
            )
            .fetch_one(&self.db),
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE created_at > NOW() - INTERVAL '7 days'"
            )
            .fetch_one(&self.db),
        )
        .map_err(|e| {
            error!(error = %e, "error getting user stats");
            UserError::from(e)
        })?;

        Ok(UserStats {
            total_users,
            active_users_last24h,
            new_users_last7d,
        })
    }
}

/// `UPDATE users SET <col> = $n, ... WHERE id = $last RETURNING ...`.
/// Column names and binds are pushed together, so placeholders always line up.
pub(crate) fn build_update<'a>(
    id: Uuid,
    updates: &[FieldUpdate<'a>],
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE users SET ");
    {
        let mut set = qb.separated(", ");
        for update in updates {
            set.push(update.column());
            set.push_unseparated(" = ");
            set.push_bind_unseparated(update.value());
        }
    }
    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.push(" RETURNING ");
    qb.push(USER_COLUMNS);
    qb
}

/// `LIMIT` value for [`UserRepo::search`]; Postgres rejects negatives.
pub(crate) fn search_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(0)
}

/// ILIKE pattern matching `query` literally anywhere in the column.
pub(crate) fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
