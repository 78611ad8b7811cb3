use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::{self, Health},
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::{
            CreateUserRequest, KeyLoginRequest, PublicUser, SearchQuery, UpdateUserRequest,
            VerifyRequest,
        },
        password::hash_password,
        repo::DEFAULT_SEARCH_LIMIT,
        repo_types::{NewUser, UserPatch, UserStats},
    },
};

const MAX_SEARCH_LIMIT: i64 = 100;

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_\-]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/search", get(search_users))
        .route("/users/stats", get(user_stats))
        .route("/users/by-node/:node_id", get(get_user_by_node))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/verify", post(verify))
        .route("/auth/key", post(key_login))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let health = db::ping(&state.db).await;
    let status = if health.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    payload.username = payload.username.trim().to_string();
    payload.node_id = payload.node_id.trim().to_string();
    let password = payload.password.filter(|p| !p.is_empty());
    let private_key = payload.private_key.filter(|k| !k.is_empty());

    if !is_valid_username(&payload.username) {
        warn!("invalid username");
        return Err(ApiError::BadRequest("Invalid username".into()));
    }
    if payload.node_id.is_empty() {
        return Err(ApiError::BadRequest("Node ID is required".into()));
    }
    if password.is_none() && private_key.is_none() {
        warn!("account without password or private key");
        return Err(ApiError::BadRequest(
            "Either a password or a private key is required".into(),
        ));
    }

    let user = state
        .users
        .create(&NewUser {
            username: payload.username,
            password,
            private_key,
            node_id: payload.node_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<PublicUser>>> {
    let users = state.users.get_all().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<Vec<PublicUser>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let users = state.users.search(params.q.trim(), Some(limit)).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn user_stats(State(state): State<AppState>) -> ApiResult<Json<UserStats>> {
    Ok(Json(state.users.stats().await?))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PublicUser>> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_user_by_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<PublicUser>> {
    let user = state
        .users
        .find_by_node_id(&node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<PublicUser>> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }
    if let Some(username) = payload.username.as_deref().filter(|u| !u.is_empty()) {
        if !is_valid_username(username) {
            return Err(ApiError::BadRequest("Invalid username".into()));
        }
    }

    let password_hash = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(plain) => Some(hash_password(plain)?),
        None => None,
    };
    let patch = UserPatch {
        username: payload.username,
        password_hash,
        private_key: payload.private_key,
        node_id: payload.node_id,
    };

    let user = state
        .users
        .update(id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    info!(user_id = %user.id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.users.delete(id).await? {
        info!(user_id = %id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("User not found".into()))
    }
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> ApiResult<Json<PublicUser>> {
    let Some(user) = state
        .users
        .verify_credentials(&payload.username, &payload.password)
        .await?
    else {
        warn!("invalid credentials");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };

    state.users.update_last_login(user.id).await?;
    let user = state.users.find_by_id(user.id).await?.unwrap_or(user);
    info!(user_id = %user.id, "user logged in");
    Ok(Json(user.into()))
}

#[instrument(skip_all)]
pub async fn key_login(
    State(state): State<AppState>,
    Json(payload): Json<KeyLoginRequest>,
) -> ApiResult<Json<PublicUser>> {
    if payload.private_key.is_empty() {
        return Err(ApiError::BadRequest("Private key is required".into()));
    }
    let Some(user) = state.users.find_by_private_key(&payload.private_key).await? else {
        warn!("unknown private key");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };

    state.users.update_last_login(user.id).await?;
    let user = state.users.find_by_id(user.id).await?.unwrap_or(user);
    info!(user_id = %user.id, "user logged in with key");
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("NetRunner_42"));
        assert!(is_valid_username("GhostInTheShell"));
        assert!(is_valid_username("ab-c"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(33)));
    }

    #[tokio::test]
    async fn create_requires_password_or_key() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(json_request(
                "POST",
                "/api/v1/users",
                r#"{"username":"Alice","node_id":"n1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_invalid_username() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(json_request(
                "POST",
                "/api/v1/users",
                r#"{"username":"a b","password":"p1","node_id":"n1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_requires_node_id() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(json_request(
                "POST",
                "/api/v1/users",
                r#"{"username":"Alice","password":"p1","node_id":"  "}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected_before_storage() {
        let app = build_app(AppState::fake());
        let uri = format!("/api/v1/users/{}", Uuid::new_v4());
        let res = app.oneshot(json_request("PATCH", &uri, "{}")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn key_login_requires_key() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(json_request("POST", "/api/v1/auth/key", r#"{"private_key":""}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
