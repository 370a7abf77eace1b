use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{
    dto::{LoginRequest, LogoutResponse, PublicUser, RegisterRequest, TokenResponse, UsersQuery},
    repo_types::NewUser,
};
use crate::{
    auth::{
        extractors::{AuthUser, MaybeAuthUser},
        password::{hash_password_blocking, verify_password_blocking},
    },
    db::RepoError,
    error::{ApiError, ApiResult},
    pagination::MAX_PAGE_SIZE,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/me", get(get_me))
        .route("/users/:id", get(get_user))
        .route("/users", get(list_users))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".into())
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    let Json(mut payload) = body?;
    payload.normalize();
    if let Err(e) = payload.validate() {
        warn!("registration rejected by validation");
        return Err(e.into());
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let user = state
        .users
        .create(NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
        })
        .await
        .map_err(|e| {
            if let RepoError::Conflict(reason) = &e {
                warn!(%reason, "registration conflict");
            }
            e
        })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(payload) = body?;
    payload.validate()?;

    let login = payload.username_or_email.trim();
    let Some(user) = state.users.find_by_login(login).await? else {
        warn!("login for unknown user");
        return Err(invalid_credentials());
    };

    let ok = verify_password_blocking(payload.password, user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = user.id, "login with invalid password");
        return Err(invalid_credentials());
    }

    let access_token = state.jwt.issue(user.id)?;
    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(TokenResponse::bearer(access_token, state.jwt.ttl_secs())))
}

/// Stateless: the token stays valid until it expires.
#[instrument(skip_all)]
pub async fn logout(MaybeAuthUser(user): MaybeAuthUser) -> Json<LogoutResponse> {
    match user {
        Some(u) => info!(user_id = u.id, username = %u.username, "user logged out"),
        None => info!("anonymous logout"),
    }
    Json(LogoutResponse {
        message: "Logged out".into(),
        detail: "Discard the access token on the client".into(),
    })
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<PublicUser>> {
    let Path(id) = path?;
    let user = state
        .users
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    query: Result<Query<UsersQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<PublicUser>>> {
    let Query(q) = query?;
    let skip = q.skip.unwrap_or(0);
    if skip < 0 {
        return Err(ApiError::invalid("skip", "skip must not be negative"));
    }
    let limit = q.limit.unwrap_or(MAX_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::invalid(
            "limit",
            format!("limit must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }

    let users = state.users.list(skip, limit).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}
