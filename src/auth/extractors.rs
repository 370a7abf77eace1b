use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::warn;

use crate::{
    db::RepoError,
    error::ApiError,
    state::AppState,
    users::repo_types::User,
};

/// Authenticated caller, resolved from the bearer token and loaded from the store.
pub struct AuthUser(pub User);

/// Caller if a valid bearer token was supplied, `None` otherwise.
pub struct MaybeAuthUser(pub Option<User>);

#[derive(Debug)]
enum Credential<'a> {
    Missing,
    Malformed,
    Bearer(&'a str),
}

fn bearer_token(parts: &Parts) -> Credential<'_> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Credential::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Credential::Malformed;
    };
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Credential::Bearer(token.trim())
        }
        _ => Credential::Malformed,
    }
}

/// Verifies `token` and loads its subject; a deleted subject is `Unauthorized`.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let user_id = state.jwt.verify(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        ApiError::Unauthorized("Could not validate credentials".into())
    })?;

    state
        .users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id, "token subject no longer exists");
            ApiError::Unauthorized("Could not validate credentials".into())
        })
}

/// Owner-only mutation rule.
pub fn authorize_owner(requester_id: i64, creator_id: i64) -> Result<(), RepoError> {
    if requester_id == creator_id {
        Ok(())
    } else {
        Err(RepoError::Forbidden)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Credential::Missing => Err(ApiError::Unauthorized("Not authenticated".into())),
            Credential::Malformed => Err(ApiError::Unauthorized("Invalid Authorization header".into())),
            Credential::Bearer(token) => authenticate(state, token).await.map(AuthUser),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Credential::Bearer(token) = bearer_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };
        match authenticate(state, token).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user))),
            Err(ApiError::Unauthorized(_)) => Ok(MaybeAuthUser(None)),
            Err(other) => Err(other),
        }
    }
}
