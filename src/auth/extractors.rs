use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::{
    error::ApiError,
    state::AppState,
    users::{model::User, repo::UserRepository},
};

/// Request-scoped handle to the user store.
pub struct Users(pub Arc<dyn UserRepository>);

#[async_trait]
impl FromRequestParts<AppState> for Users {
    type Rejection = ApiError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Users(Arc::clone(&state.users)))
    }
}

/// The authenticated, active user behind the request's bearer token.
pub struct CurrentUser(pub User);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(ApiError::unauthorized("Invalid authorization header"));
    }
    Ok(token.trim())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let claims = state.jwt.verify(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            ApiError::unauthorized("Could not validate credentials")
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for unknown user");
                ApiError::unauthorized("Could not validate credentials")
            })?;

        if !user.is_active {
            warn!(user_id = %user.id, "token for inactive user");
            return Err(ApiError::unauthorized("Inactive user"));
        }

        Ok(CurrentUser(user))
    }
}
