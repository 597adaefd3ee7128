use axum::{
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    model::{UserResponse, UserUpdate},
    service::UserService,
};
use crate::{
    auth::extractors::{CurrentUser, Users},
    error::ApiError,
    extract::AppJson,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(read_me).put(update_me).delete(delete_me))
}

#[instrument(skip_all)]
pub async fn read_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

#[instrument(skip_all)]
pub async fn update_me(
    CurrentUser(user): CurrentUser,
    Users(repo): Users,
    AppJson(update): AppJson<UserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = UserService::update_user(repo.as_ref(), user.id, update).await?;
    Ok(Json(updated.into()))
}

#[instrument(skip_all)]
pub async fn delete_me(
    CurrentUser(user): CurrentUser,
    Users(repo): Users,
) -> Result<StatusCode, ApiError> {
    UserService::delete_user(repo.as_ref(), user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
