use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{LoginForm, RegisterRequest, TokenResponse},
        extractors::Users,
    },
    error::ApiError,
    extract::{AppForm, AppJson},
    state::AppState,
    users::{model::UserResponse, service::UserService},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip_all)]
pub async fn register(
    Users(repo): Users,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = UserService::register(repo.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    AppForm(form): AppForm<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = UserService::authenticate(state.users.as_ref(), &form.username, &form.password).await?;

    let access_token = state.jwt.sign_access(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: state.jwt.access_ttl().as_secs(),
    }))
}
