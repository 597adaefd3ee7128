use tracing::{info, warn};
use uuid::Uuid;

use super::{
    model::{
        normalize_email, validate_email, validate_password, validate_username, NewUser, User,
        UserChanges, UserUpdate,
    },
    repo::{RepoError, UserRepository},
};
use crate::{
    auth::{
        dto::RegisterRequest,
        password::{hash_password_blocking, verify_password_blocking},
    },
    error::ApiError,
};

pub struct UserService;

impl UserService {
    pub async fn register(repo: &dyn UserRepository, req: RegisterRequest) -> Result<User, ApiError> {
        let email = normalize_email(&req.email);
        let username = req.username.trim().to_string();
        validate_email(&email)?;
        validate_username(&username)?;
        validate_password(&req.password)?;

        if repo.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(RepoError::Conflict("email").into());
        }
        if repo.find_by_username(&username).await?.is_some() {
            warn!(username = %username, "username already registered");
            return Err(RepoError::Conflict("username").into());
        }

        let password_hash = hash_password_blocking(req.password).await?;
        // The unique constraints still catch a concurrent registration.
        let user = repo
            .create(NewUser {
                email,
                username,
                password_hash,
            })
            .await?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Unknown user, wrong password and inactive account are all Unauthorized.
    pub async fn authenticate(
        repo: &dyn UserRepository,
        username: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let user = repo.find_by_username(username.trim()).await?;
        let ok = verify_password_blocking(
            password.to_string(),
            user.as_ref().map(|u| u.password_hash.clone()),
        )
        .await?;

        match user {
            Some(u) if ok && u.is_active => Ok(u),
            Some(u) if ok => {
                warn!(user_id = %u.id, "login for inactive user");
                Err(ApiError::unauthorized("Inactive user"))
            }
            _ => {
                warn!(username = %username, "login with invalid credentials");
                Err(ApiError::unauthorized("Incorrect username or password"))
            }
        }
    }

    pub async fn update_user(
        repo: &dyn UserRepository,
        id: Uuid,
        update: UserUpdate,
    ) -> Result<User, ApiError> {
        let mut changes = UserChanges::default();
        if let Some(email) = update.email {
            let email = normalize_email(&email);
            validate_email(&email)?;
            changes.email = Some(email);
        }
        if let Some(username) = update.username {
            let username = username.trim().to_string();
            validate_username(&username)?;
            changes.username = Some(username);
        }
        if let Some(password) = update.password {
            validate_password(&password)?;
            changes.password_hash = Some(hash_password_blocking(password).await?);
        }

        let user = repo
            .update(id, changes)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        info!(user_id = %user.id, "user updated");
        Ok(user)
    }

    pub async fn delete_user(repo: &dyn UserRepository, id: Uuid) -> Result<(), ApiError> {
        if !repo.delete(id).await? {
            return Err(ApiError::not_found("User not found"));
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }
}
