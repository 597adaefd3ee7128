use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    model::{NewUser, User, UserChanges},
    repo::{RepoError, RepoResult, UserRepository},
};

/// Process-local store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook for the inactive-account path, which has no endpoint.
    #[cfg(test)]
    pub async fn set_active(&self, id: Uuid, active: bool) {
        if let Some(u) = self.users.write().await.get_mut(&id) {
            u.is_active = active;
        }
    }
}

fn check_unique(
    users: &HashMap<Uuid, User>,
    skip: Option<Uuid>,
    email: Option<&str>,
    username: Option<&str>,
) -> RepoResult<()> {
    for u in users.values().filter(|u| Some(u.id) != skip) {
        if email.is_some_and(|e| e == u.email) {
            return Err(RepoError::Conflict("email"));
        }
        if username.is_some_and(|n| n == u.username) {
            return Err(RepoError::Conflict("username"));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, new: NewUser) -> RepoResult<User> {
        let mut users = self.users.write().await;
        check_unique(&users, None, Some(&new.email), Some(&new.username))?;

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            username: new.username,
            password_hash: new.password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        let mut users = self.users.write().await;
        if !users.contains_key(&id) {
            return Ok(None);
        }
        check_unique(
            &users,
            Some(id),
            changes.email.as_deref(),
            changes.username.as_deref(),
        )?;

        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if changes.is_empty() {
            return Ok(Some(user.clone()));
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
