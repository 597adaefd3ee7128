use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{NewUser, User, UserChanges};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A unique column (`email` or `username`) already holds the value.
    #[error("{0} already taken")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, new: NewUser) -> RepoResult<User>;
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    /// `Ok(None)` when no row has `id`.
    async fn update(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>>;
    /// `Ok(false)` when no row has `id`.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(c) if c.contains("username") => "username",
                _ => "email",
            };
            return RepoError::Conflict(field);
        }
    }
    RepoError::Database(e)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, username, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, username, password_hash, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_active, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, is_active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        if changes.is_empty() {
            return self.find_by_id(id).await;
        }
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   username = COALESCE($3, username),
                   password_hash = COALESCE($4, password_hash),
                   updated_at = now()
             WHERE id = $1
            RETURNING id, email, username, password_hash, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.username)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

// These run against a throwaway database per test; point DATABASE_URL at a
// Postgres server and pass `--ignored` to include them.
#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.into(),
            username: username.into(),
            password_hash: "$argon2id$stub".into(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn create_and_lookup(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let user = repo.create(new_user("a@x.io", "alice")).await.unwrap();
        assert!(user.is_active);
        assert_eq!(user.created_at, user.updated_at);

        let by_id = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(repo.find_by_username("alice").await.unwrap().unwrap().id, user.id);
        assert_eq!(repo.find_by_email("a@x.io").await.unwrap().unwrap().id, user.id);
        assert!(repo.find_by_username("bob").await.unwrap().is_none());
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn unique_violations_name_the_column(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let alice = repo.create(new_user("a@x.io", "alice")).await.unwrap();
        let bob = repo.create(new_user("b@x.io", "bob")).await.unwrap();

        let err = repo.create(new_user("a@x.io", "carol")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict("email")), "{err:?}");
        let err = repo.create(new_user("c@x.io", "alice")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict("username")), "{err:?}");

        let taken_name = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        let err = repo.update(bob.id, taken_name).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict("username")), "{err:?}");

        let taken_email = UserChanges {
            email: Some("b@x.io".into()),
            ..Default::default()
        };
        let err = repo.update(alice.id, taken_email).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict("email")), "{err:?}");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn partial_update_keeps_other_columns(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let user = repo.create(new_user("a@x.io", "alice")).await.unwrap();

        let changes = UserChanges {
            username: Some("alicia".into()),
            ..Default::default()
        };
        let updated = repo.update(user.id, changes).await.unwrap().unwrap();
        assert_eq!(updated.username, "alicia");
        assert_eq!(updated.email, "a@x.io");
        assert_eq!(updated.password_hash, user.password_hash);
        assert_eq!(updated.created_at, user.created_at);
        assert!(updated.updated_at >= user.updated_at);

        // Writing a row's own values back is not a conflict.
        let same = UserChanges {
            email: Some("a@x.io".into()),
            username: Some("alicia".into()),
            ..Default::default()
        };
        assert!(repo.update(user.id, same).await.unwrap().is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn empty_changes_return_the_stored_row(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let user = repo.create(new_user("a@x.io", "alice")).await.unwrap();

        let unchanged = repo.update(user.id, UserChanges::default()).await.unwrap().unwrap();
        assert_eq!(unchanged.updated_at, user.updated_at);
        assert!(repo
            .update(Uuid::new_v4(), UserChanges::default())
            .await
            .unwrap()
            .is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn update_and_delete_missing_user(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let user = repo.create(new_user("a@x.io", "alice")).await.unwrap();

        let changes = UserChanges {
            email: Some("z@x.io".into()),
            ..Default::default()
        };
        assert!(repo.update(Uuid::new_v4(), changes).await.unwrap().is_none());

        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
        assert!(repo.find_by_id(user.id).await.unwrap().is_none());
    }
}
