use std::sync::Arc;

use crate::{
    auth::jwt::JwtKeys,
    config::AppConfig,
    db,
    rate_limit::RateLimiter,
    users::{memory::MemoryUserRepository, repo::UserRepository},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub jwt: JwtKeys,
    pub limiter: RateLimiter,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let users: Arc<dyn UserRepository> = match &config.database_url {
            Some(url) => Arc::new(db::connect_and_migrate(url, config.database_max_connections).await?),
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(MemoryUserRepository::new())
            }
        };
        Ok(Self::from_parts(users, &config))
    }

    pub fn from_parts(users: Arc<dyn UserRepository>, config: &AppConfig) -> Self {
        Self {
            users,
            jwt: JwtKeys::new(&config.jwt),
            limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
        }
    }

    #[cfg(test)]
    pub fn fake(rate_limit_per_minute: u32) -> (Self, Arc<MemoryUserRepository>) {
        use crate::config::JwtConfig;

        let repo = Arc::new(MemoryUserRepository::new());
        let config = AppConfig {
            database_url: None,
            database_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            rate_limit_per_minute,
            host: [127, 0, 0, 1].into(),
            port: 0,
            log_filter: "authapi=debug".into(),
            log_json: false,
        };
        (Self::from_parts(repo.clone(), &config), repo)
    }
}
