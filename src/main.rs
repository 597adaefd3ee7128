mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod rate_limit;
mod state;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    app::init_tracing(&config);

    let addr = config.listen_addr();
    tracing::info!(
        %addr,
        rate_limit_per_minute = config.rate_limit_per_minute,
        persistent = config.database_url.is_some(),
        "configuration loaded"
    );

    let app_state = AppState::init(config).await?;
    let _sweeper = app_state.limiter.spawn_sweeper();

    app::serve(app::build_app(app_state), addr).await
}
