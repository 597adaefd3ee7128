use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::users::repo::PgUserRepository;

/// Connects the pool and brings the schema up to date before serving.
pub async fn connect_and_migrate(
    database_url: &str,
    max_connections: u32,
) -> anyhow::Result<PgUserRepository> {
    let db = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    tracing::info!("database schema up to date");

    Ok(PgUserRepository::new(db))
}
