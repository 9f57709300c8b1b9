use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::Settings;
use crate::store::{DurableStore, SqliteStore};

/// Creates the schema and writes first-install defaults. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<bool> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;

    let defaults: Settings = config.defaults.to_settings();
    let store = DurableStore::new(
        std::sync::Arc::new(SqliteStore::from_pool(pool.clone())),
        defaults.clone(),
    );
    let installed = store.initialize(&defaults).await?;

    pool.close().await;
    Ok(installed)
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
