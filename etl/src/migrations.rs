use catalog_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{Executor, postgres::PgPoolOptions};
use tracing::info;

use crate::error::EtlResult;

/// Runs the store migrations in the `catalog` schema.
///
/// Creates a short lived pool, makes sure the `catalog` schema exists and applies all pending
/// migrations. The `search_path` is set to `catalog` so that the `_sqlx_migrations` metadata
/// table lives next to the catalog tables instead of in the public schema.
pub async fn apply_store_migrations(connection_config: &PgConnectionConfig) -> EtlResult<()> {
    let options = connection_config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists catalog;").await?;
                conn.execute("set search_path = 'catalog';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!("applying catalog store migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;
    pool.close().await;

    info!("catalog store migrations successfully applied");

    Ok(())
}
