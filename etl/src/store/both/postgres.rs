use catalog_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row as _};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::store::catalog::{CatalogStore, EntityKey};
use crate::store::history::SyncHistoryStore;
use crate::types::{Record, RecordError, SyncResult};

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a lazily connected pool with automatic idle connection cleanup.
///
/// No connection is opened until the first query, so building the store never touches the
/// network.
fn create_database_pool(config: &PgConnectionConfig) -> PgPool {
    let options = config.with_db();

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(config.max_connections)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .connect_lazy_with(options)
}

/// Postgres-backed catalog and sync history store.
///
/// Records are stored as JSONB in `catalog.entities`, keyed by entity name and the encoded
/// [`EntityKey`]. Every tracked run is appended to `catalog.sync_history`. The tables are created
/// by [`crate::migrations::apply_store_migrations`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(config: &PgConnectionConfig) -> Self {
        Self {
            pool: create_database_pool(config),
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CatalogStore for PostgresStore {
    async fn get_existing_entities(
        &self,
        entity: &str,
        key_fields: &[String],
        keys: &[EntityKey],
    ) -> EtlResult<HashMap<EntityKey, Record>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let encoded: Vec<String> = keys.iter().map(EntityKey::encode).collect();
        let rows = sqlx::query(
            r#"
            select entity_key, data
            from catalog.entities
            where entity = $1 and entity_key = any($2)
            "#,
        )
        .bind(entity)
        .bind(&encoded)
        .fetch_all(&self.pool)
        .await?;

        let mut existing = HashMap::with_capacity(rows.len());
        for row in rows {
            let encoded_key: String = row.try_get("entity_key")?;
            let key = EntityKey::decode(&encoded_key)?;
            let Json(record): Json<Record> = row.try_get("data")?;
            existing.insert(key, record);
        }

        debug!(
            entity,
            key_fields = %key_fields.join(","),
            requested = keys.len(),
            found = existing.len(),
            "looked up existing entities"
        );

        Ok(existing)
    }

    async fn create(&self, entity: &str, key: &EntityKey, record: &Record) -> EtlResult<()> {
        sqlx::query(
            r#"
            insert into catalog.entities (entity, entity_key, data)
            values ($1, $2, $3)
            "#,
        )
        .bind(entity)
        .bind(key.encode())
        .bind(Json(record))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, entity: &str, key: &EntityKey, record: &Record) -> EtlResult<()> {
        let result = sqlx::query(
            r#"
            update catalog.entities
            set data = $3, updated_at = now()
            where entity = $1 and entity_key = $2
            "#,
        )
        .bind(entity)
        .bind(key.encode())
        .bind(Json(record))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(etl_error!(
                ErrorKind::PersistenceError,
                "Entity to update does not exist",
                format!("{entity} `{key}`")
            ));
        }

        Ok(())
    }
}

impl SyncHistoryStore for PostgresStore {
    async fn track_sync(&self, entity: &str, result: &SyncResult) -> EtlResult<()> {
        sqlx::query(
            r#"
            insert into catalog.sync_history
                (entity, created, updated, unchanged, error_count, errors, dry_run, aborted)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entity)
        .bind(result.created as i64)
        .bind(result.updated as i64)
        .bind(result.unchanged as i64)
        .bind(result.errors.len() as i64)
        .bind(Json::<&Vec<RecordError>>(&result.errors))
        .bind(result.dry_run)
        .bind(result.aborted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
