use crate::models::{Entity, EntityKind, Relation};
use crate::storage::trait_def::{
    check_connection, connection_insert_error, single_parent_index_sql,
};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn is_connected(&self, relation: Relation, from: i64, to: i64) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM connections WHERE relation = ? AND from_id = ? AND to_id = ?",
        )
        .bind(relation.as_str())
        .bind(from)
        .bind(to)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(found.is_some())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                clicks INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entity_meta (
                entity_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY (entity_id, meta_key)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                relation TEXT NOT NULL,
                from_id INTEGER NOT NULL,
                to_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (relation, from_id, to_id)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_connections_to ON connections(relation, to_id)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(&single_parent_index_sql())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn create_entity(&self, kind: EntityKind, title: &str) -> StorageResult<Entity> {
        let created_at = chrono::Utc::now().timestamp();

        let entity = sqlx::query_as::<_, Entity>(
            r#"
            INSERT INTO entities (kind, title, created_at)
            VALUES (?, ?, ?)
            RETURNING id, kind, title, created_at, clicks
            "#,
        )
        .bind(kind.as_str())
        .bind(title)
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(entity)
    }

    async fn get_entity(&self, id: i64) -> Result<Option<Entity>> {
        let entity = sqlx::query_as::<_, Entity>(
            r#"
            SELECT id, kind, title, created_at, clicks
            FROM entities
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(entity)
    }

    async fn list_entities(
        &self,
        kind: Option<EntityKind>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entity>> {
        let entities = match kind {
            Some(kind) => {
                sqlx::query_as::<_, Entity>(
                    r#"
                    SELECT id, kind, title, created_at, clicks
                    FROM entities
                    WHERE kind = ?
                    ORDER BY id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(kind.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query_as::<_, Entity>(
                    r#"
                    SELECT id, kind, title, created_at, clicks
                    FROM entities
                    ORDER BY id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };

        Ok(entities)
    }

    async fn delete_entity(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entity_meta WHERE entity_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM connections WHERE from_id = ? OR to_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT meta_value FROM entity_meta WHERE entity_id = ? AND meta_key = ?",
        )
        .bind(id)
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(value)
    }

    async fn meta_map(&self, id: i64) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT meta_key, meta_value FROM entity_meta WHERE entity_id = ?",
        )
        .bind(id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn update_meta(&self, id: i64, key: &str, value: &str) -> StorageResult<()> {
        if self.get_entity(id).await?.is_none() {
            return Err(StorageError::NotFound(id));
        }

        if value.is_empty() {
            sqlx::query("DELETE FROM entity_meta WHERE entity_id = ? AND meta_key = ?")
                .bind(id)
                .bind(key)
                .execute(self.pool.as_ref())
                .await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO entity_meta (entity_id, meta_key, meta_value)
            VALUES (?, ?, ?)
            ON CONFLICT (entity_id, meta_key) DO UPDATE SET
                meta_value = excluded.meta_value
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn connect(&self, relation: Relation, from: i64, to: i64) -> StorageResult<()> {
        let from_entity = self.get_entity(from).await?;
        let to_entity = self.get_entity(to).await?;
        check_connection(relation, from_entity.as_ref(), to_entity.as_ref(), from, to)?;

        // One statement: the single-parent index decides races between writers
        let inserted = sqlx::query(
            r#"
            INSERT INTO connections (relation, from_id, to_id, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (relation, from_id, to_id) DO NOTHING
            "#,
        )
        .bind(relation.as_str())
        .bind(from)
        .bind(to)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool.as_ref())
        .await;

        if let Err(err) = inserted {
            let err = connection_insert_error(err, relation, to);
            if matches!(err, StorageError::Conflict(_))
                && self.is_connected(relation, from, to).await?
            {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }

    async fn disconnect(&self, relation: Relation, from: i64, to: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM connections WHERE relation = ? AND from_id = ? AND to_id = ?",
        )
        .bind(relation.as_str())
        .bind(from)
        .bind(to)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn connected(&self, relation: Relation, anchor: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT to_id AS id FROM connections WHERE relation = ? AND from_id = ?
            UNION
            SELECT from_id AS id FROM connections WHERE relation = ? AND to_id = ?
            ORDER BY id
            "#,
        )
        .bind(relation.as_str())
        .bind(anchor)
        .bind(relation.as_str())
        .bind(anchor)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(ids)
    }

    async fn increment_clicks(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entities
            SET clicks = clicks + 1
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}
