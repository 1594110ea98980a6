use crate::models::{Entity, EntityKind, ModelError, Relation};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Invalid(#[from] ModelError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Entity store and relationship graph.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    async fn create_entity(&self, kind: EntityKind, title: &str) -> StorageResult<Entity>;

    async fn get_entity(&self, id: i64) -> Result<Option<Entity>>;

    /// List records, newest first, optionally restricted to one kind
    async fn list_entities(
        &self,
        kind: Option<EntityKind>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entity>>;

    /// Delete a record together with its metadata and connections
    async fn delete_entity(&self, id: i64) -> Result<bool>;

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>>;

    async fn meta_map(&self, id: i64) -> Result<BTreeMap<String, String>>;

    /// Insert or replace a metadata value; an empty value deletes the key
    async fn update_meta(&self, id: i64, key: &str, value: &str) -> StorageResult<()>;

    /// Connect two records. Kinds must match the relation's endpoints, and
    /// single-parent relations refuse a second parent.
    async fn connect(&self, relation: Relation, from: i64, to: i64) -> StorageResult<()>;

    async fn disconnect(&self, relation: Relation, from: i64, to: i64) -> Result<bool>;

    /// Ids at the other end of `relation` from `anchor`, in either direction
    async fn connected(&self, relation: Relation, anchor: i64) -> Result<Vec<i64>>;

    async fn increment_clicks(&self, id: i64) -> Result<()>;
}

/// Shared checks run by every backend before a connection is written.
pub(crate) fn check_connection(
    relation: Relation,
    from: Option<&Entity>,
    to: Option<&Entity>,
    from_id: i64,
    to_id: i64,
) -> StorageResult<()> {
    let from = from.ok_or(StorageError::NotFound(from_id))?;
    let to = to.ok_or(StorageError::NotFound(to_id))?;
    relation.check_kinds(from.kind, to.kind)?;
    Ok(())
}

/// Partial unique index giving single-parent relations one `from` per `to`.
pub(crate) fn single_parent_index_sql() -> String {
    let relations = Relation::ALL
        .iter()
        .filter(|relation| relation.is_single_parent())
        .map(|relation| format!("'{}'", relation.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_single_parent \
         ON connections(relation, to_id) WHERE relation IN ({relations})"
    )
}

pub(crate) fn parent_conflict(relation: Relation, to: i64) -> StorageError {
    StorageError::Conflict(format!(
        "record {to} already has a parent through {relation}"
    ))
}

/// Map a unique violation raised while inserting a connection to a conflict.
pub(crate) fn connection_insert_error(
    err: sqlx::Error,
    relation: Relation,
    to: i64,
) -> StorageError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => parent_conflict(relation, to),
        other => other.into(),
    }
}
