//! Record management shared by the management API and the admin CLI

use anyhow::Result;
use std::collections::BTreeMap;

use crate::models::{Entity, EntityKind, EntityWithMeta, MetaKey, ModelError, Relation};
use crate::storage::{Storage, StorageError, StorageResult};

/// Create a record and save its metadata. Every value is validated before
/// anything is written.
pub async fn create_entity(
    storage: &dyn Storage,
    kind: EntityKind,
    title: &str,
    meta: &BTreeMap<String, String>,
) -> StorageResult<EntityWithMeta> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ModelError::EmptyTitle.into());
    }
    let meta = validate_meta(kind, meta)?;

    let entity = storage.create_entity(kind, title).await?;
    for (key, value) in &meta {
        storage.update_meta(entity.id, key.as_str(), value).await?;
    }

    let meta = storage.meta_map(entity.id).await?;
    Ok(EntityWithMeta { entity, meta })
}

/// Save metadata on an existing record; empty values delete their key.
pub async fn update_meta(
    storage: &dyn Storage,
    id: i64,
    meta: &BTreeMap<String, String>,
) -> StorageResult<EntityWithMeta> {
    let entity = storage
        .get_entity(id)
        .await?
        .ok_or(StorageError::NotFound(id))?;
    let meta = validate_meta(entity.kind, meta)?;

    for (key, value) in &meta {
        storage.update_meta(id, key.as_str(), value).await?;
    }

    let meta = storage.meta_map(id).await?;
    Ok(EntityWithMeta { entity, meta })
}

pub async fn load(storage: &dyn Storage, id: i64) -> Result<Option<EntityWithMeta>> {
    let Some(entity) = storage.get_entity(id).await? else {
        return Ok(None);
    };
    let meta = storage.meta_map(id).await?;
    Ok(Some(EntityWithMeta { entity, meta }))
}

/// Records at the other end of `relation` from `anchor`
pub async fn connected_entities(
    storage: &dyn Storage,
    relation: Relation,
    anchor: i64,
) -> Result<Vec<Entity>> {
    let mut entities = Vec::new();
    for id in storage.connected(relation, anchor).await? {
        if let Some(entity) = storage.get_entity(id).await? {
            entities.push(entity);
        }
    }
    Ok(entities)
}

fn validate_meta(
    kind: EntityKind,
    meta: &BTreeMap<String, String>,
) -> Result<Vec<(MetaKey, String)>, ModelError> {
    meta.iter()
        .map(|(key, value)| MetaKey::validate(kind, key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn setup_sqlite() -> SqliteStorage {
        let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_ad_with_meta() {
        let storage = setup_sqlite().await;
        let created = create_entity(
            &storage,
            EntityKind::Ad,
            "  Summer sale ",
            &meta(&[("url", "https://shop.example"), ("country", "fr"), ("priority", "2")]),
        )
        .await
        .unwrap();

        assert_eq!(created.entity.title, "Summer sale");
        assert_eq!(created.meta.get("country").map(String::as_str), Some("FR"));
        assert_eq!(created.meta.get("priority").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_invalid_meta_writes_nothing() {
        let storage = setup_sqlite().await;
        let err = create_entity(
            &storage,
            EntityKind::Ad,
            "Broken",
            &meta(&[("url", "https://shop.example"), ("country", "France")]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::Invalid(ModelError::InvalidMeta { .. })));
        assert!(storage.list_entities(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let storage = setup_sqlite().await;
        let err = create_entity(&storage, EntityKind::Zone, "   ", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Invalid(ModelError::EmptyTitle)));
    }

    #[tokio::test]
    async fn test_update_meta_deletes_empty_values() {
        let storage = setup_sqlite().await;
        let ad = create_entity(
            &storage,
            EntityKind::Ad,
            "Banner",
            &meta(&[("url", "https://a.example"), ("image", "https://cdn.example/a.png")]),
        )
        .await
        .unwrap();

        let updated = update_meta(&storage, ad.entity.id, &meta(&[("image", ""), ("priority", "4")]))
            .await
            .unwrap();
        assert!(updated.meta.get("image").is_none());
        assert_eq!(updated.meta.get("priority").map(String::as_str), Some("4"));
        assert_eq!(updated.meta.get("url").map(String::as_str), Some("https://a.example"));
    }

    #[tokio::test]
    async fn test_update_meta_missing_record() {
        let storage = setup_sqlite().await;
        let err = update_meta(&storage, 77, &meta(&[("url", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(77)));
    }
}
