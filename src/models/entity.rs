use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::Relation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("title cannot be empty")]
    EmptyTitle,
    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),
    #[error("unknown meta key '{0}'")]
    UnknownMetaKey(String),
    #[error("invalid value for '{key}': {reason}")]
    InvalidMeta { key: &'static str, reason: String },
    #[error("meta key '{key}' does not apply to {kind} records")]
    MetaNotApplicable { key: &'static str, kind: EntityKind },
    #[error("{relation} connects {expected_from} to {expected_to}, got {from} to {to}")]
    WrongKinds {
        relation: Relation,
        expected_from: EntityKind,
        expected_to: EntityKind,
        from: EntityKind,
        to: EntityKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Publisher,
    Site,
    Page,
    Zone,
    Advertiser,
    Campaign,
    Ad,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Publisher,
        EntityKind::Site,
        EntityKind::Page,
        EntityKind::Zone,
        EntityKind::Advertiser,
        EntityKind::Campaign,
        EntityKind::Ad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Publisher => "publisher",
            EntityKind::Site => "site",
            EntityKind::Page => "page",
            EntityKind::Zone => "zone",
            EntityKind::Advertiser => "advertiser",
            EntityKind::Campaign => "campaign",
            EntityKind::Ad => "ad",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| ModelError::UnknownKind(s.to_string()))
    }
}

impl TryFrom<String> for EntityKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stored record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Entity {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub kind: EntityKind,
    pub title: String,
    pub created_at: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityWithMeta {
    #[serde(flatten)]
    pub entity: Entity,
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityRequest {
    pub kind: EntityKind,
    pub title: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionRequest {
    pub relation: Relation,
    pub from: i64,
    pub to: i64,
}

/// Metadata keys understood by the ad server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    Url,
    Image,
    Priority,
    Country,
}

impl MetaKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::Url => "url",
            MetaKey::Image => "image",
            MetaKey::Priority => "priority",
            MetaKey::Country => "country",
        }
    }

    pub fn applies_to(&self, kind: EntityKind) -> bool {
        kind == EntityKind::Ad
    }

    /// Parse `key` and normalize `value` for a record of `kind`.
    pub fn validate(kind: EntityKind, key: &str, value: &str) -> Result<(Self, String), ModelError> {
        let meta_key: MetaKey = key.parse()?;
        if !meta_key.applies_to(kind) {
            return Err(ModelError::MetaNotApplicable {
                key: meta_key.as_str(),
                kind,
            });
        }
        let value = meta_key.normalize(value)?;
        Ok((meta_key, value))
    }

    /// Validate and normalize a value before it is written.
    ///
    /// An empty (or whitespace-only) value stays empty and means "delete".
    pub fn normalize(&self, value: &str) -> Result<String, ModelError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(String::new());
        }

        match self {
            MetaKey::Url | MetaKey::Image => Ok(value.to_string()),
            MetaKey::Priority => match value.parse::<i64>() {
                Ok(p) if p >= 0 => Ok(p.to_string()),
                Ok(_) => Err(ModelError::InvalidMeta {
                    key: self.as_str(),
                    reason: "priority cannot be negative".to_string(),
                }),
                Err(_) => Err(ModelError::InvalidMeta {
                    key: self.as_str(),
                    reason: format!("'{value}' is not an integer"),
                }),
            },
            MetaKey::Country => {
                let upper = value.to_ascii_uppercase();
                let is_code = upper.len() == 2 && upper.bytes().all(|b| b.is_ascii_uppercase());
                if upper == "ALL" || is_code {
                    Ok(upper)
                } else {
                    Err(ModelError::InvalidMeta {
                        key: self.as_str(),
                        reason: format!("'{value}' is neither ALL nor a two-letter country code"),
                    })
                }
            }
        }
    }
}

impl FromStr for MetaKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "url" => Ok(MetaKey::Url),
            "image" => Ok(MetaKey::Image),
            "priority" => Ok(MetaKey::Priority),
            "country" => Ok(MetaKey::Country),
            other => Err(ModelError::UnknownMetaKey(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parse_is_case_insensitive() {
        assert_eq!("Zone".parse::<EntityKind>(), Ok(EntityKind::Zone));
        assert_eq!(" ad ".parse::<EntityKind>(), Ok(EntityKind::Ad));
        assert!("banner".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_country_is_normalized_to_uppercase() {
        assert_eq!(MetaKey::Country.normalize("fr").unwrap(), "FR");
        assert_eq!(MetaKey::Country.normalize("all").unwrap(), "ALL");
        assert!(MetaKey::Country.normalize("FRA").is_err());
        assert!(MetaKey::Country.normalize("F1").is_err());
    }

    #[test]
    fn test_priority_validation() {
        assert_eq!(MetaKey::Priority.normalize(" 3 ").unwrap(), "3");
        assert_eq!(MetaKey::Priority.normalize("0").unwrap(), "0");
        assert!(MetaKey::Priority.normalize("-2").is_err());
        assert!(MetaKey::Priority.normalize("high").is_err());
    }

    #[test]
    fn test_validate_rejects_ad_keys_on_zones() {
        assert!(matches!(
            MetaKey::validate(EntityKind::Zone, "url", "https://example.com"),
            Err(ModelError::MetaNotApplicable { .. })
        ));
        assert!(matches!(
            MetaKey::validate(EntityKind::Ad, "colour", "red"),
            Err(ModelError::UnknownMetaKey(_))
        ));
        let (key, value) = MetaKey::validate(EntityKind::Ad, "country", "de").unwrap();
        assert_eq!(key, MetaKey::Country);
        assert_eq!(value, "DE");
    }

    #[test]
    fn test_page_default_flag_is_not_stored() {
        assert!(matches!(
            MetaKey::validate(EntityKind::Page, "default", "1"),
            Err(ModelError::UnknownMetaKey(_))
        ));
    }

    #[test]
    fn test_empty_value_means_delete() {
        assert_eq!(MetaKey::Url.normalize("   ").unwrap(), "");
        assert_eq!(MetaKey::Country.normalize("").unwrap(), "");
    }
}
