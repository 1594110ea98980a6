use serde::Serialize;
use std::collections::BTreeMap;

use super::{Entity, MetaKey};

/// Relative selection weight of an ad. Never below one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Priority(u32);

impl Priority {
    pub fn new(weight: u32) -> Self {
        Self(weight.max(1))
    }

    /// Anything missing, non-numeric or non-positive counts as weight 1.
    pub fn parse(raw: Option<&str>) -> Self {
        let weight = raw
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|p| *p > 0)
            .map(|p| u32::try_from(p).unwrap_or(u32::MAX))
            .unwrap_or(1);
        Self::new(weight)
    }

    pub fn weight(&self) -> u32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountryRestriction {
    /// Shown to every viewer, including those with an unknown country.
    All,
    /// Shown only to viewers resolved to this ISO 3166-1 alpha-2 code.
    Only(String),
    /// No restriction saved; matches nothing.
    Unset,
}

impl CountryRestriction {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => CountryRestriction::Unset,
            Some(s) if s.eq_ignore_ascii_case("ALL") => CountryRestriction::All,
            Some(s) => CountryRestriction::Only(s.to_ascii_uppercase()),
        }
    }

    pub fn allows(&self, viewer_country: Option<&str>) -> bool {
        match self {
            CountryRestriction::All => true,
            CountryRestriction::Only(code) => {
                viewer_country.is_some_and(|c| c.eq_ignore_ascii_case(code))
            }
            CountryRestriction::Unset => false,
        }
    }
}

/// An ad record with its metadata decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ad {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    pub image: Option<String>,
    pub priority: Priority,
    pub country: CountryRestriction,
}

impl Ad {
    pub fn from_parts(entity: &Entity, meta: &BTreeMap<String, String>) -> Self {
        let get = |key: MetaKey| {
            meta.get(key.as_str())
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        Self {
            id: entity.id,
            title: entity.title.clone(),
            url: get(MetaKey::Url).map(str::to_string),
            image: get(MetaKey::Image).map(str::to_string),
            priority: Priority::parse(get(MetaKey::Priority)),
            country: CountryRestriction::parse(get(MetaKey::Country)),
        }
    }

    pub fn is_eligible_for(&self, viewer_country: Option<&str>) -> bool {
        self.country.allows(viewer_country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    fn entity(id: i64) -> Entity {
        Entity {
            id,
            kind: EntityKind::Ad,
            title: format!("Ad {id}"),
            created_at: 0,
            clicks: 0,
        }
    }

    #[test]
    fn test_priority_defaults_to_one() {
        assert_eq!(Priority::parse(None).weight(), 1);
        assert_eq!(Priority::parse(Some("0")).weight(), 1);
        assert_eq!(Priority::parse(Some("-4")).weight(), 1);
        assert_eq!(Priority::parse(Some("abc")).weight(), 1);
        assert_eq!(Priority::parse(Some("5")).weight(), 5);
    }

    #[test]
    fn test_all_countries_matches_unknown_viewer() {
        let all = CountryRestriction::parse(Some("ALL"));
        assert!(all.allows(None));
        assert!(all.allows(Some("DE")));
    }

    #[test]
    fn test_single_country_excludes_others() {
        let fr = CountryRestriction::parse(Some("fr"));
        assert!(fr.allows(Some("FR")));
        assert!(!fr.allows(Some("DE")));
        assert!(!fr.allows(None));
    }

    #[test]
    fn test_unset_country_matches_nothing() {
        let unset = CountryRestriction::parse(Some("  "));
        assert_eq!(unset, CountryRestriction::Unset);
        assert!(!unset.allows(None));
        assert!(!unset.allows(Some("US")));
    }

    #[test]
    fn test_from_parts_drops_blank_values() {
        let mut meta = BTreeMap::new();
        meta.insert("url".to_string(), "https://example.com".to_string());
        meta.insert("image".to_string(), "".to_string());
        meta.insert("priority".to_string(), "3".to_string());
        meta.insert("country".to_string(), "ALL".to_string());

        let ad = Ad::from_parts(&entity(7), &meta);
        assert_eq!(ad.id, 7);
        assert_eq!(ad.url.as_deref(), Some("https://example.com"));
        assert_eq!(ad.image, None);
        assert_eq!(ad.priority.weight(), 3);
        assert_eq!(ad.country, CountryRestriction::All);
    }
}
