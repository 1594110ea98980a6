use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::models::{EntityKind, MetaKey};
use crate::storage::Storage;

/// Where a click on an ad should land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickTarget {
    /// The ad that was clicked, when the id named one
    pub ad_id: Option<i64>,
    pub destination: String,
}

/// Resolves ad clicks to their destination and counts them.
pub struct ClickRedirector {
    storage: Arc<dyn Storage>,
    default_destination: String,
}

impl ClickRedirector {
    pub fn new(storage: Arc<dyn Storage>, default_destination: impl Into<String>) -> Self {
        Self {
            storage,
            default_destination: default_destination.into(),
        }
    }

    pub fn default_destination(&self) -> &str {
        &self.default_destination
    }

    /// The ad's URL, or the default destination when the id does not name
    /// an ad or the ad has no URL.
    pub async fn resolve(&self, ad_id: i64) -> Result<ClickTarget> {
        if ad_id <= 0 {
            return Ok(self.fallback(None));
        }

        let is_ad = self
            .storage
            .get_entity(ad_id)
            .await?
            .is_some_and(|entity| entity.kind == EntityKind::Ad);
        if !is_ad {
            return Ok(self.fallback(None));
        }

        let url = self
            .storage
            .get_meta(ad_id, MetaKey::Url.as_str())
            .await?
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(match url {
            Some(destination) => ClickTarget {
                ad_id: Some(ad_id),
                destination,
            },
            None => self.fallback(Some(ad_id)),
        })
    }

    /// Resolve and count a click. Never fails: storage problems are logged
    /// and the viewer is sent to the default destination.
    pub async fn follow(&self, ad_id: i64) -> ClickTarget {
        let target = match self.resolve(ad_id).await {
            Ok(target) => target,
            Err(err) => {
                error!(ad_id, error = %err, "failed to resolve ad click");
                return self.fallback(None);
            }
        };

        if let Some(id) = target.ad_id {
            if let Err(err) = self.storage.increment_clicks(id).await {
                warn!(ad_id = id, error = %err, "failed to count ad click");
            }
        }

        debug!(ad_id, destination = %target.destination, "redirecting ad click");
        target
    }

    fn fallback(&self, ad_id: Option<i64>) -> ClickTarget {
        ClickTarget {
            ad_id,
            destination: self.default_destination.clone(),
        }
    }
}
