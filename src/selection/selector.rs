use anyhow::Result;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::{image_markup, AdData, TrackingPolicy, WeightedPool, ZoneData};
use crate::geo::GeoLocation;
use crate::models::{Ad, EntityKind, Relation};
use crate::storage::Storage;

/// Priority-weighted draw over eligible ads.
pub fn choose_ad<'a, R: Rng + ?Sized>(candidates: &'a [Ad], rng: &mut R) -> Option<&'a Ad> {
    let pool: WeightedPool<&Ad> = candidates
        .iter()
        .map(|ad| (ad, ad.priority.weight()))
        .collect();
    pool.pick(rng).copied()
}

pub struct AdSelector {
    storage: Arc<dyn Storage>,
    tracking: TrackingPolicy,
}

impl AdSelector {
    pub fn new(storage: Arc<dyn Storage>, tracking: TrackingPolicy) -> Self {
        Self { storage, tracking }
    }

    /// Pick one ad for `zone_id`. `None` when nothing is eligible, including
    /// when the zone does not exist.
    pub async fn select_for_zone(
        &self,
        zone_id: i64,
        viewer: &GeoLocation,
    ) -> Result<Option<AdData>> {
        let candidates = self.eligible_ads(zone_id, viewer).await?;

        let chosen = {
            let mut rng = rand::rng();
            choose_ad(&candidates, &mut rng).cloned()
        };

        debug!(
            zone_id,
            country = viewer.country().unwrap_or("unknown"),
            candidates = candidates.len(),
            chosen = chosen.as_ref().map(|ad| ad.id),
            "selected zone ad"
        );

        Ok(chosen.map(|ad| self.ad_data(&ad)))
    }

    /// Run the selector once for every zone on a page.
    pub async fn select_for_page(
        &self,
        page_id: i64,
        viewer: &GeoLocation,
    ) -> Result<BTreeMap<i64, ZoneData>> {
        let mut page_data = BTreeMap::new();

        if !self.is_kind(page_id, EntityKind::Page).await? {
            return Ok(page_data);
        }

        for zone_id in self.storage.connected(Relation::PageToZone, page_id).await? {
            let ad = self.select_for_zone(zone_id, viewer).await?;
            page_data.insert(zone_id, ZoneData::from(ad));
        }

        Ok(page_data)
    }

    /// Ads reachable from the zone directly, through connected campaigns
    /// and through connected advertisers' campaigns.
    pub async fn candidate_ids(&self, zone_id: i64) -> Result<BTreeSet<i64>> {
        let mut ad_ids = BTreeSet::new();

        if !self.is_kind(zone_id, EntityKind::Zone).await? {
            return Ok(ad_ids);
        }

        ad_ids.extend(self.storage.connected(Relation::AdToZone, zone_id).await?);

        let mut campaign_ids: BTreeSet<i64> = self
            .storage
            .connected(Relation::CampaignToZone, zone_id)
            .await?
            .into_iter()
            .collect();

        for advertiser_id in self
            .storage
            .connected(Relation::AdvertiserToZone, zone_id)
            .await?
        {
            campaign_ids.extend(
                self.storage
                    .connected(Relation::AdvertiserToCampaign, advertiser_id)
                    .await?,
            );
        }

        for campaign_id in campaign_ids {
            ad_ids.extend(
                self.storage
                    .connected(Relation::CampaignToAd, campaign_id)
                    .await?,
            );
        }

        Ok(ad_ids)
    }

    /// Candidate ads whose country restriction lets this viewer see them
    pub async fn eligible_ads(&self, zone_id: i64, viewer: &GeoLocation) -> Result<Vec<Ad>> {
        let mut ads = Vec::new();

        for ad_id in self.candidate_ids(zone_id).await? {
            let Some(entity) = self.storage.get_entity(ad_id).await? else {
                continue;
            };
            if entity.kind != EntityKind::Ad {
                continue;
            }
            let meta = self.storage.meta_map(ad_id).await?;
            let ad = Ad::from_parts(&entity, &meta);
            if ad.is_eligible_for(viewer.country()) {
                ads.push(ad);
            }
        }

        Ok(ads)
    }

    pub fn ad_data(&self, ad: &Ad) -> AdData {
        AdData {
            ad_id: ad.id,
            image_html: ad.image.as_deref().map(|src| image_markup(src, &ad.title)),
            url: ad.url.clone(),
            tracking_url: self.tracking.tracking_url(ad.id, ad.url.as_deref()),
        }
    }

    async fn is_kind(&self, id: i64, kind: EntityKind) -> Result<bool> {
        if id <= 0 {
            return Ok(false);
        }
        Ok(self
            .storage
            .get_entity(id)
            .await?
            .is_some_and(|entity| entity.kind == kind))
    }
}
