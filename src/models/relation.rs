use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{EntityKind, ModelError};

/// Typed, directed connection between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    PublisherToSite,
    SiteToPage,
    PageToZone,
    AdvertiserToCampaign,
    CampaignToAd,
    AdToZone,
    CampaignToZone,
    AdvertiserToZone,
}

impl Relation {
    pub const ALL: [Relation; 8] = [
        Relation::PublisherToSite,
        Relation::SiteToPage,
        Relation::PageToZone,
        Relation::AdvertiserToCampaign,
        Relation::CampaignToAd,
        Relation::AdToZone,
        Relation::CampaignToZone,
        Relation::AdvertiserToZone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::PublisherToSite => "publisher_to_site",
            Relation::SiteToPage => "site_to_page",
            Relation::PageToZone => "page_to_zone",
            Relation::AdvertiserToCampaign => "advertiser_to_campaign",
            Relation::CampaignToAd => "campaign_to_ad",
            Relation::AdToZone => "ad_to_zone",
            Relation::CampaignToZone => "campaign_to_zone",
            Relation::AdvertiserToZone => "advertiser_to_zone",
        }
    }

    /// Kinds at the `from` and `to` ends.
    pub fn endpoints(&self) -> (EntityKind, EntityKind) {
        use EntityKind::*;
        match self {
            Relation::PublisherToSite => (Publisher, Site),
            Relation::SiteToPage => (Site, Page),
            Relation::PageToZone => (Page, Zone),
            Relation::AdvertiserToCampaign => (Advertiser, Campaign),
            Relation::CampaignToAd => (Campaign, Ad),
            Relation::AdToZone => (Ad, Zone),
            Relation::CampaignToZone => (Campaign, Zone),
            Relation::AdvertiserToZone => (Advertiser, Zone),
        }
    }

    pub fn involves(&self, kind: EntityKind) -> bool {
        let (from, to) = self.endpoints();
        from == kind || to == kind
    }

    /// Parent/child relations: a `to` record may have only one `from`.
    pub fn is_single_parent(&self) -> bool {
        !matches!(
            self,
            Relation::AdToZone | Relation::CampaignToZone | Relation::AdvertiserToZone
        )
    }

    pub fn check_kinds(&self, from: EntityKind, to: EntityKind) -> Result<(), ModelError> {
        let (expected_from, expected_to) = self.endpoints();
        if from == expected_from && to == expected_to {
            Ok(())
        } else {
            Err(ModelError::WrongKinds {
                relation: *self,
                expected_from,
                expected_to,
                from,
                to,
            })
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase().replace('-', "_");
        Relation::ALL
            .into_iter()
            .find(|relation| relation.as_str() == lowered)
            .ok_or_else(|| ModelError::UnknownRelation(s.to_string()))
    }
}
