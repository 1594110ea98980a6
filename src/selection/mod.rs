//! Zone ad selection
//!
//! Picks one ad per zone by priority-weighted random choice among the ads
//! eligible for the viewer, and composes what the page needs to show it.

mod pool;
mod selector;

pub use pool::WeightedPool;
pub use selector::{choose_ad, AdSelector};

use serde::{Deserialize, Serialize};

/// How ad links are exposed to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingPolicy {
    /// Link through the click redirector, which counts and forwards
    Redirect { base_url: String },
    /// Link straight to the destination
    Direct,
}

impl TrackingPolicy {
    /// Link for an ad's destination; `None` when there is no destination.
    pub fn tracking_url(&self, ad_id: i64, destination: Option<&str>) -> Option<String> {
        let destination = destination.filter(|url| !url.is_empty())?;
        match self {
            TrackingPolicy::Redirect { base_url } => {
                Some(format!("{}/click?ad_id={}", base_url.trim_end_matches('/'), ad_id))
            }
            TrackingPolicy::Direct => Some(destination.to_string()),
        }
    }
}

/// Display data for the ad selected for a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdData {
    pub ad_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
}

/// A zone's entry in page data; serializes to `{}` when nothing was picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneData {
    #[serde(flatten)]
    pub ad: Option<AdData>,
}

impl ZoneData {
    pub fn is_empty(&self) -> bool {
        self.ad.is_none()
    }
}

impl From<Option<AdData>> for ZoneData {
    fn from(ad: Option<AdData>) -> Self {
        Self { ad }
    }
}

/// Clickable markup for an ad, or an empty string unless both an image and
/// a destination URL are present.
pub fn render_ad_html(ad: Option<&AdData>) -> String {
    let Some(ad) = ad else {
        return String::new();
    };
    match (&ad.image_html, &ad.url) {
        (Some(image_html), Some(url)) => {
            let href = ad.tracking_url.as_ref().unwrap_or(url);
            format!("<a href=\"{}\">{}</a>", escape_html(href), image_html)
        }
        _ => String::new(),
    }
}

pub(crate) fn image_markup(src: &str, alt: &str) -> String {
    format!(
        "<img src=\"{}\" alt=\"{}\" class=\"ad-server-image\" />",
        escape_html(src),
        escape_html(alt)
    )
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(image: bool, url: bool) -> AdData {
        AdData {
            ad_id: 5,
            image_html: image.then(|| image_markup("https://cdn.example/a.png", "A")),
            url: url.then(|| "https://example.com".to_string()),
            tracking_url: url.then(|| "http://localhost:3000/click?ad_id=5".to_string()),
        }
    }

    #[test]
    fn test_tracking_url_policies() {
        let redirect = TrackingPolicy::Redirect {
            base_url: "https://ads.example/".to_string(),
        };
        assert_eq!(
            redirect.tracking_url(9, Some("https://dest.example")).as_deref(),
            Some("https://ads.example/click?ad_id=9")
        );
        assert_eq!(
            TrackingPolicy::Direct
                .tracking_url(9, Some("https://dest.example"))
                .as_deref(),
            Some("https://dest.example")
        );
        assert_eq!(TrackingPolicy::Direct.tracking_url(9, None), None);
        assert_eq!(redirect.tracking_url(9, None), None);
        assert_eq!(redirect.tracking_url(9, Some("")), None);
    }

    #[test]
    fn test_render_requires_image_and_link() {
        assert_eq!(render_ad_html(None), "");
        assert_eq!(render_ad_html(Some(&ad(true, false))), "");
        assert_eq!(render_ad_html(Some(&ad(false, true))), "");

        // A tracking link alone does not make an ad clickable
        let mut tracked_only = ad(true, false);
        tracked_only.tracking_url = Some("http://localhost:3000/click?ad_id=5".to_string());
        assert_eq!(render_ad_html(Some(&tracked_only)), "");

        let html = render_ad_html(Some(&ad(true, true)));
        assert!(html.starts_with("<a href=\"http://localhost:3000/click?ad_id=5\">"));
        assert!(html.contains("<img src=\"https://cdn.example/a.png\""));
    }

    #[test]
    fn test_empty_zone_data_serializes_as_empty_object() {
        let json = serde_json::to_value(ZoneData::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let json = serde_json::to_value(ZoneData::from(Some(ad(false, true)))).unwrap();
        assert_eq!(json["ad_id"], 5);
        assert!(json.get("image_html").is_none());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"a"b<c>&'d"#),
            "a&quot;b&lt;c&gt;&amp;&#39;d"
        );
    }
}
