use reqwest::Url;
use tracing::debug;

use super::{Http, PremiumClient};
use crate::error::{Error, Result};
use crate::markup::Document;

/// Stations never served area-free, even to premium members.
pub const NHK_STATION_IDS: &[&str] = &[
    "JOIK", "JOHK", "JOAK", "JOCK", "JOBK", "JOFK", "JOZK", "JOLK", "JOAB", "JOAK-FM",
];

/// Stations left out of the radiko catalog.
pub const EXCLUSIVE_STATION_IDS: &[&str] = &["JOAB"];

pub fn is_nhk_station(station_id: &str) -> bool {
    NHK_STATION_IDS.contains(&station_id)
}

/// Station directories and live manifest discovery.
#[derive(Debug, Clone)]
pub struct StationClient {
    http: Http,
    premiums: PremiumClient,
}

impl StationClient {
    pub(crate) fn new(http: Http, premiums: PremiumClient) -> Self {
        Self { http, premiums }
    }

    /// Every area with its stations.
    pub async fn full_list(&self) -> Result<Document> {
        self.fetch(&self.http.url("/v3/station/region/full.xml")).await
    }

    /// Stations receivable from `area_code` (`JP13` …).
    pub async fn list_by_area(&self, area_code: &str) -> Result<Document> {
        if area_code.is_empty() {
            return Err(Error::invalid_argument("area code is required"));
        }
        self.fetch(&self.http.url(&format!("/v3/station/list/{}.xml", area_code)))
            .await
    }

    /// Live HLS manifest for a station.
    ///
    /// Premium members get the area-free entry except on NHK stations.
    pub async fn stream_url(&self, station_id: &str) -> Result<Url> {
        if station_id.is_empty() {
            return Err(Error::invalid_argument("station id is required"));
        }

        let doc = self
            .fetch(&self.http.url(&format!(
                "/v2/station/stream_smh_multi/{}.xml",
                station_id
            )))
            .await?;

        let area_free = if self.premiums.is_logged_in() && !is_nhk_station(station_id) {
            "1"
        } else {
            "0"
        };
        debug!("{}: looking for areafree={}", station_id, area_free);

        let entry = doc
            .elements_by_tag("url")
            .into_iter()
            .find(|el| el.attr("areafree") == area_free)
            .ok_or_else(|| Error::not_found(format!("stationId not found: {}", station_id)))?;

        let raw = entry.text_of("playlist_create_url");
        Url::parse(&raw)
            .map_err(|e| Error::parse(format!("invalid manifest url '{}': {}", raw, e)))
    }

    async fn fetch(&self, url: &str) -> Result<Document> {
        let res = self.http.send_ok(self.http.get(url)).await?;
        let body = res.text().await?;
        Document::parse(&body)
    }
}
