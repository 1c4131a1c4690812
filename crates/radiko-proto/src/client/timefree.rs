use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use reqwest::Url;
use tracing::debug;

use super::auths::HEADER_AUTH_TOKEN;
use super::{AuthClient, Http};
use crate::error::{Error, Result};
use crate::markup::normalize_whitespace;
use crate::parser::format_timestamp;

const PLAYLIST_PATH: &str = "/v2/api/ts/playlist.m3u8";
static STREAM_INF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#EXT-X-STREAM-INF:.*(https.*\.m3u8)").expect("stream inf pattern")
});

/// Catch-up manifests for programs already broadcast.
#[derive(Debug, Clone)]
pub struct TimeFreeClient {
    http: Http,
    auths: AuthClient,
}

impl TimeFreeClient {
    pub(crate) fn new(http: Http, auths: AuthClient) -> Self {
        Self { http, auths }
    }

    /// Runs a fresh auth handshake, then asks for the variant playlist
    /// covering `[start, end)` on `station_id`.
    pub async fn manifest_url(
        &self,
        station_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Url> {
        if station_id.is_empty() {
            return Err(Error::invalid_argument("station id is required"));
        }
        if start >= end {
            return Err(Error::invalid_argument(format!(
                "time range is empty: {} - {}",
                format_timestamp(start),
                format_timestamp(end)
            )));
        }

        let token = self.auths.token().await?;
        let ft = format_timestamp(start);
        let to = format_timestamp(end);
        debug!("timefree {} {}-{}", station_id, ft, to);

        let request = self
            .http
            .post(&self.http.url(PLAYLIST_PATH))
            .header(HEADER_AUTH_TOKEN, token)
            .form(&[("station_id", station_id), ("ft", ft.as_str()), ("to", to.as_str())]);
        let res = self.http.send_ok(request).await?;
        let body = res.text().await?;

        extract_manifest_url(&body)
    }
}

fn extract_manifest_url(body: &str) -> Result<Url> {
    let text = normalize_whitespace(body);
    if text.is_empty() {
        return Err(Error::not_found(format!(
            "time free url not found, res.body: {}",
            body
        )));
    }

    let raw = STREAM_INF
        .captures(&text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            Error::not_found(format!(
                "#EXT-X-STREAM-INF section not found, res.body: {}",
                body
            ))
        })?
        .as_str();

    Url::parse(raw).map_err(|e| Error::parse(format!("invalid manifest url '{}': {}", raw, e)))
}
