use anyhow::Context;
use radiko_proto::config::ProxyConfig;
use reqwest::Url;

/// Routes requests for the streaming host through the local relay; every
/// other host resolves normally.
#[derive(Debug, Clone)]
pub struct ProxySelector {
    streaming_host: String,
    relay: Url,
}

impl ProxySelector {
    pub fn new(streaming_host: impl Into<String>, relay: Url) -> Self {
        Self {
            streaming_host: streaming_host.into(),
            relay,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> anyhow::Result<Self> {
        let relay = Url::parse(&format!("http://{}:{}", config.bind_address, config.port))
            .with_context(|| format!("invalid relay address {}:{}", config.bind_address, config.port))?;
        Ok(Self::new(config.streaming_host.clone(), relay))
    }

    pub fn relay(&self) -> &Url {
        &self.relay
    }

    pub fn select(&self, url: &Url) -> Option<Url> {
        if url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(&self.streaming_host)) {
            Some(self.relay.clone())
        } else {
            None
        }
    }

    /// Rewrite a manifest URL so a player using the relay as its HTTP proxy
    /// sends plain requests the relay can rewrite.  The relay restores https
    /// upstream.
    pub fn via_relay(&self, url: &Url) -> Url {
        let mut url = url.clone();
        if url.scheme() == "https" && self.select(&url).is_some() {
            if url.port() == Some(443) {
                let _ = url.set_port(None);
            }
            let _ = url.set_scheme("http");
        }
        url
    }

    /// Token the player must send itself: `Some` only when `url` is on a
    /// host the relay does not rewrite.
    pub fn direct_token<'a>(&self, url: &Url, token: &'a str) -> Option<&'a str> {
        match self.select(url) {
            Some(_) => None,
            None => Some(token),
        }
    }

    pub fn reqwest_proxy(&self) -> reqwest::Proxy {
        let selector = self.clone();
        reqwest::Proxy::custom(move |url| selector.select(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ProxySelector {
        ProxySelector::from_config(&ProxyConfig::default()).unwrap()
    }

    #[test]
    fn only_streaming_host_goes_through_relay() {
        let selector = selector();
        let stream = Url::parse("https://f-radiko.smartstream.ne.jp/TBS/_definst_/simul-stream.stream/playlist.m3u8").unwrap();
        assert_eq!(
            selector.select(&stream).map(|u| u.to_string()),
            Some("http://127.0.0.1:8991/".to_string())
        );

        let other = Url::parse("https://radiko.jp/v2/api/auth1").unwrap();
        assert!(selector.select(&other).is_none());
    }

    #[test]
    fn relay_urls_downgrade_only_the_streaming_host() {
        let selector = selector();
        let stream = Url::parse("https://f-radiko.smartstream.ne.jp/tf/playlist.m3u8?station_id=TBS").unwrap();
        assert_eq!(
            selector.via_relay(&stream).as_str(),
            "http://f-radiko.smartstream.ne.jp/tf/playlist.m3u8?station_id=TBS"
        );

        let nhk = Url::parse("https://radio-stream.nhk.jp/hls/live/2023229/nhkradiruakr1/master.m3u8").unwrap();
        assert_eq!(selector.via_relay(&nhk), nhk);
    }

    #[test]
    fn catch_up_manifest_outside_the_relay_gets_the_token_directly() {
        let selector = selector();
        let chunklist = Url::parse("https://radiko.jp/v2/api/ts/chunklist/NejwHBcD.m3u8").unwrap();
        assert!(selector.select(&chunklist).is_none());
        assert_eq!(selector.via_relay(&chunklist), chunklist);
        assert_eq!(selector.direct_token(&chunklist, "tok"), Some("tok"));

        let live = Url::parse("https://f-radiko.smartstream.ne.jp/TBS/_definst_/simul-stream.stream/playlist.m3u8").unwrap();
        assert_eq!(selector.direct_token(&live, "tok"), None);
    }

    #[test]
    fn custom_relay_port() {
        let config = ProxyConfig {
            port: 9100,
            ..ProxyConfig::default()
        };
        let selector = ProxySelector::from_config(&config).unwrap();
        assert_eq!(selector.relay().port(), Some(9100));
    }
}
