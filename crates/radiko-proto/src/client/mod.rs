//! radiko protocol client.
//!
//! ```text
//!   Client
//!     ├── areas      area code probe (cached)
//!     ├── auths      auth1 → partial key → auth2
//!     ├── premiums   premium login state
//!     ├── stations   directories + live manifest
//!     ├── programs   day / weekly schedules
//!     └── time_frees catch-up manifest (uses auths)
//! ```
//!
//! Every component shares one [`SessionStore`], so callers must run the
//! network calls of one logical session one at a time.

mod areas;
mod auths;
mod premiums;
mod programs;
mod stations;
mod timefree;

pub use areas::AreaClient;
pub use auths::AuthClient;
pub use premiums::{PremiumClient, PremiumStatus};
pub use programs::ProgramClient;
pub use stations::{is_nhk_station, StationClient, EXCLUSIVE_STATION_IDS, NHK_STATION_IDS};
pub use timefree::TimeFreeClient;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use tracing::debug;

use crate::config::RadikoConfig;
use crate::error::Result;
use crate::session::SessionStore;

/// Shared transport: one reqwest client, one cookie session, one config.
#[derive(Debug, Clone)]
pub(crate) struct Http {
    client: reqwest::Client,
    session: SessionStore,
    config: Arc<RadikoConfig>,
}

impl Http {
    pub(crate) fn new(config: RadikoConfig, session: SessionStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            session,
            config: Arc::new(config),
        })
    }

    pub(crate) fn config(&self) -> &RadikoConfig {
        &self.config
    }

    pub(crate) fn session(&self) -> &SessionStore {
        &self.session
    }

    pub(crate) fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.session.attach_to(self.client.get(url))
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.session.attach_to(self.client.post(url))
    }

    /// Send and absorb any cookies the response sets.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        debug!("{} {}", response.status(), response.url());
        self.session.absorb(&response);
        Ok(response)
    }

    /// Like [`send`](Self::send) but non-2xx answers become transport errors.
    pub(crate) async fn send_ok(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.send(request).await?;
        Ok(response.error_for_status()?)
    }
}

/// Builds and owns every client component around one shared session.
#[derive(Debug, Clone)]
pub struct Client {
    session: SessionStore,
    areas: AreaClient,
    auths: AuthClient,
    premiums: PremiumClient,
    stations: StationClient,
    programs: ProgramClient,
    time_frees: TimeFreeClient,
}

impl Client {
    pub fn new(config: &RadikoConfig) -> Result<Self> {
        let session = SessionStore::new();
        let http = Http::new(config.clone(), session.clone())?;

        let areas = AreaClient::new(http.clone());
        let auths = AuthClient::new(http.clone());
        let premiums = PremiumClient::new(http.clone());
        let stations = StationClient::new(http.clone(), premiums.clone());
        let programs = ProgramClient::new(http.clone());
        let time_frees = TimeFreeClient::new(http, auths.clone());

        Ok(Self {
            session,
            areas,
            auths,
            premiums,
            stations,
            programs,
            time_frees,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn areas(&self) -> &AreaClient {
        &self.areas
    }

    pub fn auths(&self) -> &AuthClient {
        &self.auths
    }

    pub fn premiums(&self) -> &PremiumClient {
        &self.premiums
    }

    pub fn stations(&self) -> &StationClient {
        &self.stations
    }

    pub fn programs(&self) -> &ProgramClient {
        &self.programs
    }

    pub fn time_frees(&self) -> &TimeFreeClient {
        &self.time_frees
    }
}

#[cfg(test)]
pub(crate) fn test_http(server: &mockito::Server) -> Http {
    Http::new(RadikoConfig::with_origin(&server.url()), SessionStore::new())
        .expect("test http client")
}
