use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use reqwest::Url;
use tracing::{debug, info};

use super::{now_jst, Broadcaster, Catalog};
use crate::client::{is_nhk_station, Client, EXCLUSIVE_STATION_IDS};
use crate::config::RadikoConfig;
use crate::error::Result;
use crate::markup::Document;
use crate::model::{Area, BroadcasterType, Channel, Program};
use crate::parser;

/// Catch-up window, in days before today.
pub const TIMEFREE_DAYS: i64 = 7;

/// Region bucket of a prefecture code: `JP13` → `kanto`.
pub fn region_for_area_code(code: &str) -> Option<&'static str> {
    let n: u32 = code.strip_prefix("JP")?.parse().ok()?;
    let region = match n {
        1..=7 => "hokkaido-tohoku",
        8..=14 => "kanto",
        15..=20 => "hokuriku-koushinetsu",
        21..=24 => "chubu",
        25..=30 => "kinki",
        31..=39 => "chugoku-shikoku",
        40..=47 => "kyushu",
        _ => return None,
    };
    Some(region)
}

/// Where the caller is and which stations it may receive there.
/// Always replaced as a whole.
#[derive(Debug, Clone, Default)]
struct Reception {
    area_code: String,
    allowed: HashSet<String>,
}

/// radiko.jp live and timefree.
#[derive(Debug, Clone)]
pub struct RadikoBroadcaster {
    client: Client,
    catalog: Catalog,
    reception: Reception,
}

impl RadikoBroadcaster {
    pub fn new(config: &RadikoConfig) -> Result<Self> {
        Ok(Self::with_client(Client::new(config)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            catalog: Catalog::default(),
            reception: Reception::default(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolved area code (`JP13` …), empty before the first update.
    pub fn area_code(&self) -> &str {
        &self.reception.area_code
    }

    /// Refresh the area code, the receivable stations and the catalog.
    pub async fn update(&mut self) -> Result<()> {
        self.client.session().clear();

        let area_code = self.client.areas().code().await?;
        let current = self.client.stations().list_by_area(&area_code).await?;
        let allowed: HashSet<String> = current
            .elements_by_tag("stations")
            .into_iter()
            .flat_map(|group| group.elements_by_tag("station"))
            .map(|station| station.text_of("id"))
            .filter(|id| !id.is_empty())
            .collect();
        debug!("{} stations receivable in {}", allowed.len(), area_code);
        self.reception = Reception { area_code, allowed };

        let full = self.client.stations().full_list().await?;
        let (areas, channels) = catalog_from_directory(&full);
        info!("radiko catalog: {} areas, {} channels", areas.len(), channels.len());
        self.catalog.update_areas(areas);
        self.catalog.update_channels(channels);
        Ok(())
    }

    /// Live manifest of a channel.
    pub async fn live_manifest(&self, channel: &Channel) -> Result<Url> {
        self.client.stations().stream_url(channel.code()).await
    }

    /// Catch-up manifest of an already broadcast program.
    pub async fn timefree_manifest(&self, program: &Program) -> Result<Url> {
        self.client
            .time_frees()
            .manifest_url(program.channel_code()?, program.start(), program.finish())
            .await
    }

    fn is_allowed(&self, channel_code: &str) -> bool {
        self.reception.allowed.contains(channel_code)
    }

    pub(crate) fn is_playable_at(&self, program: &Program, now: NaiveDateTime) -> bool {
        if program.is_unaired(now) {
            return false;
        }
        self.is_recordable_at(program, now)
    }

    pub(crate) fn is_recordable_at(&self, program: &Program, now: NaiveDateTime) -> bool {
        let Ok(code) = program.channel_code() else {
            return false;
        };

        if program.is_after_on_air(now) {
            if is_nhk_station(code) {
                return false;
            }
            if program.on_air_date() < now.date() - Duration::days(TIMEFREE_DAYS) {
                return false;
            }
        }

        self.is_allowed(code)
    }
}

fn catalog_from_directory(doc: &Document) -> (Vec<Area>, Vec<Channel>) {
    let mut areas = Vec::new();
    let mut channels = Vec::new();

    for group in doc.elements_by_tag("stations") {
        let area = parser::area(group);
        for station in group.elements_by_tag("station") {
            let channel = parser::channel(station, &area);
            if EXCLUSIVE_STATION_IDS.contains(&channel.code()) {
                continue;
            }
            channels.push(channel);
        }
        areas.push(area);
    }
    (areas, channels)
}

impl Broadcaster for RadikoBroadcaster {
    fn broadcaster_type(&self) -> BroadcasterType {
        BroadcasterType::Radiko
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn init(&mut self) -> Result<()> {
        self.update().await
    }

    fn default_area(&self) -> Option<&Area> {
        let region = region_for_area_code(&self.reception.area_code)?;
        self.catalog.areas().iter().find(|a| a.code() == region)
    }

    async fn programs_for_day(&self, channel: &Channel, date: NaiveDate) -> Result<Vec<Program>> {
        self.client.session().clear();
        let doc = self.client.programs().one_day(channel.code(), date).await?;
        parser::programs(&doc, channel)
    }

    async fn programs_for_two_weeks(&self, channel: &Channel) -> Result<Vec<Program>> {
        self.client.session().clear();
        let doc = self.client.programs().two_weeks(channel.code()).await?;
        parser::programs(&doc, channel)
    }

    fn is_playable_channel(&self, channel: &Channel) -> bool {
        self.is_allowed(channel.code())
    }

    fn is_playable(&self, program: &Program) -> bool {
        self.is_playable_at(program, now_jst())
    }

    fn is_recordable(&self, program: &Program) -> bool {
        self.is_recordable_at(program, now_jst())
    }
}
