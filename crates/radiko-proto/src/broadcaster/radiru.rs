use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use reqwest::Url;
use serde::Deserialize;
use tracing::{info, warn};

use super::{now_jst, Broadcaster, Catalog};
use crate::config::RadiruConfig;
use crate::error::{Error, Result};
use crate::markup::{Document, Element};
use crate::model::{Area, BroadcasterType, Channel, Program, ProgramFields};
use crate::parser;

const DEFAULT_AREA: &str = "tokyo";
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Channel code, manifest element and schedule service name of each
/// NHK network.
const SERVICES: &[(&str, &str, &str, &str)] = &[
    ("r1", "NHKラジオ第1", "r1hls", "r1"),
    ("r2", "NHKラジオ第2", "r2hls", "r2"),
    ("fm", "NHK-FM", "fmhls", "r3"),
];

/// NHK らじる★らじる simulcast.
#[derive(Debug, Clone)]
pub struct RadiruBroadcaster {
    http: reqwest::Client,
    config_url: String,
    catalog: Catalog,
    /// Per-area key used by the schedule API, by area code.
    area_keys: Vec<(String, String)>,
    program_day_template: String,
}

impl RadiruBroadcaster {
    pub fn new(config: &RadiruConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            config_url: config.config_url.clone(),
            catalog: Catalog::default(),
            area_keys: Vec::new(),
            program_day_template: String::new(),
        })
    }

    /// Direct HLS manifest; no authentication involved.
    pub fn stream_url(&self, channel: &Channel) -> Result<Url> {
        let raw = channel
            .stream_url()
            .ok_or_else(|| Error::not_found(format!("no stream for {}", channel.id())))?;
        Url::parse(&absolute(raw))
            .map_err(|e| Error::parse(format!("invalid manifest url '{}': {}", raw, e)))
    }

    fn apply_config(&mut self, doc: &Document) {
        let mut areas = Vec::new();
        let mut channels = Vec::new();
        let mut area_keys = Vec::new();

        for data in doc.elements_by_tag("data") {
            let code = data.text_of("area");
            if code.is_empty() {
                continue;
            }
            let area = Area::new(&code, &data.text_of("areajp"), BroadcasterType::Radiru);
            channels.extend(channels_of(data, &area));
            area_keys.push((code, data.text_of("areakey")));
            areas.push(area);
        }

        let template = doc.root().text_of("url_program_day");
        if template.is_empty() {
            warn!("radiru config has no url_program_day");
        } else {
            self.program_day_template = absolute(&template);
        }

        info!("radiru catalog: {} areas, {} channels", areas.len(), channels.len());
        if !area_keys.is_empty() {
            self.area_keys = area_keys;
        }
        self.catalog.update_areas(areas);
        self.catalog.update_channels(channels);
    }

    fn program_day_url(&self, channel: &Channel, date: NaiveDate) -> Result<String> {
        if self.program_day_template.is_empty() {
            return Err(Error::not_found("radiru schedule url is not configured"));
        }
        let area_code = channel
            .area_code()
            .ok_or_else(|| Error::invalid_argument(format!("invalid channel id: {}", channel.id())))?;
        let area_key = self
            .area_keys
            .iter()
            .find(|(code, _)| code == area_code)
            .map(|(_, key)| key.as_str())
            .filter(|key| !key.is_empty())
            .unwrap_or(area_code);
        let service = service_of(channel.code())
            .ok_or_else(|| Error::invalid_argument(format!("unknown radiru channel: {}", channel.code())))?;

        Ok(self
            .program_day_template
            .replace("{area}", area_key)
            .replace("{service}", service)
            .replace("{date}", &date.format("%Y-%m-%d").to_string()))
    }

    pub(crate) fn is_playable_at(&self, program: &Program, now: NaiveDateTime) -> bool {
        program.is_on_air(now)
    }

    pub(crate) fn is_recordable_at(&self, program: &Program, now: NaiveDateTime) -> bool {
        !program.is_after_on_air(now)
    }
}

fn channels_of(data: &Element, area: &Area) -> Vec<Channel> {
    SERVICES
        .iter()
        .filter_map(|(code, name, hls_tag, _)| {
            let url = data.text_of(hls_tag);
            (!url.is_empty()).then(|| Channel::new(code, name, area.id()).with_stream_url(url))
        })
        .collect()
}

fn service_of(channel_code: &str) -> Option<&'static str> {
    SERVICES
        .iter()
        .find(|(code, _, _, _)| *code == channel_code)
        .map(|(_, _, _, service)| *service)
}

/// NHK publishes protocol-relative URLs (`//www.nhk.or.jp/...`).
fn absolute(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct DaySchedule {
    #[serde(default)]
    list: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScheduleEntry {
    id: String,
    start_time: String,
    end_time: String,
    title: String,
    subtitle: String,
    content: String,
    act: String,
    program_url: String,
    program_logo: Option<Logo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Logo {
    url: String,
}

fn parse_schedule(body: &str, channel: &Channel, service: &str) -> Result<Vec<Program>> {
    let schedule: DaySchedule = serde_json::from_str(body)?;
    let Some(entries) = schedule.list.get(service) else {
        return Ok(Vec::new());
    };
    let entries: Vec<ScheduleEntry> = serde_json::from_value(entries.clone())?;

    let mut programs = Vec::new();
    for entry in entries {
        if parser::is_suspended(&entry.title) {
            continue;
        }
        let start = parse_jst(&entry.start_time)?;
        let finish = parse_jst(&entry.end_time)?;
        programs.push(Program::new(
            channel,
            ProgramFields {
                code: format!(
                    "{}-{}-{}",
                    entry.id,
                    parser::format_timestamp(start),
                    parser::format_timestamp(finish)
                ),
                title: entry.title,
                subtitle: parser::subtitle(&entry.subtitle),
                cast: entry.act,
                website: absolute(&entry.program_url),
                thumbnail_url: entry.program_logo.map(|l| absolute(&l.url)).unwrap_or_default(),
                description: parser::strip_html(&entry.content),
                start,
                finish,
                manifest_url: channel.stream_url().map(absolute),
            },
        ));
    }
    Ok(programs)
}

/// `2024-01-01T05:00:00+09:00` as local (JST) wall time.
fn parse_jst(s: &str) -> Result<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.naive_local())
        .map_err(|e| Error::parse(format!("invalid time '{}': {}", s, e)))
}

impl Broadcaster for RadiruBroadcaster {
    fn broadcaster_type(&self) -> BroadcasterType {
        BroadcasterType::Radiru
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn init(&mut self) -> Result<()> {
        let res = self
            .http
            .get(&self.config_url)
            .send()
            .await?
            .error_for_status()?;
        let doc = Document::parse(&res.text().await?)?;
        self.apply_config(&doc);
        Ok(())
    }

    fn default_area(&self) -> Option<&Area> {
        let areas = self.catalog.areas();
        areas
            .iter()
            .find(|a| a.code() == DEFAULT_AREA)
            .or_else(|| areas.first())
    }

    async fn programs_for_day(&self, channel: &Channel, date: NaiveDate) -> Result<Vec<Program>> {
        let url = self.program_day_url(channel, date)?;
        let res = self.http.get(&url).send().await?.error_for_status()?;
        let body = res.text().await?;
        let service = service_of(channel.code()).unwrap_or_default();
        parse_schedule(&body, channel, service)
    }

    async fn programs_for_two_weeks(&self, channel: &Channel) -> Result<Vec<Program>> {
        let today = now_jst().date();
        let mut programs = Vec::new();
        for offset in -7..=6 {
            let date = today + Duration::days(offset);
            programs.extend(self.programs_for_day(channel, date).await?);
        }
        Ok(programs)
    }

    fn is_playable_channel(&self, channel: &Channel) -> bool {
        self.catalog.channel_by_id(channel.id()).is_some()
    }

    fn is_playable(&self, program: &Program) -> bool {
        self.is_playable_at(program, now_jst())
    }

    fn is_recordable(&self, program: &Program) -> bool {
        self.is_recordable_at(program, now_jst())
    }
}
