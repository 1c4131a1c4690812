//! Areas, channels and programs.
//!
//! Identity is always a `:`-joined string so objects can reference each
//! other by id instead of by pointer:
//!
//! ```text
//!   Area     kanto:radiko
//!   Channel  TBS:kanto:radiko
//!   Program  <prog-id>-<ft>-<to>:TBS:kanto:radiko
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hour at which the broadcast day rolls over.
const BROADCAST_DAY_START_HOUR: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcasterType {
    Radiko,
    Radiru,
}

impl BroadcasterType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Radiko => "radiko",
            Self::Radiru => "radiru",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Radiko => "radiko.jp",
            Self::Radiru => "らじる★らじる",
        }
    }
}

impl fmt::Display for BroadcasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BroadcasterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "radiko" => Ok(Self::Radiko),
            "radiru" => Ok(Self::Radiru),
            other => Err(Error::parse(format!("unknown broadcaster type: {}", other))),
        }
    }
}

/// A geographic broadcast region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    id: String,
    code: String,
    name: String,
    broadcaster_type: BroadcasterType,
}

impl Area {
    pub fn new(code: &str, name: &str, broadcaster_type: BroadcasterType) -> Self {
        Self {
            id: format!("{}:{}", code, broadcaster_type.code()),
            code: code.to_string(),
            name: name.to_string(),
            broadcaster_type,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broadcaster_type(&self) -> BroadcasterType {
        self.broadcaster_type
    }

    /// `"kanto:radiko"` → `"kanto"`.
    pub fn code_from_id(id: &str) -> Option<&str> {
        match split_exact::<2>(id) {
            Some([code, _]) => Some(code),
            None => None,
        }
    }

    pub fn broadcaster_type_from_id(id: &str) -> Option<BroadcasterType> {
        split_exact::<2>(id).and_then(|[_, ty]| ty.parse().ok())
    }
}

/// A single station within an area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    id: String,
    code: String,
    name: String,
    area_id: String,
    /// Direct manifest URL for broadcasters that publish one (radiru).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stream_url: Option<String>,
}

impl Channel {
    pub fn new(code: &str, name: &str, area_id: &str) -> Self {
        Self {
            id: format!("{}:{}", code, area_id),
            code: code.to_string(),
            name: name.to_string(),
            area_id: area_id.to_string(),
            stream_url: None,
        }
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn area_id(&self) -> &str {
        &self.area_id
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }

    pub fn area_code(&self) -> Option<&str> {
        Area::code_from_id(&self.area_id)
    }

    pub fn broadcaster_type(&self) -> Option<BroadcasterType> {
        Area::broadcaster_type_from_id(&self.area_id)
    }

    /// `"TBS:kanto:radiko"` → `"TBS"`.
    pub fn code_from_id(id: &str) -> Option<&str> {
        split_exact::<3>(id).map(|[code, _, _]| code)
    }

    /// `"TBS:kanto:radiko"` → `"kanto:radiko"`.
    pub fn area_id_from_id(id: &str) -> Option<String> {
        split_exact::<3>(id).map(|[_, area, ty]| format!("{}:{}", area, ty))
    }
}

/// Fields a parser hands to [`Program::new`].
#[derive(Debug, Clone, Default)]
pub struct ProgramFields {
    pub code: String,
    pub title: String,
    pub subtitle: String,
    pub cast: String,
    pub website: String,
    pub thumbnail_url: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub finish: NaiveDateTime,
    pub manifest_url: Option<String>,
}

/// A scheduled broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    id: String,
    code: String,
    channel_id: String,
    channel_name: String,
    title: String,
    subtitle: String,
    cast: String,
    website: String,
    thumbnail_url: String,
    description: String,
    start: NaiveDateTime,
    finish: NaiveDateTime,
    manifest_url: Option<String>,
    #[serde(default)]
    playing: bool,
}

impl Program {
    pub fn new(channel: &Channel, fields: ProgramFields) -> Self {
        Self {
            id: format!("{}:{}", fields.code, channel.id()),
            code: fields.code,
            channel_id: channel.id().to_string(),
            channel_name: channel.name().to_string(),
            title: fields.title,
            subtitle: fields.subtitle,
            cast: fields.cast,
            website: fields.website,
            thumbnail_url: fields.thumbnail_url,
            description: fields.description,
            start: fields.start,
            finish: fields.finish,
            manifest_url: fields.manifest_url,
            playing: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn cast(&self) -> &str {
        &self.cast
    }

    pub fn website(&self) -> &str {
        &self.website
    }

    pub fn thumbnail_url(&self) -> &str {
        &self.thumbnail_url
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn finish(&self) -> NaiveDateTime {
        self.finish
    }

    pub fn manifest_url(&self) -> Option<&str> {
        self.manifest_url.as_deref()
    }

    pub fn set_manifest_url(&mut self, url: impl Into<String>) {
        self.manifest_url = Some(url.into());
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    fn channel_id_parts(&self) -> Result<[&str; 3]> {
        if self.channel_id.is_empty() {
            return Err(Error::invalid_argument("channel id is empty"));
        }
        split_exact::<3>(&self.channel_id)
            .ok_or_else(|| Error::invalid_argument(format!("invalid channel id: {}", self.channel_id)))
    }

    pub fn channel_code(&self) -> Result<&str> {
        self.channel_id_parts().map(|[code, _, _]| code)
    }

    pub fn area_code(&self) -> Result<&str> {
        self.channel_id_parts().map(|[_, area, _]| area)
    }

    pub fn area_id(&self) -> Result<String> {
        self.channel_id_parts()
            .map(|[_, area, ty]| format!("{}:{}", area, ty))
    }

    pub fn broadcaster_type(&self) -> Result<BroadcasterType> {
        self.channel_id_parts()?[2].parse()
    }

    /// Broadcast day: anything before 05:00 belongs to the previous date.
    pub fn on_air_date(&self) -> NaiveDate {
        let date = self.start.date();
        if self.start.hour() < BROADCAST_DAY_START_HOUR {
            date - Duration::days(1)
        } else {
            date
        }
    }

    pub fn on_air_date_string(&self) -> String {
        self.on_air_date().format("%Y/%m/%d").to_string()
    }

    pub fn is_unaired(&self, now: NaiveDateTime) -> bool {
        now < self.start
    }

    pub fn is_on_air(&self, now: NaiveDateTime) -> bool {
        now > self.start && now < self.finish
    }

    pub fn is_after_on_air(&self, now: NaiveDateTime) -> bool {
        now > self.finish
    }

    /// `"05:00"` … `"28:59"` start time.
    pub fn start_time_string(&self) -> String {
        extended_clock(self.start)
    }

    pub fn finish_time_string(&self) -> String {
        extended_clock(self.finish)
    }
}

fn extended_clock(t: NaiveDateTime) -> String {
    let mut hour = t.hour();
    if hour < BROADCAST_DAY_START_HOUR {
        hour += 24;
    }
    format!("{:02}:{:02}", hour, t.minute())
}

fn split_exact<const N: usize>(id: &str) -> Option<[&str; N]> {
    if id.is_empty() {
        return None;
    }
    let parts: Vec<&str> = id.split(':').collect();
    parts.try_into().ok()
}
