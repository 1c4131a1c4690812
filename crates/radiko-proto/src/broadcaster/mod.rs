//! Broadcaster catalogs and play/record policy.
//!
//! Each service keeps its own area and channel lists and decides what the
//! caller may play or record right now:
//!
//! ```text
//!   radiko  geo-gated live + 7-day timefree (no NHK catch-up)
//!   radiru  NHK simulcast, live only, every channel everywhere
//! ```

mod radiko;
mod radiru;

pub use radiko::{region_for_area_code, RadikoBroadcaster, TIMEFREE_DAYS};
pub use radiru::RadiruBroadcaster;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::Result;
use crate::model::{Area, BroadcasterType, Channel, Program};

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Wall clock in Japan Standard Time; every schedule is published in JST.
pub fn now_jst() -> NaiveDateTime {
    let now = Utc::now();
    match FixedOffset::east_opt(JST_OFFSET_SECS) {
        Some(jst) => now.with_timezone(&jst).naive_local(),
        None => now.naive_utc(),
    }
}

/// Areas and channels of one broadcaster.
///
/// Updates with an empty list are ignored so a failed or partial refresh
/// never wipes a catalog that was already loaded.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    areas: Vec<Area>,
    channels: Vec<Channel>,
}

impl Catalog {
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn update_areas(&mut self, areas: Vec<Area>) {
        if !areas.is_empty() {
            self.areas = areas;
        }
    }

    pub fn update_channels(&mut self, channels: Vec<Channel>) {
        if !channels.is_empty() {
            self.channels = channels;
        }
    }

    pub fn channels_by_area(&self, area_id: &str) -> Vec<&Channel> {
        self.channels
            .iter()
            .filter(|c| c.area_id() == area_id)
            .collect()
    }

    pub fn area_by_id(&self, area_id: &str) -> Option<&Area> {
        self.areas.iter().find(|a| a.id().eq_ignore_ascii_case(area_id))
    }

    pub fn channel_by_id(&self, channel_id: &str) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.id().eq_ignore_ascii_case(channel_id))
    }

    /// Name of the area a program was broadcast in, or `""`.
    pub fn area_name(&self, program: &Program) -> String {
        program
            .area_id()
            .ok()
            .and_then(|id| self.area_by_id(&id))
            .map(|a| a.name().to_string())
            .unwrap_or_default()
    }
}

/// Operations every broadcaster offers.
#[allow(async_fn_in_trait)]
pub trait Broadcaster {
    fn broadcaster_type(&self) -> BroadcasterType;

    fn catalog(&self) -> &Catalog;

    /// Load the catalog. Must succeed before the policy answers are useful.
    async fn init(&mut self) -> Result<()>;

    fn default_area(&self) -> Option<&Area>;

    async fn programs_for_day(&self, channel: &Channel, date: NaiveDate) -> Result<Vec<Program>>;

    /// Seven days back to six days ahead.
    async fn programs_for_two_weeks(&self, channel: &Channel) -> Result<Vec<Program>>;

    fn is_playable_channel(&self, channel: &Channel) -> bool;

    /// Whether the program can be listened to now (live or catch-up).
    fn is_playable(&self, program: &Program) -> bool;

    /// Whether the program can be captured, now or by reservation.
    fn is_recordable(&self, program: &Program) -> bool;

    fn area_name(&self, program: &Program) -> String {
        self.catalog().area_name(program)
    }
}
