// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A radio stream entry as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Station {
    pub station_uuid: String,
    pub change_uuid: String,
    pub name: String,
    /// Stream URL
    pub url: String,
    pub homepage: String,
    pub favicon: String,
    pub country: String,
    pub country_code: String,
    pub state: String,
    /// Comma-separated tag list as delivered by the directory
    pub tags: String,
    pub language: String,
    pub click_count: i64,
    pub click_trend: i64,
    pub votes: i64,
    pub bitrate: i64,
    pub codec: String,
    pub last_check_ok: bool,
    pub hls: bool,
    pub last_change_time: Option<String>,
    pub last_click_time: Option<String>,
}

/// Column list shared by every station query, in `Station::from_row` order
pub(crate) const STATION_COLUMNS: &str = "station_uuid, change_uuid, name, url, homepage, favicon, \
     country, countrycode, state, tags, language, clickcount, clicktrend, votes, bitrate, codec, \
     lastcheckok, hls, lastchangetime, lastclicktime";

impl Station {
    pub fn new(station_uuid: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            station_uuid: station_uuid.into(),
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Individual tags, trimmed, empty entries dropped
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            station_uuid: row.get(0)?,
            change_uuid: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            homepage: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            favicon: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            country: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            country_code: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            state: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            tags: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            language: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            click_count: row.get(11)?,
            click_trend: row.get(12)?,
            votes: row.get(13)?,
            bitrate: row.get(14)?,
            codec: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
            last_check_ok: row.get(16)?,
            hls: row.get(17)?,
            last_change_time: row.get(18)?,
            last_click_time: row.get(19)?,
        })
    }
}
