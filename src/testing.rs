// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory stand-in for the radio directory API

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::http::{HttpClient, HttpResponse};
use crate::sync::StopSignal;

pub(crate) struct MockDirectory {
    total: usize,
    listed: usize,
    name_prefix: String,
    stats_body: Option<String>,
    unreachable: HashSet<String>,
    /// Page offset -> remaining failures (`u32::MAX` fails forever)
    failing_pages: Mutex<HashMap<usize, u32>>,
    stop_after_pages: Option<(usize, StopSignal)>,
    /// Page offset -> offset whose stations are served instead
    duplicate_pages: HashMap<usize, usize>,
    malformed: HashSet<usize>,
    requests: Mutex<Vec<String>>,
}

impl MockDirectory {
    /// A directory serving `total` stations named `station-{i}`
    pub(crate) fn with_stations(total: usize) -> Self {
        Self {
            total,
            listed: total,
            name_prefix: "Station".to_string(),
            stats_body: None,
            unreachable: HashSet::new(),
            failing_pages: Mutex::new(HashMap::new()),
            stop_after_pages: None,
            duplicate_pages: HashMap::new(),
            malformed: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve only the first `count` stations while still reporting the total
    pub(crate) fn listing(mut self, count: usize) -> Self {
        self.listed = count;
        self
    }

    pub(crate) fn named(mut self, prefix: &str) -> Self {
        self.name_prefix = prefix.to_string();
        self
    }

    pub(crate) fn stats_body(mut self, body: &str) -> Self {
        self.stats_body = Some(body.to_string());
        self
    }

    /// Answer every request to `host` with 503
    pub(crate) fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// Fail the page at `offset` the next `times` requests
    pub(crate) fn failing_page(self, offset: usize, times: u32) -> Self {
        self.lock_failing().insert(offset, times);
        self
    }

    /// Raise `stop` once `pages` page requests were answered
    pub(crate) fn stop_after_pages(mut self, pages: usize, stop: StopSignal) -> Self {
        self.stop_after_pages = Some((pages, stop));
        self
    }

    /// Serve the stations of `copy_of` again when `offset` is requested
    pub(crate) fn duplicate_page(mut self, offset: usize, copy_of: usize) -> Self {
        self.duplicate_pages.insert(offset, copy_of);
        self
    }

    /// Serve station `index` without its uuid and with a bogus vote count
    pub(crate) fn malformed_station(mut self, index: usize) -> Self {
        self.malformed.insert(index);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub(crate) fn page_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.contains("/json/stations"))
            .collect()
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashMap<usize, u32>> {
        self.failing_pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn station_json(&self, index: usize) -> serde_json::Value {
        if self.malformed.contains(&index) {
            return serde_json::json!({
                "name": format!("{} {index}", self.name_prefix),
                "votes": "many"
            });
        }

        serde_json::json!({
            "stationuuid": format!("station-{index}"),
            "changeuuid": format!("change-{index}"),
            "name": format!("{} {index}", self.name_prefix),
            "url": format!("http://stream.example.com/{index}"),
            "tags": "pop,rock",
            "country": "Germany",
            "countrycode": "DE",
            "language": "german",
            "votes": index,
            "clickcount": self.total.saturating_sub(index),
            "lastcheckok": 1,
            "hls": 0
        })
    }

    fn respond(status: u16, body: impl Into<Bytes>) -> HttpResponse {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    fn stations_page(&self, url: &Url) -> HttpResponse {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .and_then(|(_, value)| value.parse::<usize>().ok())
        };
        let limit = param("limit").unwrap_or(self.listed);
        let offset = param("offset").unwrap_or(0);

        {
            let mut failing = self.lock_failing();
            if let Some(remaining) = failing.get_mut(&offset)
                && *remaining > 0
            {
                *remaining = remaining.saturating_sub(1);
                return Self::respond(500, "server error");
            }
        }

        let source = self.duplicate_pages.get(&offset).copied().unwrap_or(offset);
        let end = (source + limit).min(self.listed);
        let stations: Vec<_> = (source.min(end)..end).map(|i| self.station_json(i)).collect();

        if let Some((pages, stop)) = &self.stop_after_pages
            && self.page_requests().len() >= *pages
        {
            stop.raise();
        }

        Self::respond(200, serde_json::to_vec(&stations).unwrap_or_default())
    }
}

#[async_trait]
impl HttpClient for MockDirectory {
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let Ok(parsed) = Url::parse(url) else {
            return Ok(Self::respond(400, "bad url"));
        };

        if parsed
            .host_str()
            .is_some_and(|host| self.unreachable.contains(host))
        {
            return Ok(Self::respond(503, "unavailable"));
        }

        Ok(match parsed.path() {
            "/json/stats" => match &self.stats_body {
                Some(body) => Self::respond(200, body.clone()),
                None => Self::respond(200, format!(r#"{{"stations": {}}}"#, self.total)),
            },
            "/json/stations" => self.stations_page(&parsed),
            _ => Self::respond(404, "not found"),
        })
    }
}
