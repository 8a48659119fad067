// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Deserializer};
use tracing::{debug, trace, warn};

use crate::catalog::Station;
use crate::error::DirectoryError;
use crate::http::{HttpClient, HttpResponse};

use super::server::ServerInfo;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ServerStats {
    #[serde(default)]
    stations: Option<u64>,
}

/// Station as returned by `json/stations`
#[derive(Debug, Deserialize)]
struct ApiStation {
    stationuuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    changeuuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    url_resolved: String,
    #[serde(default, deserialize_with = "null_as_default")]
    homepage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    favicon: String,
    #[serde(default, deserialize_with = "null_as_default")]
    tags: String,
    #[serde(default, deserialize_with = "null_as_default")]
    country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    countrycode: String,
    #[serde(default, deserialize_with = "null_as_default")]
    state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    language: String,
    #[serde(default, deserialize_with = "null_as_default")]
    votes: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    clickcount: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    clicktrend: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    bitrate: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    codec: String,
    #[serde(default, deserialize_with = "flag")]
    lastcheckok: bool,
    #[serde(default, deserialize_with = "flag")]
    hls: bool,
    #[serde(default)]
    lastchangetime: Option<String>,
    #[serde(default)]
    lastclicktime: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The directory encodes booleans as 0/1; accept real booleans too
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Int(value)) => value != 0,
        None => false,
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl From<ApiStation> for Station {
    fn from(api: ApiStation) -> Self {
        // Prefer the stored url, fall back to the resolved one
        let url = if api.url.trim().is_empty() {
            api.url_resolved
        } else {
            api.url
        };

        Station {
            station_uuid: api.stationuuid,
            change_uuid: api.changeuuid,
            name: api.name.trim().to_string(),
            url,
            homepage: api.homepage,
            favicon: api.favicon,
            country: api.country,
            country_code: api.countrycode,
            state: api.state,
            tags: api.tags,
            language: api.language,
            click_count: api.clickcount,
            click_trend: api.clicktrend,
            votes: api.votes,
            bitrate: api.bitrate,
            codec: api.codec,
            last_check_ok: api.lastcheckok,
            hls: api.hls,
            last_change_time: api.lastchangetime.and_then(non_empty),
            last_click_time: api.lastclicktime.and_then(non_empty),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

async fn get_checked<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<HttpResponse, DirectoryError> {
    let response = client
        .get(url)
        .await
        .map_err(|e| DirectoryError::RequestFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(DirectoryError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response)
}

/// Number of stations the server currently lists
pub async fn fetch_station_total<C: HttpClient + ?Sized>(
    client: &C,
    server: &ServerInfo,
) -> Result<usize, DirectoryError> {
    let url = server.endpoint("json/stats")?.to_string();
    let response = get_checked(client, &url).await?;

    let stats: ServerStats =
        serde_json::from_slice(&response.body).map_err(|e| DirectoryError::DecodeFailed {
            url: url.clone(),
            source: e,
        })?;

    let total = stats
        .stations
        .ok_or(DirectoryError::MissingStationTotal { url })?;

    debug!(server = %server, total, "station total fetched");
    Ok(total as usize)
}

/// Fetch one page of stations, broken streams excluded
pub async fn fetch_station_page<C: HttpClient + ?Sized>(
    client: &C,
    server: &ServerInfo,
    limit: usize,
    offset: usize,
) -> Result<Vec<Station>, DirectoryError> {
    let mut url = server.endpoint("json/stations")?;
    url.query_pairs_mut()
        .append_pair("limit", &limit.to_string())
        .append_pair("offset", &offset.to_string())
        .append_pair("hidebroken", "true");
    let url = url.to_string();

    let response = get_checked(client, &url).await?;
    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(&response.body).map_err(|e| DirectoryError::DecodeFailed {
            url: url.clone(),
            source: e,
        })?;

    let received = entries.len();
    let stations: Vec<Station> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<ApiStation>(entry) {
            Ok(station) => Some(station.into()),
            Err(e) => {
                warn!(offset, index, error = %e, "dropping malformed station");
                None
            }
        })
        .collect();

    trace!(offset, received, count = stations.len(), "station page fetched");
    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::MockDirectory;

    #[test]
    fn api_station_decodes_numeric_flags_and_nulls() {
        let json = r#"{
            "stationuuid": "960e57c5-0601-11e8-ae97-52543be04c81",
            "changeuuid": "9f5b3c6a-0601-11e8-ae97-52543be04c81",
            "name": "  SWR3 ",
            "url": "http://swr-swr3-live.cast.addradio.de/swr/swr3/live/mp3/128/stream.mp3",
            "url_resolved": "http://resolved.example.com/swr3",
            "homepage": "https://www.swr3.de/",
            "favicon": null,
            "tags": "pop,rock",
            "country": "Germany",
            "countrycode": "DE",
            "iso_3166_2": null,
            "state": "Baden-Württemberg",
            "language": "german",
            "votes": 1234,
            "lastchangetime": "2024-01-05 12:00:00",
            "codec": "MP3",
            "bitrate": 128,
            "hls": 0,
            "lastcheckok": 1,
            "clickcount": 987,
            "clicktrend": -4,
            "lastclicktime": ""
        }"#;

        let station: Station = serde_json::from_str::<ApiStation>(json).unwrap().into();

        assert_eq!(station.station_uuid, "960e57c5-0601-11e8-ae97-52543be04c81");
        assert_eq!(station.name, "SWR3");
        assert!(station.url.ends_with("stream.mp3"));
        assert_eq!(station.favicon, "");
        assert_eq!(station.country_code, "DE");
        assert_eq!(station.votes, 1234);
        assert_eq!(station.click_trend, -4);
        assert!(station.last_check_ok);
        assert!(!station.hls);
        assert_eq!(
            station.last_change_time.as_deref(),
            Some("2024-01-05 12:00:00")
        );
        assert_eq!(station.last_click_time, None);
    }

    #[test]
    fn api_station_accepts_boolean_flags_and_resolved_fallback() {
        let json = r#"{"stationuuid": "x", "url": "", "url_resolved": "http://r", "hls": true}"#;
        let station: Station = serde_json::from_str::<ApiStation>(json).unwrap().into();

        assert!(station.hls);
        assert!(!station.last_check_ok);
        assert_eq!(station.url, "http://r");
    }

    #[tokio::test]
    async fn fetch_station_total_reads_stats() {
        let directory = MockDirectory::with_stations(120);
        let server = ServerInfo::new("de2.api.radio-browser.info", true);

        let total = fetch_station_total(&directory, &server).await.unwrap();
        assert_eq!(total, 120);
    }

    #[tokio::test]
    async fn fetch_station_total_rejects_missing_field() {
        let directory = MockDirectory::with_stations(0).stats_body(r#"{"tags": 5}"#);
        let server = ServerInfo::new("de2.api.radio-browser.info", true);

        let result = fetch_station_total(&directory, &server).await;
        assert!(matches!(result, Err(DirectoryError::MissingStationTotal { .. })));
    }

    #[tokio::test]
    async fn fetch_station_total_reports_http_errors() {
        let directory = MockDirectory::with_stations(10).unreachable("down.example.com");
        let server = ServerInfo::new("down.example.com", false);

        let result = fetch_station_total(&directory, &server).await;
        assert!(matches!(
            result,
            Err(DirectoryError::HttpStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn fetch_station_page_sends_paging_parameters() {
        let directory = MockDirectory::with_stations(120);
        let server = ServerInfo::new("fi1.api.radio-browser.info", false);

        let page = fetch_station_page(&directory, &server, 50, 100).await.unwrap();

        assert_eq!(page.len(), 20);
        assert_eq!(page[0].station_uuid, "station-100");

        let requests = directory.requests();
        let last = requests.last().unwrap();
        assert!(last.starts_with("http://fi1.api.radio-browser.info/json/stations?"));
        assert!(last.contains("limit=50"));
        assert!(last.contains("offset=100"));
        assert!(last.contains("hidebroken=true"));
    }

    #[tokio::test]
    async fn fetch_station_page_drops_only_malformed_entries() {
        let directory = MockDirectory::with_stations(30).malformed_station(3);
        let server = ServerInfo::new("fi1.api.radio-browser.info", false);

        let page = fetch_station_page(&directory, &server, 10, 0).await.unwrap();

        assert_eq!(page.len(), 9);
        assert!(page.iter().all(|station| station.station_uuid != "station-3"));
        assert_eq!(page[3].station_uuid, "station-4");
    }
}
