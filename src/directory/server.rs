// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::api::FALLBACK_SERVER;
use crate::config::worker::PROBE_CACHE_TTL_MS;
use crate::error::{DirectoryError, StateError};
use crate::http::HttpClient;
use crate::state::{read_json, write_json_atomic};

/// A directory server together with the scheme to reach it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInfo {
    pub host: String,
    pub use_https: bool,
}

impl ServerInfo {
    pub fn new(host: impl Into<String>, use_https: bool) -> Self {
        Self {
            host: host.into(),
            use_https,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_https { "https" } else { "http" }
    }

    /// Full URL of an API path on this server
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = Url::parse(&format!("{}://{}/", self.scheme(), self.host))?;
        base.join(path.trim_start_matches('/'))
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme(), self.host)
    }
}

/// Outcome of timing one server/scheme combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub server: ServerInfo,
    /// Round-trip time in milliseconds, `None` when unreachable
    pub latency_ms: Option<u64>,
}

/// Time a stats request; unreachable or non-2xx servers yield `None`
pub async fn probe_server<C: HttpClient + ?Sized>(client: &C, server: &ServerInfo) -> Option<u64> {
    let url = server.endpoint("json/stats").ok()?;

    let started = Instant::now();
    match client.get(url.as_str()).await {
        Ok(response) if response.is_success() => {
            let latency = started.elapsed().as_millis() as u64;
            debug!(server = %server, latency_ms = latency, "probe succeeded");
            Some(latency)
        }
        Ok(response) => {
            debug!(server = %server, status = response.status, "probe rejected");
            None
        }
        Err(e) => {
            debug!(server = %server, error = %e, "probe failed");
            None
        }
    }
}

/// Probe every host over both HTTP and HTTPS concurrently
pub async fn probe_all<C: HttpClient + ?Sized>(client: &C, hosts: &[String]) -> Vec<ProbeResult> {
    let servers: Vec<ServerInfo> = hosts
        .iter()
        .flat_map(|host| [ServerInfo::new(host, false), ServerInfo::new(host, true)])
        .collect();

    let latencies = join_all(servers.iter().map(|server| probe_server(client, server))).await;

    servers
        .into_iter()
        .zip(latencies)
        .map(|(server, latency_ms)| ProbeResult { server, latency_ms })
        .collect()
}

/// The reachable server with the lowest latency
pub fn fastest(results: &[ProbeResult]) -> Option<ServerInfo> {
    results
        .iter()
        .filter_map(|result| result.latency_ms.map(|latency| (latency, &result.server)))
        .min_by_key(|(latency, _)| *latency)
        .map(|(_, server)| server.clone())
}

/// Probe results persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeCache {
    pub timestamp_ms: i64,
    pub results: Vec<ProbeResult>,
}

impl ProbeCache {
    pub fn load(path: &Path) -> Result<Option<Self>, StateError> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        write_json_atomic(path, self)
    }

    /// Whether these results are recent and cover exactly `hosts`
    pub fn is_usable(&self, hosts: &[String], now_ms: i64) -> bool {
        let age = now_ms - self.timestamp_ms;
        if !(0..PROBE_CACHE_TTL_MS).contains(&age) {
            return false;
        }

        let cached: BTreeSet<&str> = self.results.iter().map(|r| r.server.host.as_str()).collect();
        let wanted: BTreeSet<&str> = hosts.iter().map(String::as_str).collect();
        cached == wanted
    }
}

/// Pick the server to sync from
///
/// Reuses probe results younger than a day from `cache_path`, otherwise
/// probes `hosts` again and stores the new results. Cache failures are
/// logged and never fatal.
pub async fn select_server<C: HttpClient + ?Sized>(
    client: &C,
    hosts: &[String],
    cache_path: Option<&Path>,
    now_ms: i64,
) -> Result<ServerInfo, DirectoryError> {
    let fallback;
    let hosts = if hosts.is_empty() {
        fallback = [FALLBACK_SERVER.to_string()];
        &fallback[..]
    } else {
        hosts
    };

    if let Some(path) = cache_path {
        match ProbeCache::load(path) {
            Ok(Some(cache)) if cache.is_usable(hosts, now_ms) => {
                if let Some(server) = fastest(&cache.results) {
                    info!(server = %server, "using cached server probe");
                    return Ok(server);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable probe cache"),
        }
    }

    let results = probe_all(client, hosts).await;

    if let Some(path) = cache_path {
        let cache = ProbeCache {
            timestamp_ms: now_ms,
            results: results.clone(),
        };
        if let Err(e) = cache.save(path) {
            warn!(error = %e, "failed to store probe cache");
        }
    }

    let server = fastest(&results).ok_or(DirectoryError::NoReachableServer)?;
    info!(server = %server, "selected fastest server");
    Ok(server)
}
