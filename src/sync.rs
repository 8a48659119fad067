// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Station};
use crate::config::sync::{
    FLUSH_EVERY_PAGES, MAX_PAGE_ATTEMPTS, PAGE_SIZE, PAUSE_MS, RETRY_DELAY_MS,
};
use crate::directory::{ServerInfo, fetch_station_page, fetch_station_total};
use crate::error::{CatalogError, DirectoryError, SyncError};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::state::now_ms;

/// Options for a catalog synchronization
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Stations requested per page
    pub page_size: usize,
    /// Pages buffered between writes to the staging catalog
    pub flush_every: usize,
    /// Attempts per page before it is skipped
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub retry_delay: Duration,
    /// Pause after every flush window, where stop requests are honored
    pub pause: Duration,
    /// Continue from the stations already in the staging catalog
    pub resume: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            flush_every: FLUSH_EVERY_PAGES,
            max_attempts: MAX_PAGE_ATTEMPTS,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            pause: Duration::from_millis(PAUSE_MS),
            resume: false,
        }
    }
}

/// The catalog being browsed and the one being filled
#[derive(Debug, Clone, Copy)]
pub struct Catalogs<'a> {
    pub main: &'a Catalog,
    pub staging: &'a Catalog,
}

/// Decides whether a smaller download may replace the main catalog
pub trait ReplacePolicy: Send + Sync {
    fn confirm_replace(&self, staged: usize, main: usize) -> bool;
}

/// Always take the fresh download, used for unattended updates
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReplace;

impl ReplacePolicy for AlwaysReplace {
    fn confirm_replace(&self, _staged: usize, _main: usize) -> bool {
        true
    }
}

/// Never shrink the main catalog
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepLarger;

impl ReplacePolicy for KeepLarger {
    fn confirm_replace(&self, _staged: usize, _main: usize) -> bool {
        false
    }
}

/// Cooperative stop flag shared between a sync and whoever may cancel it
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a sync run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The main catalog now holds the downloaded stations
    Replaced {
        stations: usize,
        skipped_pages: usize,
    },
    /// The download was smaller and the replace was declined
    KeptExisting { staged: usize, main: usize },
    /// Stopped early; the staging catalog keeps what was stored so far
    Interrupted { staged: usize, total: usize },
}

/// Download the whole directory into the staging catalog and swap it in
///
/// Stations are paged from `server`, buffered and flushed to
/// `catalogs.staging` every `flush_every` pages. A finished download that
/// is at least as large as the main catalog replaces it in one transaction;
/// a smaller one only does so when `policy` agrees. The staging catalog is
/// cleared once the run completes, so an interrupted run can be resumed
/// with `options.resume`.
pub async fn sync_catalog<C: HttpClient + ?Sized>(
    client: &C,
    server: &ServerInfo,
    catalogs: Catalogs<'_>,
    options: &SyncOptions,
    reporter: SharedProgressReporter,
    policy: &dyn ReplacePolicy,
    stop: &StopSignal,
) -> Result<SyncOutcome, SyncError> {
    let Catalogs { main, staging } = catalogs;
    let page_size = options.page_size.max(1);
    let flush_every = options.flush_every.max(1);

    reporter.report(ProgressEvent::FetchingTotal);
    let total = fetch_station_total(client, server).await?;
    let main_count = main.count()?;
    reporter.report(ProgressEvent::TotalKnown { total, main_count });
    info!(server = %server, total, main_count, "starting catalog sync");

    let mut downloaded = if options.resume {
        let staged = staging.count()?;
        reporter.report(ProgressEvent::Resumed { staged, total });
        info!(staged, "resuming from staging catalog");
        staged
    } else {
        staging.delete_all()?;
        reporter.report(ProgressEvent::StagingStarted { total });
        0
    };

    let pages = total.div_ceil(page_size);
    let start_page = if options.resume {
        downloaded / page_size
    } else {
        0
    };
    let mut skipped_pages = 0;
    // A resume re-fetches the partially stored page, so the first flush
    // takes the staging count as is
    let mut recount = options.resume;
    let mut buffer: Vec<Station> = Vec::with_capacity(page_size * flush_every);

    for page in start_page..pages {
        let offset = page * page_size;
        let last_page = page + 1 == pages;
        let window_end = (page + 1) % flush_every == 0;

        let fetched = fetch_page_with_retry(client, server, options, page_size, offset).await;

        let stored = match fetched {
            Ok(stations) if stations.is_empty() => {
                debug!(page, offset, "empty page");
                false
            }
            Ok(stations) => {
                downloaded += stations.len();
                buffer.extend(stations);
                true
            }
            Err(e) => {
                skipped_pages += 1;
                let estimated = ((page + 1) * page_size).min(total);
                warn!(page, offset, error = %e, "skipping page after repeated failures");
                reporter.report(ProgressEvent::PageSkipped {
                    page,
                    pages,
                    estimated,
                    total,
                    error: e.to_string(),
                });
                false
            }
        };

        if window_end || last_page {
            let staged = flush(staging, &mut buffer)?;
            downloaded = if recount {
                recount = false;
                staged
            } else {
                downloaded.max(staged)
            };
        }

        if stored {
            reporter.report(ProgressEvent::PageStored {
                page,
                pages,
                downloaded,
                total,
            });
        }

        if window_end && !last_page {
            tokio::time::sleep(options.pause).await;

            if stop.is_raised() {
                let staged = flush(staging, &mut buffer)?;
                info!(staged, total, "sync interrupted");
                reporter.report(ProgressEvent::Interrupted { staged, total });
                return Ok(SyncOutcome::Interrupted { staged, total });
            }
        }
    }

    if downloaded == 0 {
        warn!(total, "no stations were downloaded");
        return Err(SyncError::NoStationsDownloaded);
    }

    let staged = staging.count()?;

    if staged < main_count && !policy.confirm_replace(staged, main_count) {
        info!(staged, main_count, "keeping larger existing catalog");
        staging.delete_all()?;
        reporter.report(ProgressEvent::KeptExisting {
            staged,
            main: main_count,
        });
        return Ok(SyncOutcome::KeptExisting {
            staged,
            main: main_count,
        });
    }

    reporter.report(ProgressEvent::Swapping {
        staged,
        main: main_count,
    });
    let stations = staging.all()?;
    main.replace_all(&stations)?;
    main.touch_update_time(now_ms())?;
    staging.delete_all()?;

    info!(stations = staged, skipped_pages, "catalog replaced");
    reporter.report(ProgressEvent::Completed { stations: staged });

    Ok(SyncOutcome::Replaced {
        stations: staged,
        skipped_pages,
    })
}

/// Write the buffered stations and return the staging count
fn flush(staging: &Catalog, buffer: &mut Vec<Station>) -> Result<usize, CatalogError> {
    if !buffer.is_empty() {
        staging.insert_all(buffer)?;
        debug!(count = buffer.len(), "flushed stations to staging");
        buffer.clear();
    }
    staging.count()
}

async fn fetch_page_with_retry<C: HttpClient + ?Sized>(
    client: &C,
    server: &ServerInfo,
    options: &SyncOptions,
    page_size: usize,
    offset: usize,
) -> Result<Vec<Station>, DirectoryError> {
    let mut attempt = 1;
    loop {
        match fetch_station_page(client, server, page_size, offset).await {
            Ok(stations) => return Ok(stations),
            Err(e) if attempt < options.max_attempts => {
                warn!(offset, attempt, error = %e, "page request failed, retrying");
                tokio::time::sleep(options.retry_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
