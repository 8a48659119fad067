// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration constants and on-disk layout

use std::path::{Path, PathBuf};

/// Application metadata
pub mod app {
    /// Application name (used for the data directory)
    pub const NAME: &str = "radiosync";
}

/// Directory service configuration
pub mod api {
    /// Servers probed when choosing where to sync from
    pub const CANDIDATE_SERVERS: &[&str] =
        &["fi1.api.radio-browser.info", "de2.api.radio-browser.info"];

    /// Host used when the candidate list is empty
    pub const FALLBACK_SERVER: &str = "de1.api.radio-browser.info";

    /// User agent sent with every request
    pub const USER_AGENT: &str = concat!("radiosync/", env!("CARGO_PKG_VERSION"));

    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
}

/// Sync pipeline tuning
pub mod sync {
    /// Stations requested per page
    pub const PAGE_SIZE: usize = 50;

    /// Pages buffered before they are written to the staging catalog
    pub const FLUSH_EVERY_PAGES: usize = 10;

    /// Attempts per page before it is skipped
    pub const MAX_PAGE_ATTEMPTS: u32 = 3;

    /// Base delay between page attempts, multiplied by the attempt number
    pub const RETRY_DELAY_MS: u64 = 1_000;

    /// Pause inserted after every flush window
    pub const PAUSE_MS: u64 = 200;
}

/// Worker timing windows, all in milliseconds
pub mod worker {
    /// An interrupted update younger than this is resumed
    pub const RESUME_WINDOW_MS: i64 = 30 * 60 * 1000;

    /// An update flag older than this is considered stale
    pub const STALE_UPDATE_MS: i64 = 60 * 60 * 1000;

    /// Recent foreground activity keeps an orphaned update alive
    pub const RECENT_FOREGROUND_MS: i64 = 5 * 60 * 1000;

    /// Server probe results are reused for this long
    pub const PROBE_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

    /// How often a running worker re-reads the progress record
    pub const CANCEL_POLL_MS: u64 = 1_000;

    /// A worker heartbeat younger than this proves the update is alive
    pub const HEARTBEAT_TIMEOUT_MS: i64 = 30 * 1000;
}

const MAIN_DB_FILENAME: &str = "stations.db";
const STAGING_DB_FILENAME: &str = "stations-staging.db";
const PROGRESS_FILENAME: &str = "update-progress.db";
const PROBE_CACHE_FILENAME: &str = "server-probe.json";

/// Locations of every file radiosync keeps on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Use a specific data directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform data directory, e.g. `~/.local/share/radiosync`
    pub fn platform_default() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join(app::NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Main catalog used for browsing
    pub fn main_db(&self) -> PathBuf {
        self.root.join(MAIN_DB_FILENAME)
    }

    /// Temporary catalog filled during a sync run
    pub fn staging_db(&self) -> PathBuf {
        self.root.join(STAGING_DB_FILENAME)
    }

    pub fn progress_file(&self) -> PathBuf {
        self.root.join(PROGRESS_FILENAME)
    }

    pub fn probe_cache_file(&self) -> PathBuf {
        self.root.join(PROBE_CACHE_FILENAME)
    }
}
