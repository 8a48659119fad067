// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::StateError;

pub const PREPARING_MESSAGE: &str = "Preparing update...";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS update_progress (
    id                       INTEGER PRIMARY KEY NOT NULL CHECK (id = 1),
    is_updating              INTEGER NOT NULL DEFAULT 0,
    message                  TEXT NOT NULL DEFAULT '',
    current                  INTEGER NOT NULL DEFAULT 0,
    total                    INTEGER NOT NULL DEFAULT 0,
    update_id                INTEGER NOT NULL DEFAULT 0,
    update_start_time        INTEGER NOT NULL DEFAULT 0,
    app_last_foreground_time INTEGER NOT NULL DEFAULT 0,
    worker_heartbeat_time    INTEGER NOT NULL DEFAULT 0,
    cancelled_update_id      INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO update_progress (id) VALUES (1);
";

const SELECT_RECORD: &str = "
SELECT is_updating, message, current, total, update_id, update_start_time,
       app_last_foreground_time, worker_heartbeat_time, cancelled_update_id
FROM update_progress WHERE id = 1";

const SAVE_RECORD: &str = "
UPDATE update_progress SET
    is_updating = ?1,
    message = ?2,
    current = ?3,
    total = ?4,
    update_id = ?5,
    update_start_time = ?6,
    app_last_foreground_time = ?7,
    worker_heartbeat_time = ?8,
    cancelled_update_id = ?9
WHERE id = 1";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persisted state of the current or last catalog update
///
/// Written on every progress change so a restarted process can tell
/// whether an update was running and where it stood.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
pub struct ProgressRecord {
    pub is_updating: bool,
    pub message: String,
    pub current: u64,
    pub total: u64,
    /// Milliseconds timestamp identifying the update, 0 if none ever ran
    pub update_id: i64,
    pub update_start_time: i64,
    pub app_last_foreground_time: i64,
    /// Last time the process running the update reported it is alive
    pub worker_heartbeat_time: i64,
    /// Update id an explicit cancel was issued for
    pub cancelled_update_id: i64,
}

impl ProgressRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            is_updating: row.get(0)?,
            message: row.get(1)?,
            current: row.get::<_, i64>(2)?.max(0) as u64,
            total: row.get::<_, i64>(3)?.max(0) as u64,
            update_id: row.get(4)?,
            update_start_time: row.get(5)?,
            app_last_foreground_time: row.get(6)?,
            worker_heartbeat_time: row.get(7)?,
            cancelled_update_id: row.get(8)?,
        })
    }

    /// Completion in percent, 0 while the total is unknown
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        (self.current.min(self.total) * 100 / self.total) as u8
    }

    /// Whether an interrupted update can be picked up again at `now_ms`
    pub fn is_resumable(&self, now_ms: i64, resume_window_ms: i64) -> bool {
        self.is_updating
            && self.update_id > 0
            && self.update_start_time > 0
            && now_ms - self.update_start_time < resume_window_ms
    }

    /// Whether update `update_id` was cancelled
    pub fn is_cancelled(&self, update_id: i64) -> bool {
        self.cancelled_update_id == update_id
    }
}

/// How an update run was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStart {
    pub update_id: i64,
    /// True when an interrupted update is being continued
    pub resumed: bool,
    /// The record as it was left by the interrupted run
    pub previous: ProgressRecord,
}

/// SQLite-backed store for the progress record
///
/// Every change is a read-modify-write inside an immediate transaction, so
/// writers in different processes never overwrite each other.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl ProgressStore {
    /// Open (or create) the progress database at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StateError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| StateError::OpenFailed {
            path: path.clone(),
            source: e,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current record; a fresh database reads as an idle default
    pub fn load(&self) -> Result<ProgressRecord, StateError> {
        Ok(load_record(&self.conn())?)
    }

    pub fn save(&self, record: &ProgressRecord) -> Result<(), StateError> {
        save_record(&self.conn(), record)?;
        Ok(())
    }

    /// Apply a change to the stored record and persist it atomically
    pub fn update<F>(&self, change: F) -> Result<ProgressRecord, StateError>
    where
        F: FnOnce(&mut ProgressRecord),
    {
        self.transact(|record| {
            change(record);
            record.clone()
        })
    }

    fn transact<T, F>(&self, change: F) -> Result<T, StateError>
    where
        F: FnOnce(&mut ProgressRecord) -> T,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut record = load_record(&tx)?;
        let result = change(&mut record);
        save_record(&tx, &record)?;
        tx.commit()?;
        Ok(result)
    }

    /// Start a new update, or continue one interrupted less than
    /// `resume_window_ms` ago
    pub fn begin(&self, now_ms: i64, resume_window_ms: i64) -> Result<UpdateStart, StateError> {
        let start = self.transact(|record| {
            let previous = record.clone();

            if previous.is_resumable(now_ms, resume_window_ms) {
                record.worker_heartbeat_time = now_ms;
                return UpdateStart {
                    update_id: previous.update_id,
                    resumed: true,
                    previous,
                };
            }

            *record = ProgressRecord {
                is_updating: true,
                message: PREPARING_MESSAGE.to_string(),
                current: 0,
                total: 0,
                update_id: now_ms,
                update_start_time: now_ms,
                app_last_foreground_time: previous.app_last_foreground_time,
                worker_heartbeat_time: now_ms,
                cancelled_update_id: previous.cancelled_update_id,
            };
            UpdateStart {
                update_id: now_ms,
                resumed: false,
                previous,
            }
        })?;

        if start.resumed {
            info!(update_id = start.update_id, "resuming interrupted update");
        } else {
            info!(update_id = start.update_id, "starting new update");
        }
        Ok(start)
    }

    pub fn record_progress(
        &self,
        message: &str,
        current: u64,
        total: u64,
    ) -> Result<ProgressRecord, StateError> {
        debug!(message, current, total, "progress");
        self.update(|record| {
            record.message = message.to_string();
            record.current = current;
            record.total = total;
        })
    }

    pub fn record_message(&self, message: &str) -> Result<ProgressRecord, StateError> {
        debug!(message, "progress");
        self.update(|record| record.message = message.to_string())
    }

    /// Mark the update as done, keeping its final message
    pub fn finish(&self, message: &str) -> Result<ProgressRecord, StateError> {
        self.update(|record| {
            record.is_updating = false;
            record.message = message.to_string();
        })
    }

    /// Mark the update as failed
    pub fn fail(&self, error: &str) -> Result<ProgressRecord, StateError> {
        self.update(|record| {
            record.is_updating = false;
            record.message = format!("Update failed: {error}");
        })
    }

    /// Clear the updating flag without touching anything else
    ///
    /// A running worker keeps going; only [`cancel`](Self::cancel) stops it.
    pub fn reset(&self) -> Result<ProgressRecord, StateError> {
        self.update(|record| record.is_updating = false)
    }

    /// Ask the running update to stop and clear the updating flag
    pub fn cancel(&self) -> Result<ProgressRecord, StateError> {
        self.update(|record| {
            if record.is_updating {
                record.cancelled_update_id = record.update_id;
            }
            record.is_updating = false;
        })
    }

    /// Note that the worker running `update_id` is alive at `now_ms`
    pub fn heartbeat(&self, update_id: i64, now_ms: i64) -> Result<ProgressRecord, StateError> {
        self.update(|record| {
            if record.is_updating && record.update_id == update_id {
                record.worker_heartbeat_time = now_ms;
            }
        })
    }

    /// Note that a user-facing process was active at `now_ms`
    pub fn touch_foreground(&self, now_ms: i64) -> Result<ProgressRecord, StateError> {
        self.update(|record| record.app_last_foreground_time = now_ms)
    }
}

fn load_record(conn: &Connection) -> rusqlite::Result<ProgressRecord> {
    Ok(conn
        .query_row(SELECT_RECORD, [], ProgressRecord::from_row)
        .optional()?
        .unwrap_or_default())
}

fn save_record(conn: &Connection, record: &ProgressRecord) -> rusqlite::Result<()> {
    conn.execute(
        SAVE_RECORD,
        params![
            record.is_updating,
            record.message,
            record.current as i64,
            record.total as i64,
            record.update_id,
            record.update_start_time,
            record.app_last_foreground_time,
            record.worker_heartbeat_time,
            record.cancelled_update_id,
        ],
    )?;
    Ok(())
}

/// Current wall clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Read a JSON file; missing or empty files read as `None`
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StateError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StateError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write JSON through a uniquely named temporary file and rename it into place
///
/// Readers never observe a half-written file, and concurrent writers never
/// share a temporary file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let write_failed = |source| StateError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_failed)?;

    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(json.as_bytes()).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}
