// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Statement, Transaction, params};
use tracing::debug;

use crate::error::CatalogError;

use super::station::{STATION_COLUMNS, Station};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS radio_stations (
    station_uuid   TEXT PRIMARY KEY NOT NULL,
    change_uuid    TEXT,
    name           TEXT,
    url            TEXT,
    homepage       TEXT,
    favicon        TEXT,
    country        TEXT,
    countrycode    TEXT,
    state          TEXT,
    tags           TEXT,
    language       TEXT,
    clickcount     INTEGER NOT NULL DEFAULT 0,
    clicktrend     INTEGER NOT NULL DEFAULT 0,
    votes          INTEGER NOT NULL DEFAULT 0,
    bitrate        INTEGER NOT NULL DEFAULT 0,
    codec          TEXT,
    lastcheckok    INTEGER NOT NULL DEFAULT 0,
    hls            INTEGER NOT NULL DEFAULT 0,
    lastchangetime TEXT,
    lastclicktime  TEXT
);

CREATE INDEX IF NOT EXISTS idx_radio_stations_name ON radio_stations (name);
CREATE INDEX IF NOT EXISTS idx_radio_stations_clickcount ON radio_stations (clickcount);
CREATE INDEX IF NOT EXISTS idx_radio_stations_votes ON radio_stations (votes);
CREATE INDEX IF NOT EXISTS idx_radio_stations_lastchangetime ON radio_stations (lastchangetime);
CREATE INDEX IF NOT EXISTS idx_radio_stations_lastclicktime ON radio_stations (lastclicktime);
CREATE INDEX IF NOT EXISTS idx_radio_stations_country ON radio_stations (country);
CREATE INDEX IF NOT EXISTS idx_radio_stations_countrycode ON radio_stations (countrycode);
CREATE INDEX IF NOT EXISTS idx_radio_stations_language ON radio_stations (language);
CREATE INDEX IF NOT EXISTS idx_radio_stations_tags ON radio_stations (tags);

CREATE TABLE IF NOT EXISTS update_timestamp (
    id                    INTEGER PRIMARY KEY NOT NULL,
    last_update_timestamp INTEGER NOT NULL
);
INSERT OR IGNORE INTO update_timestamp (id, last_update_timestamp) VALUES (1, 0);

CREATE VIRTUAL TABLE IF NOT EXISTS radio_stations_fts USING fts5(
    name, tags, country, language,
    content='radio_stations'
);

CREATE TRIGGER IF NOT EXISTS radio_stations_fts_insert AFTER INSERT ON radio_stations BEGIN
    INSERT INTO radio_stations_fts (rowid, name, tags, country, language)
    VALUES (new.rowid, new.name, new.tags, new.country, new.language);
END;

CREATE TRIGGER IF NOT EXISTS radio_stations_fts_delete AFTER DELETE ON radio_stations BEGIN
    INSERT INTO radio_stations_fts (radio_stations_fts, rowid, name, tags, country, language)
    VALUES ('delete', old.rowid, old.name, old.tags, old.country, old.language);
END;

CREATE TRIGGER IF NOT EXISTS radio_stations_fts_update AFTER UPDATE ON radio_stations BEGIN
    INSERT INTO radio_stations_fts (radio_stations_fts, rowid, name, tags, country, language)
    VALUES ('delete', old.rowid, old.name, old.tags, old.country, old.language);
    INSERT INTO radio_stations_fts (rowid, name, tags, country, language)
    VALUES (new.rowid, new.name, new.tags, new.country, new.language);
END;

CREATE TABLE IF NOT EXISTS favorites (
    station_uuid TEXT PRIMARY KEY NOT NULL,
    added_at     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS play_history (
    station_uuid TEXT PRIMARY KEY NOT NULL,
    played_at    INTEGER NOT NULL
);
";

const UPSERT_STATION: &str = "
INSERT INTO radio_stations (
    station_uuid, change_uuid, name, url, homepage, favicon, country, countrycode, state, tags,
    language, clickcount, clicktrend, votes, bitrate, codec, lastcheckok, hls, lastchangetime,
    lastclicktime
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
ON CONFLICT(station_uuid) DO UPDATE SET
    change_uuid = excluded.change_uuid,
    name = excluded.name,
    url = excluded.url,
    homepage = excluded.homepage,
    favicon = excluded.favicon,
    country = excluded.country,
    countrycode = excluded.countrycode,
    state = excluded.state,
    tags = excluded.tags,
    language = excluded.language,
    clickcount = excluded.clickcount,
    clicktrend = excluded.clicktrend,
    votes = excluded.votes,
    bitrate = excluded.bitrate,
    codec = excluded.codec,
    lastcheckok = excluded.lastcheckok,
    hls = excluded.hls,
    lastchangetime = excluded.lastchangetime,
    lastclicktime = excluded.lastclicktime";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A SQLite station catalog
///
/// The main catalog and the staging catalog share this type and schema.
#[derive(Debug)]
pub struct Catalog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open (or create) a catalog file, creating its parent directory
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path).map_err(|e| CatalogError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a throwaway in-memory catalog
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, CatalogError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        debug!(path = ?path, "catalog opened");

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// File backing this catalog, `None` for in-memory catalogs
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite mid-statement
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a station, replacing any row with the same uuid
    pub fn insert(&self, station: &Station) -> Result<(), CatalogError> {
        self.insert_all(std::slice::from_ref(station))
    }

    /// Insert stations in one transaction, replacing rows with the same uuid
    pub fn insert_all(&self, stations: &[Station]) -> Result<(), CatalogError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        upsert_all(&tx, stations)?;
        tx.commit()?;
        Ok(())
    }

    /// Update an existing station
    pub fn update(&self, station: &Station) -> Result<(), CatalogError> {
        let conn = self.conn();
        if !station_exists(&conn, &station.station_uuid)? {
            return Err(CatalogError::UnknownStation(station.station_uuid.clone()));
        }
        upsert(&conn, station)?;
        Ok(())
    }

    pub fn delete(&self, station: &Station) -> Result<(), CatalogError> {
        self.conn().execute(
            "DELETE FROM radio_stations WHERE station_uuid = ?1",
            [&station.station_uuid],
        )?;
        Ok(())
    }

    pub fn delete_all(&self) -> Result<(), CatalogError> {
        self.conn().execute("DELETE FROM radio_stations", [])?;
        Ok(())
    }

    pub fn delete_by_ids(&self, station_ids: &[String]) -> Result<(), CatalogError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM radio_stations WHERE station_uuid = ?1")?;
            for id in station_ids {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace every station with `stations` in a single transaction
    ///
    /// Readers see either the old catalog or the new one, never a mix.
    pub fn replace_all(&self, stations: &[Station]) -> Result<(), CatalogError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM radio_stations", [])?;
        upsert_all(&tx, stations)?;
        tx.commit()?;

        debug!(count = stations.len(), "catalog replaced");
        Ok(())
    }

    pub fn count(&self) -> Result<usize, CatalogError> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM radio_stations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn get(&self, station_uuid: &str) -> Result<Option<Station>, CatalogError> {
        let sql = format!("SELECT {STATION_COLUMNS} FROM radio_stations WHERE station_uuid = ?1");
        let station = self
            .conn()
            .query_row(&sql, [station_uuid], Station::from_row)
            .optional()?;
        Ok(station)
    }

    pub fn all(&self) -> Result<Vec<Station>, CatalogError> {
        let sql = format!("SELECT {STATION_COLUMNS} FROM radio_stations");
        self.query_stations(&sql, [])
    }

    pub fn all_ids(&self) -> Result<Vec<String>, CatalogError> {
        self.query_strings("SELECT station_uuid FROM radio_stations", [])
    }

    /// Distinct non-empty stream URLs
    pub fn all_urls(&self) -> Result<Vec<String>, CatalogError> {
        self.query_strings(
            "SELECT DISTINCT url FROM radio_stations WHERE url IS NOT NULL AND url != ''",
            [],
        )
    }

    /// Milliseconds since the epoch of the last successful swap, 0 if never
    pub fn last_update_time(&self) -> Result<i64, CatalogError> {
        let timestamp: Option<i64> = self
            .conn()
            .query_row(
                "SELECT last_update_timestamp FROM update_timestamp WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(timestamp.unwrap_or(0))
    }

    pub fn touch_update_time(&self, now_ms: i64) -> Result<(), CatalogError> {
        self.conn().execute(
            "INSERT INTO update_timestamp (id, last_update_timestamp) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET last_update_timestamp = excluded.last_update_timestamp",
            [now_ms],
        )?;
        Ok(())
    }

    pub(crate) fn query_stations<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Station>, CatalogError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let stations = stmt
            .query_map(params, Station::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stations)
    }

    pub(crate) fn query_strings<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<String>, CatalogError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let values = stmt
            .query_map(params, |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }
}

fn station_exists(conn: &Connection, station_uuid: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM radio_stations WHERE station_uuid = ?1)",
        [station_uuid],
        |row| row.get(0),
    )
}

fn upsert(conn: &Connection, station: &Station) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(UPSERT_STATION)?;
    execute_upsert(&mut stmt, station)
}

fn upsert_all(tx: &Transaction<'_>, stations: &[Station]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(UPSERT_STATION)?;
    for station in stations {
        execute_upsert(&mut stmt, station)?;
    }
    Ok(())
}

fn execute_upsert(stmt: &mut Statement<'_>, s: &Station) -> rusqlite::Result<()> {
    stmt.execute(params![
        s.station_uuid,
        s.change_uuid,
        s.name,
        s.url,
        s.homepage,
        s.favicon,
        s.country,
        s.country_code,
        s.state,
        s.tags,
        s.language,
        s.click_count,
        s.click_trend,
        s.votes,
        s.bitrate,
        s.codec,
        s.last_check_ok,
        s.hls,
        s.last_change_time,
        s.last_click_time,
    ])?;
    Ok(())
}
