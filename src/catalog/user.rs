// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Favorites and play history
//!
//! Both tables only hold station uuids, so they survive a catalog swap.
//! Entries whose station vanished from the directory are hidden from the
//! listings but kept, and reappear if the station comes back.

use rusqlite::params;

use crate::error::CatalogError;

use super::station::{STATION_COLUMNS, Station};
use super::store::Catalog;

impl Catalog {
    /// Mark a station as favorite; returns false if it already was one
    pub fn add_favorite(&self, station_uuid: &str, now_ms: i64) -> Result<bool, CatalogError> {
        if self.get(station_uuid)?.is_none() {
            return Err(CatalogError::UnknownStation(station_uuid.to_string()));
        }

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO favorites (station_uuid, added_at) VALUES (?1, ?2)",
            params![station_uuid, now_ms],
        )?;
        Ok(inserted > 0)
    }

    /// Returns false if the station was not a favorite
    pub fn remove_favorite(&self, station_uuid: &str) -> Result<bool, CatalogError> {
        let removed = self
            .conn()
            .execute("DELETE FROM favorites WHERE station_uuid = ?1", [station_uuid])?;
        Ok(removed > 0)
    }

    pub fn is_favorite(&self, station_uuid: &str) -> Result<bool, CatalogError> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE station_uuid = ?1)",
            [station_uuid],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Favorite stations, most recently added first
    pub fn favorites(&self) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {} FROM radio_stations s JOIN favorites f ON f.station_uuid = s.station_uuid \
             ORDER BY f.added_at DESC, s.name ASC",
            prefixed_columns("s")
        );
        self.query_stations(&sql, [])
    }

    /// Remember that a station was played
    pub fn record_play(&self, station_uuid: &str, now_ms: i64) -> Result<(), CatalogError> {
        if self.get(station_uuid)?.is_none() {
            return Err(CatalogError::UnknownStation(station_uuid.to_string()));
        }

        self.conn().execute(
            "INSERT INTO play_history (station_uuid, played_at) VALUES (?1, ?2)
             ON CONFLICT(station_uuid) DO UPDATE SET played_at = excluded.played_at",
            params![station_uuid, now_ms],
        )?;
        Ok(())
    }

    /// Locally played stations, most recent first
    pub fn recently_played(&self, limit: usize) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {} FROM radio_stations s JOIN play_history h ON h.station_uuid = s.station_uuid \
             ORDER BY h.played_at DESC LIMIT ?1",
            prefixed_columns("s")
        );
        self.query_stations(&sql, [limit as i64])
    }
}

fn prefixed_columns(alias: &str) -> String {
    STATION_COLUMNS
        .split(',')
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(uuids: &[&str]) -> Catalog {
        let catalog = Catalog::open_in_memory().unwrap();
        let stations: Vec<Station> = uuids
            .iter()
            .map(|uuid| Station::new(*uuid, format!("Station {uuid}"), "http://example.com"))
            .collect();
        catalog.insert_all(&stations).unwrap();
        catalog
    }

    fn ids(stations: &[Station]) -> Vec<&str> {
        stations.iter().map(|s| s.station_uuid.as_str()).collect()
    }

    #[test]
    fn favorites_add_list_remove() {
        let catalog = catalog_with(&["a", "b", "c"]);

        assert!(catalog.add_favorite("a", 100).unwrap());
        assert!(catalog.add_favorite("c", 200).unwrap());
        assert!(!catalog.add_favorite("a", 300).unwrap());

        assert!(catalog.is_favorite("a").unwrap());
        assert!(!catalog.is_favorite("b").unwrap());
        assert_eq!(ids(&catalog.favorites().unwrap()), vec!["c", "a"]);

        assert!(catalog.remove_favorite("c").unwrap());
        assert!(!catalog.remove_favorite("c").unwrap());
        assert_eq!(ids(&catalog.favorites().unwrap()), vec!["a"]);
    }

    #[test]
    fn favorite_requires_known_station() {
        let catalog = catalog_with(&["a"]);

        let result = catalog.add_favorite("missing", 1);
        assert!(matches!(result, Err(CatalogError::UnknownStation(_))));
    }

    #[test]
    fn favorites_survive_catalog_replace() {
        let catalog = catalog_with(&["a", "b"]);
        catalog.add_favorite("a", 1).unwrap();

        catalog
            .replace_all(&[Station::new("b", "Station b", "http://example.com")])
            .unwrap();
        assert!(catalog.favorites().unwrap().is_empty());
        assert!(catalog.is_favorite("a").unwrap());

        catalog
            .insert(&Station::new("a", "Station a", "http://example.com"))
            .unwrap();
        assert_eq!(ids(&catalog.favorites().unwrap()), vec!["a"]);
    }

    #[test]
    fn play_history_keeps_latest_play() {
        let catalog = catalog_with(&["a", "b", "c"]);

        catalog.record_play("a", 10).unwrap();
        catalog.record_play("b", 20).unwrap();
        catalog.record_play("a", 30).unwrap();

        assert_eq!(ids(&catalog.recently_played(10).unwrap()), vec!["a", "b"]);
        assert_eq!(ids(&catalog.recently_played(1).unwrap()), vec!["a"]);
        assert!(catalog.record_play("zzz", 40).is_err());
    }

    #[test]
    fn prefixed_columns_cover_all_columns() {
        let columns = prefixed_columns("s");
        assert!(columns.starts_with("s.station_uuid, s.change_uuid"));
        assert!(columns.ends_with("s.lastclicktime"));
    }
}
