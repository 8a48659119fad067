// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use rusqlite::params;
use serde::Serialize;

use crate::error::CatalogError;

use super::station::{STATION_COLUMNS, Station};
use super::store::Catalog;

/// Row cap for whole-catalog listings
pub const LIST_LIMIT: usize = 1000;

/// Row cap for country, language and tag listings
pub const FILTER_LIMIT: usize = 500;

/// Row cap for searches
pub const SEARCH_LIMIT: usize = 100;

/// Sort order for catalog listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationOrder {
    /// Alphabetical by name
    Name,
    /// Most clicked first
    #[default]
    ClickCount,
    /// Most voted first
    Votes,
    /// Most recently changed first
    LastChange,
    /// Most recently clicked (directory-wide) first
    LastClick,
}

impl StationOrder {
    fn order_by(self) -> &'static str {
        match self {
            StationOrder::Name => "name ASC",
            StationOrder::ClickCount => "clickcount DESC",
            StationOrder::Votes => "votes DESC",
            StationOrder::LastChange => "lastchangetime DESC",
            StationOrder::LastClick => "lastclicktime DESC",
        }
    }
}

/// Which columns a search looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    #[default]
    All,
    Name,
    Tags,
    Country,
    Language,
}

/// A category value with the number of stations carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub station_count: usize,
}

// Comma-boundary tag match: exact, first, last or middle entry
const TAG_MATCH: &str = "(tags = ?1 \
     OR tags LIKE ?2 || ',%' ESCAPE '\\' \
     OR tags LIKE '%,' || ?2 ESCAPE '\\' \
     OR tags LIKE '%,' || ?2 || ',%' ESCAPE '\\')";

impl Catalog {
    /// List stations in the given order
    pub fn stations(&self, order: StationOrder, limit: usize) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations ORDER BY {} LIMIT ?1",
            order.order_by()
        );
        self.query_stations(&sql, [limit as i64])
    }

    pub fn by_country(&self, country: &str) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations WHERE country = ?1 \
             ORDER BY clickcount DESC LIMIT ?2"
        );
        self.query_stations(&sql, params![country, FILTER_LIMIT as i64])
    }

    pub fn by_country_code(
        &self,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations WHERE countrycode = ?1 COLLATE NOCASE \
             ORDER BY clickcount DESC LIMIT ?2"
        );
        self.query_stations(&sql, params![country_code, limit as i64])
    }

    pub fn by_language(&self, language: &str, limit: usize) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations WHERE language = ?1 \
             ORDER BY clickcount DESC LIMIT ?2"
        );
        self.query_stations(&sql, params![language, limit as i64])
    }

    pub fn by_language_and_country(
        &self,
        language: &str,
        country_code: &str,
        limit: usize,
    ) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations \
             WHERE language = ?1 AND countrycode = ?2 COLLATE NOCASE \
             ORDER BY clickcount DESC LIMIT ?3"
        );
        self.query_stations(&sql, params![language, country_code, limit as i64])
    }

    /// Stations carrying exactly this tag
    pub fn by_tag(&self, tag: &str, limit: usize) -> Result<Vec<Station>, CatalogError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations WHERE {TAG_MATCH} \
             ORDER BY clickcount DESC LIMIT ?3"
        );
        self.query_stations(&sql, params![tag, like_escape(tag), limit as i64])
    }

    /// Distinct non-empty countries, ascending
    pub fn countries(&self) -> Result<Vec<String>, CatalogError> {
        self.query_strings(
            "SELECT DISTINCT country FROM radio_stations WHERE country != '' ORDER BY country ASC",
            [],
        )
    }

    /// Distinct non-empty languages, ascending
    pub fn languages(&self) -> Result<Vec<String>, CatalogError> {
        self.query_strings(
            "SELECT DISTINCT language FROM radio_stations WHERE language != '' ORDER BY language ASC",
            [],
        )
    }

    pub fn countries_with_count(&self) -> Result<Vec<CategoryCount>, CatalogError> {
        self.grouped_counts("country")
    }

    pub fn languages_with_count(&self) -> Result<Vec<CategoryCount>, CatalogError> {
        self.grouped_counts("language")
    }

    /// Every tag with the number of stations using it, most used first
    ///
    /// Tags are compared case-insensitively and reported in lowercase.
    pub fn tags_with_count(&self) -> Result<Vec<CategoryCount>, CatalogError> {
        let tag_strings = self.query_strings(
            "SELECT tags FROM radio_stations WHERE tags IS NOT NULL AND tags != '' AND tags != ','",
            [],
        )?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for tags in &tag_strings {
            let mut seen = Vec::new();
            for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                let tag = tag.to_lowercase();
                // A station listing a tag twice still counts once
                if !seen.contains(&tag) {
                    *counts.entry(tag.clone()).or_default() += 1;
                    seen.push(tag);
                }
            }
        }

        let mut result: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(name, station_count)| CategoryCount {
                name,
                station_count,
            })
            .collect();
        result.sort_by(|a, b| {
            b.station_count
                .cmp(&a.station_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(result)
    }

    pub fn count_by_tag(&self, tag: &str) -> Result<usize, CatalogError> {
        let sql = format!("SELECT COUNT(*) FROM radio_stations WHERE {TAG_MATCH}");
        let count: i64 = self
            .conn()
            .query_row(&sql, params![tag, like_escape(tag)], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_by_country(&self, country: &str) -> Result<usize, CatalogError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM radio_stations WHERE country = ?1",
            [country],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_by_language(&self, language: &str) -> Result<usize, CatalogError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM radio_stations WHERE language = ?1",
            [language],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Substring search, most clicked first
    ///
    /// Name, country and language match anywhere; tags match whole entries.
    pub fn search(&self, query: &str, field: SearchField) -> Result<Vec<Station>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let name = "name LIKE '%' || ?2 || '%' ESCAPE '\\'";
        let country = "country LIKE '%' || ?2 || '%' ESCAPE '\\'";
        let language = "language LIKE '%' || ?2 || '%' ESCAPE '\\'";
        let condition = match field {
            SearchField::All => format!("{name} OR {TAG_MATCH} OR {country} OR {language}"),
            SearchField::Name => format!("{name} OR {TAG_MATCH}"),
            SearchField::Tags => TAG_MATCH.to_string(),
            SearchField::Country => country.to_string(),
            SearchField::Language => language.to_string(),
        };

        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations WHERE {condition} \
             ORDER BY clickcount DESC LIMIT ?3"
        );
        self.query_stations(&sql, params![query, like_escape(query), SEARCH_LIMIT as i64])
    }

    /// Full-text prefix search over name, tags, country and language
    pub fn search_fast(&self, query: &str) -> Result<Vec<Station>, CatalogError> {
        let Some(expression) = fts_expression(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {STATION_COLUMNS} FROM radio_stations WHERE rowid IN \
             (SELECT rowid FROM radio_stations_fts WHERE radio_stations_fts MATCH ?1) \
             ORDER BY clickcount DESC LIMIT ?2"
        );
        self.query_stations(&sql, params![expression, SEARCH_LIMIT as i64])
    }

    fn grouped_counts(&self, column: &str) -> Result<Vec<CategoryCount>, CatalogError> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM radio_stations WHERE {column} != '' \
             GROUP BY {column} ORDER BY {column} ASC"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let counts = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    name: row.get(0)?,
                    station_count: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

/// Escape LIKE wildcards so user input matches literally
fn like_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Turn free text into an FTS5 expression of quoted prefix terms
///
/// Returns `None` when nothing searchable is left.
pub fn fts_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
