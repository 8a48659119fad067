// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to the station directory service
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to decode response from {url}: {source}")]
    DecodeFailed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response from {url} has no station total")]
    MissingStationTotal { url: String },

    #[error("No directory server is reachable")]
    NoReachableServer,
}

/// Errors that can occur in a SQLite station catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to open catalog {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to create catalog directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Station {0} is not in the catalog")]
    UnknownStation(String),
}

/// Errors that can occur when reading or writing persisted state files
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),

    #[error("Failed to open progress database {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Progress database query failed: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Errors for a single catalog sync run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("No station data was downloaded")]
    NoStationsDownloaded,
}

/// Top-level errors for the sync worker
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("An update is already in progress")]
    AlreadyUpdating,
}
