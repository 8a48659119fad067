pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod progress;
pub mod state;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use catalog::{Catalog, CategoryCount, SearchField, Station, StationOrder};
pub use config::DataPaths;
pub use directory::{ServerInfo, select_server};
pub use error::{CatalogError, DirectoryError, StateError, SyncError, WorkerError};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use state::{ProgressRecord, ProgressStore, now_ms};
pub use sync::{
    AlwaysReplace, Catalogs, KeepLarger, ReplacePolicy, StopSignal, SyncOptions, SyncOutcome,
    sync_catalog,
};
pub use worker::{SyncWorker, WorkerSettings};
