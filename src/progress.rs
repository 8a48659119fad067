use std::sync::Arc;

/// Events emitted during a catalog update for progress reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Candidate servers are being probed
    CheckingNetwork,

    /// A directory server was chosen
    ServerSelected { server: String },

    /// The station total is being requested
    FetchingTotal,

    /// The directory reported its station total
    TotalKnown {
        total: usize,
        /// Stations currently in the main catalog
        main_count: usize,
    },

    /// A fresh download into an empty staging catalog begins
    StagingStarted { total: usize },

    /// An interrupted download continues from the staging catalog
    Resumed { staged: usize, total: usize },

    /// A page of stations was downloaded
    PageStored {
        /// Zero-based page index
        page: usize,
        pages: usize,
        downloaded: usize,
        total: usize,
    },

    /// A page failed every attempt and was left out
    PageSkipped {
        page: usize,
        pages: usize,
        /// Progress assumed after skipping the page
        estimated: usize,
        total: usize,
        error: String,
    },

    /// The staging catalog is replacing the main catalog
    Swapping { staged: usize, main: usize },

    /// The update finished and the main catalog was replaced
    Completed { stations: usize },

    /// The staged catalog was smaller and the existing one was kept
    KeptExisting { staged: usize, main: usize },

    /// The update was stopped before finishing
    Interrupted { staged: usize, total: usize },

    /// The update ended with an error
    Failed { error: String },
}

impl ProgressEvent {
    /// Human readable status line for this event
    pub fn message(&self) -> String {
        match self {
            Self::CheckingNetwork => "Checking network connection...".to_string(),
            Self::ServerSelected { server } => format!("Using server {server}"),
            Self::FetchingTotal => "Getting station count...".to_string(),
            Self::TotalKnown { total, .. } => format!("Found {total} stations"),
            Self::StagingStarted { .. } => "Downloading stations...".to_string(),
            Self::Resumed { staged, total } => {
                format!("Resuming download at {staged} of {total} stations")
            }
            Self::PageStored {
                downloaded, total, ..
            } => format!("Downloaded {downloaded} of {total} stations"),
            Self::PageSkipped { page, pages, .. } => {
                format!("Skipped page {} of {pages}", page + 1)
            }
            Self::Swapping { .. } => "Saving stations...".to_string(),
            Self::Completed { stations } => format!("Update complete: {stations} stations"),
            Self::KeptExisting { staged, main } => format!(
                "Kept existing {main} stations (download had only {staged})"
            ),
            Self::Interrupted { staged, total } => {
                format!("Update paused at {staged} of {total} stations")
            }
            Self::Failed { error } => format!("Update failed: {error}"),
        }
    }

    /// `(current, total)` counts carried by this event, if any
    pub fn counts(&self) -> Option<(usize, usize)> {
        match self {
            Self::TotalKnown { total, .. } | Self::StagingStarted { total } => Some((0, *total)),
            Self::Resumed { staged, total } | Self::Interrupted { staged, total } => {
                Some((*staged, *total))
            }
            Self::PageStored {
                downloaded, total, ..
            } => Some((*downloaded, *total)),
            Self::PageSkipped {
                estimated, total, ..
            } => Some((*estimated, *total)),
            Self::Swapping { staged, .. } => Some((*staged, *staged)),
            Self::Completed { stations } => Some((*stations, *stations)),
            Self::CheckingNetwork
            | Self::ServerSelected { .. }
            | Self::FetchingTotal
            | Self::KeptExisting { .. }
            | Self::Failed { .. } => None,
        }
    }
}

/// Trait for reporting progress events during a catalog update.
///
/// Implementations can use this to display progress bars, log messages,
/// or persist the state for other processes.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Collects every event, for assertions in tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
