// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background update worker
//!
//! Owns both catalogs and the progress record, and makes sure only one
//! update runs per process. Other processes learn about a running update
//! from the progress record and its heartbeat, and cancel it by marking the
//! record cancelled.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::api::CANDIDATE_SERVERS;
use crate::config::worker::{
    CANCEL_POLL_MS, HEARTBEAT_TIMEOUT_MS, RECENT_FOREGROUND_MS, RESUME_WINDOW_MS, STALE_UPDATE_MS,
};
use crate::config::DataPaths;
use crate::directory::select_server;
use crate::error::WorkerError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, ProgressReporter, SharedProgressReporter};
use crate::state::{ProgressRecord, ProgressStore, now_ms};
use crate::sync::{Catalogs, ReplacePolicy, StopSignal, SyncOptions, SyncOutcome, sync_catalog};

/// Tunables for a [`SyncWorker`]
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Directory servers to choose from
    pub hosts: Vec<String>,
    pub options: SyncOptions,
    /// How often a running update re-reads the progress record
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            hosts: CANDIDATE_SERVERS.iter().map(|h| h.to_string()).collect(),
            options: SyncOptions::default(),
            poll_interval: Duration::from_millis(CANCEL_POLL_MS),
        }
    }
}

struct WorkerInner<C> {
    client: C,
    paths: DataPaths,
    settings: WorkerSettings,
    main: Catalog,
    staging: Catalog,
    progress: ProgressStore,
    lock: Mutex<()>,
    stop: StopSignal,
}

/// Runs catalog updates and answers questions about them
pub struct SyncWorker<C> {
    inner: Arc<WorkerInner<C>>,
}

impl<C> Clone for SyncWorker<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: HttpClient + 'static> SyncWorker<C> {
    /// Open the catalogs and progress record under `paths`
    pub fn open(client: C, paths: DataPaths, settings: WorkerSettings) -> Result<Self, WorkerError> {
        let main = Catalog::open(&paths.main_db())?;
        let staging = Catalog::open(&paths.staging_db())?;
        let progress = ProgressStore::open(paths.progress_file())?;

        Ok(Self {
            inner: Arc::new(WorkerInner {
                client,
                paths,
                settings,
                main,
                staging,
                progress,
                lock: Mutex::new(()),
                stop: StopSignal::new(),
            }),
        })
    }

    /// The catalog used for browsing
    pub fn catalog(&self) -> &Catalog {
        &self.inner.main
    }

    pub fn paths(&self) -> &DataPaths {
        &self.inner.paths
    }

    /// Snapshot of the progress record
    pub fn progress(&self) -> Result<ProgressRecord, WorkerError> {
        Ok(self.inner.progress.load()?)
    }

    /// Record that a user-facing command just ran
    pub fn touch_foreground(&self) -> Result<(), WorkerError> {
        self.inner.progress.touch_foreground(now_ms())?;
        Ok(())
    }

    /// Run one update to completion in the current task
    ///
    /// An update interrupted less than half an hour ago is resumed from the
    /// staging catalog. Every reported event is also written to the
    /// progress record.
    pub async fn run(
        &self,
        policy: &dyn ReplacePolicy,
        reporter: SharedProgressReporter,
    ) -> Result<SyncOutcome, WorkerError> {
        let _guard = self
            .inner
            .lock
            .try_lock()
            .map_err(|_| WorkerError::AlreadyUpdating)?;

        let result = self.run_locked(policy, reporter).await;
        // A pause or cancel issued before this run started applied to it
        self.inner.stop.clear();
        result
    }

    async fn run_locked(
        &self,
        policy: &dyn ReplacePolicy,
        reporter: SharedProgressReporter,
    ) -> Result<SyncOutcome, WorkerError> {
        let inner = &self.inner;

        let start = inner.progress.begin(now_ms(), RESUME_WINDOW_MS)?;
        let reporter: SharedProgressReporter = Arc::new(PersistingReporter {
            store: inner.progress.clone(),
            inner: reporter,
        });

        let sync = self.sync(policy, reporter.clone(), start.resumed);
        let outcome = tokio::select! {
            outcome = sync => outcome,
            never = watch_for_cancel(
                &inner.progress,
                start.update_id,
                &inner.stop,
                inner.settings.poll_interval,
            ) => match never {},
        };

        match outcome {
            Ok(outcome) => {
                match &outcome {
                    SyncOutcome::Replaced { stations, .. } => {
                        let message = ProgressEvent::Completed {
                            stations: *stations,
                        }
                        .message();
                        inner.progress.finish(&message)?;
                    }
                    SyncOutcome::KeptExisting { staged, main } => {
                        let message = ProgressEvent::KeptExisting {
                            staged: *staged,
                            main: *main,
                        }
                        .message();
                        inner.progress.finish(&message)?;
                    }
                    SyncOutcome::Interrupted { staged, total } => {
                        info!(staged, total, "update interrupted, left resumable");
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                let error = e.to_string();
                warn!(error = %error, "update failed");
                reporter.report(ProgressEvent::Failed {
                    error: error.clone(),
                });
                inner.progress.fail(&error)?;
                Err(e)
            }
        }
    }

    async fn sync(
        &self,
        policy: &dyn ReplacePolicy,
        reporter: SharedProgressReporter,
        resume: bool,
    ) -> Result<SyncOutcome, WorkerError> {
        let inner = &self.inner;

        reporter.report(ProgressEvent::CheckingNetwork);
        let cache_path = inner.paths.probe_cache_file();
        let server = select_server(
            &inner.client,
            &inner.settings.hosts,
            Some(&cache_path),
            now_ms(),
        )
        .await?;
        reporter.report(ProgressEvent::ServerSelected {
            server: server.to_string(),
        });

        let options = SyncOptions {
            resume,
            ..inner.settings.options.clone()
        };
        let catalogs = Catalogs {
            main: &inner.main,
            staging: &inner.staging,
        };

        let outcome = sync_catalog(
            &inner.client,
            &server,
            catalogs,
            &options,
            reporter,
            policy,
            &inner.stop,
        )
        .await?;
        Ok(outcome)
    }

    /// Spawn [`run`](Self::run) on the runtime unless an update is active
    pub fn start(
        &self,
        policy: Arc<dyn ReplacePolicy>,
        reporter: SharedProgressReporter,
    ) -> Result<JoinHandle<Result<SyncOutcome, WorkerError>>, WorkerError> {
        if self.is_updating(now_ms())? {
            return Err(WorkerError::AlreadyUpdating);
        }

        let worker = self.clone();
        Ok(tokio::spawn(async move {
            worker.run(policy.as_ref(), reporter).await
        }))
    }

    /// Whether an update is running at `now_ms`
    ///
    /// An update is running when this process holds it or its worker
    /// heartbeat is recent. Otherwise the record is cleared when it is older
    /// than an hour, or when no foreground activity happened for five
    /// minutes. Clearing only fixes the display, it never stops a worker.
    pub fn is_updating(&self, now_ms: i64) -> Result<bool, WorkerError> {
        let inner = &self.inner;
        let held_here = inner.lock.try_lock().is_err();
        let record = inner.progress.load()?;

        match liveness(&record, now_ms, held_here) {
            Liveness::Idle => Ok(false),
            Liveness::Running => {
                debug!(update_id = record.update_id, held_here, "update running");
                Ok(true)
            }
            Liveness::Abandoned => {
                let update_id = record.update_id;
                // A heartbeat may have landed since the load above
                let record = inner.progress.update(|record| {
                    if liveness(record, now_ms, held_here) == Liveness::Abandoned {
                        record.is_updating = false;
                    }
                })?;
                if record.is_updating {
                    return Ok(true);
                }
                info!(update_id, "clearing abandoned update");
                Ok(false)
            }
        }
    }

    /// Stop a running update and clear the record
    ///
    /// Works across processes: the worker running the update sees the
    /// cancel mark on its next poll.
    pub fn cancel(&self) -> Result<(), WorkerError> {
        self.inner.stop.raise();
        self.inner.progress.cancel()?;
        info!("update cancelled");
        Ok(())
    }

    /// Stop a running update but keep it resumable
    pub fn pause(&self) {
        self.inner.stop.raise();
    }
}

/// Writes every event to the progress record before passing it on
struct PersistingReporter {
    store: ProgressStore,
    inner: SharedProgressReporter,
}

impl ProgressReporter for PersistingReporter {
    fn report(&self, event: ProgressEvent) {
        let message = event.message();
        let result = match event.counts() {
            Some((current, total)) => {
                self.store
                    .record_progress(&message, current as u64, total as u64)
            }
            None => self.store.record_message(&message),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist progress");
        }

        self.inner.report(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Idle,
    Running,
    Abandoned,
}

fn liveness(record: &ProgressRecord, now_ms: i64, held_here: bool) -> Liveness {
    if !record.is_updating {
        return Liveness::Idle;
    }
    if held_here || now_ms - record.worker_heartbeat_time < HEARTBEAT_TIMEOUT_MS {
        return Liveness::Running;
    }
    if now_ms - record.update_start_time >= STALE_UPDATE_MS {
        return Liveness::Abandoned;
    }
    if now_ms - record.app_last_foreground_time < RECENT_FOREGROUND_MS {
        return Liveness::Running;
    }
    Liveness::Abandoned
}

/// Heartbeat update `update_id` and raise `stop` once it is cancelled or
/// replaced by another update
async fn watch_for_cancel(
    store: &ProgressStore,
    update_id: i64,
    stop: &StopSignal,
    poll_interval: Duration,
) -> Infallible {
    loop {
        tokio::time::sleep(poll_interval).await;

        match store.heartbeat(update_id, now_ms()) {
            Ok(record) if record.is_cancelled(update_id) || record.update_id != update_id => {
                if !stop.is_raised() {
                    info!(update_id, "update cancelled through progress record");
                    stop.raise();
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "progress record unreadable while watching"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::Station;
    use crate::error::DirectoryError;
    use crate::progress::{NoopReporter, RecordingReporter};
    use crate::sync::{AlwaysReplace, KeepLarger};
    use crate::testing::MockDirectory;
    use tempfile::{TempDir, tempdir};

    const MINUTE: i64 = 60 * 1000;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            hosts: vec!["mock.example".to_string()],
            options: SyncOptions {
                page_size: 10,
                flush_every: 2,
                max_attempts: 2,
                retry_delay: Duration::from_millis(1),
                pause: Duration::ZERO,
                resume: false,
            },
            poll_interval: Duration::from_millis(1),
        }
    }

    fn worker(directory: MockDirectory) -> (TempDir, SyncWorker<MockDirectory>) {
        let dir = tempdir().unwrap();
        let worker = SyncWorker::open(directory, DataPaths::new(dir.path()), settings()).unwrap();
        (dir, worker)
    }

    #[tokio::test]
    async fn run_replaces_catalog_and_finishes_record() {
        let (_dir, worker) = worker(MockDirectory::with_stations(25));

        let outcome = worker
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                stations: 25,
                skipped_pages: 0
            }
        );
        assert_eq!(worker.catalog().count().unwrap(), 25);

        let record = worker.progress().unwrap();
        assert!(!record.is_updating);
        assert_eq!(record.message, "Update complete: 25 stations");
        assert_eq!((record.current, record.total), (25, 25));
        assert_eq!(record.percentage(), 100);
        assert!(worker.paths().probe_cache_file().exists());
    }

    #[tokio::test]
    async fn run_records_failure() {
        let (_dir, worker) = worker(MockDirectory::with_stations(25).unreachable("mock.example"));

        let result = worker.run(&AlwaysReplace, NoopReporter::shared()).await;

        assert!(matches!(
            result,
            Err(WorkerError::Directory(DirectoryError::NoReachableServer))
        ));
        let record = worker.progress().unwrap();
        assert!(!record.is_updating);
        assert!(record.message.starts_with("Update failed:"));
    }

    #[tokio::test]
    async fn run_resumes_recent_interrupted_update() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());

        let staged: Vec<Station> = (0..20)
            .map(|i| Station::new(format!("station-{i}"), format!("Station {i}"), "http://s"))
            .collect();
        Catalog::open(&paths.staging_db())
            .unwrap()
            .insert_all(&staged)
            .unwrap();
        let store = ProgressStore::open(paths.progress_file()).unwrap();
        store.begin(now_ms() - MINUTE, RESUME_WINDOW_MS).unwrap();
        store.record_progress("Downloaded 20 of 45 stations", 20, 45).unwrap();

        let worker =
            SyncWorker::open(MockDirectory::with_stations(45), paths, settings()).unwrap();
        let outcome = worker
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                stations: 45,
                skipped_pages: 0
            }
        );
        let pages = worker.inner.client.page_requests();
        assert_eq!(pages.len(), 3);
        assert!(pages[0].contains("offset=20"));
    }

    #[tokio::test]
    async fn run_stops_when_cancelled_elsewhere() {
        let directory = MockDirectory::with_stations(400);
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let mut settings = settings();
        settings.options.pause = Duration::from_millis(2);
        let worker = SyncWorker::open(directory, paths.clone(), settings).unwrap();

        let other_process = ProgressStore::open(paths.progress_file()).unwrap();
        let canceller = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if let Ok(record) = other_process.load()
                    && record.current >= 20
                {
                    other_process.cancel().unwrap();
                    break;
                }
            }
        });

        let outcome = worker
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();
        canceller.await.unwrap();

        match outcome {
            SyncOutcome::Interrupted { staged, total } => {
                assert!(staged >= 20);
                assert!(staged < total);
                assert_eq!(total, 400);
            }
            other => panic!("expected interruption, got {other:?}"),
        }
        assert!(!worker.progress().unwrap().is_updating);
        assert_eq!(worker.catalog().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn status_check_from_other_process_leaves_run_alone() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let mut settings = settings();
        settings.options.pause = Duration::from_millis(2);
        let running =
            SyncWorker::open(MockDirectory::with_stations(400), paths.clone(), settings.clone())
                .unwrap();
        let observer =
            SyncWorker::open(MockDirectory::with_stations(0), paths.clone(), settings).unwrap();

        let checker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if let Ok(record) = observer.progress()
                    && record.current >= 20
                {
                    return observer.is_updating(now_ms()).unwrap();
                }
            }
        });

        let outcome = running
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();
        let reported = checker.await.unwrap();

        assert!(reported);
        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                stations: 400,
                skipped_pages: 0
            }
        );
    }

    #[tokio::test]
    async fn clearing_an_abandoned_record_does_not_stop_run() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let mut settings = settings();
        settings.options.pause = Duration::from_millis(2);
        let worker =
            SyncWorker::open(MockDirectory::with_stations(200), paths.clone(), settings).unwrap();

        let other_process = ProgressStore::open(paths.progress_file()).unwrap();
        let resetter = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if let Ok(record) = other_process.load()
                    && record.current >= 20
                {
                    other_process.reset().unwrap();
                    break;
                }
            }
        });

        let outcome = worker
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();
        resetter.await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                stations: 200,
                skipped_pages: 0
            }
        );
    }

    #[tokio::test]
    async fn pause_before_run_applies_once() {
        let (_dir, worker) = worker(MockDirectory::with_stations(45));

        worker.pause();
        let outcome = worker
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Interrupted { .. }));
        assert!(!worker.inner.stop.is_raised());
        assert!(worker.progress().unwrap().is_updating);

        let outcome = worker
            .run(&KeepLarger, NoopReporter::shared())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                stations: 45,
                skipped_pages: 0
            }
        );
    }

    #[tokio::test]
    async fn resumed_run_reports_staged_count_once() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());

        let staged: Vec<Station> = (0..20)
            .map(|i| Station::new(format!("station-{i}"), format!("Station {i}"), "http://s"))
            .collect();
        Catalog::open(&paths.staging_db())
            .unwrap()
            .insert_all(&staged)
            .unwrap();
        let store = ProgressStore::open(paths.progress_file()).unwrap();
        store.begin(now_ms() - MINUTE, RESUME_WINDOW_MS).unwrap();
        store.record_progress("Skipped page 3", 30, 45).unwrap();

        let worker =
            SyncWorker::open(MockDirectory::with_stations(45), paths, settings()).unwrap();
        let recorder = Arc::new(RecordingReporter::default());
        worker.run(&KeepLarger, recorder.clone()).await.unwrap();

        let resumed: Vec<_> = recorder
            .events()
            .into_iter()
            .filter(|event| matches!(event, ProgressEvent::Resumed { .. }))
            .collect();
        assert_eq!(
            resumed,
            vec![ProgressEvent::Resumed {
                staged: 20,
                total: 45
            }]
        );
    }

    #[tokio::test]
    async fn second_run_in_process_is_refused() {
        let (_dir, worker) = worker(MockDirectory::with_stations(5));
        let _guard = worker.inner.lock.try_lock().unwrap();

        let result = worker.run(&KeepLarger, NoopReporter::shared()).await;
        assert!(matches!(result, Err(WorkerError::AlreadyUpdating)));
    }

    #[tokio::test]
    async fn start_spawns_update() {
        let (_dir, worker) = worker(MockDirectory::with_stations(15));

        let handle = worker
            .start(Arc::new(AlwaysReplace), NoopReporter::shared())
            .unwrap();
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                stations: 15,
                skipped_pages: 0
            }
        );
    }

    #[tokio::test]
    async fn start_refuses_while_updating() {
        let (_dir, worker) = worker(MockDirectory::with_stations(15));
        let now = now_ms();
        worker.inner.progress.begin(now, RESUME_WINDOW_MS).unwrap();
        worker.inner.progress.touch_foreground(now).unwrap();

        let result = worker.start(Arc::new(AlwaysReplace), NoopReporter::shared());
        assert!(matches!(result, Err(WorkerError::AlreadyUpdating)));
    }

    #[test]
    fn is_updating_false_when_idle() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        assert!(!worker.is_updating(now_ms()).unwrap());
    }

    #[test]
    fn is_updating_trusts_recent_foreground() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let now = 10 * MINUTE;
        worker.inner.progress.begin(now - MINUTE, RESUME_WINDOW_MS).unwrap();
        worker.inner.progress.touch_foreground(now - 2 * MINUTE).unwrap();

        assert!(worker.is_updating(now).unwrap());
        assert!(worker.progress().unwrap().is_updating);
    }

    #[test]
    fn is_updating_clears_orphaned_update() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let now = 10 * MINUTE;
        worker.inner.progress.begin(now - MINUTE, RESUME_WINDOW_MS).unwrap();
        worker.inner.progress.touch_foreground(now - 6 * MINUTE).unwrap();

        assert!(!worker.is_updating(now).unwrap());
        assert!(!worker.progress().unwrap().is_updating);
    }

    #[test]
    fn is_updating_trusts_live_heartbeat() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let now = 120 * MINUTE;
        let update_id = now - 61 * MINUTE;
        worker.inner.progress.begin(update_id, RESUME_WINDOW_MS).unwrap();
        worker.inner.progress.heartbeat(update_id, now - 1_000).unwrap();

        assert!(worker.is_updating(now).unwrap());
        assert!(worker.progress().unwrap().is_updating);
    }

    #[test]
    fn is_updating_clears_stale_update_without_heartbeat() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let now = 120 * MINUTE;
        worker.inner.progress.begin(now - 61 * MINUTE, RESUME_WINDOW_MS).unwrap();
        worker.inner.progress.touch_foreground(now).unwrap();

        assert!(!worker.is_updating(now).unwrap());
        assert!(!worker.progress().unwrap().is_updating);
    }

    #[test]
    fn is_updating_keeps_long_update_held_here() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let now = 120 * MINUTE;
        worker.inner.progress.begin(now - 61 * MINUTE, RESUME_WINDOW_MS).unwrap();
        let _guard = worker.inner.lock.try_lock().unwrap();

        assert!(worker.is_updating(now).unwrap());
        assert!(worker.progress().unwrap().is_updating);
    }

    #[test]
    fn is_updating_true_while_lock_held() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let now = 10 * MINUTE;
        worker.inner.progress.begin(now - MINUTE, RESUME_WINDOW_MS).unwrap();
        let _guard = worker.inner.lock.try_lock().unwrap();

        assert!(worker.is_updating(now).unwrap());
    }

    #[test]
    fn cancel_marks_record_and_raises_stop() {
        let (_dir, worker) = worker(MockDirectory::with_stations(1));
        let start = worker.inner.progress.begin(now_ms(), RESUME_WINDOW_MS).unwrap();

        worker.cancel().unwrap();

        let record = worker.progress().unwrap();
        assert!(!record.is_updating);
        assert!(record.is_cancelled(start.update_id));
        assert!(worker.inner.stop.is_raised());
    }

    #[tokio::test]
    async fn watcher_raises_stop_on_new_update_id() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.db")).unwrap();
        store.begin(1_000, RESUME_WINDOW_MS).unwrap();
        let stop = StopSignal::new();

        let watcher = watch_for_cancel(&store, 1_000, &stop, Duration::from_millis(1));
        let replace = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            store.begin(1_000 + RESUME_WINDOW_MS, RESUME_WINDOW_MS).unwrap();
            while !stop.is_raised() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };

        tokio::select! {
            never = watcher => match never {},
            _ = replace => {}
        }
        assert!(stop.is_raised());
    }
}
