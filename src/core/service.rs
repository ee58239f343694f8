//! Dashboard service.
//!
//! Owns the catalog and result store and is the only way to reach them:
//! - Listing and rescanning playbooks
//! - Triggering runs on background tasks
//! - Recording results and persisting snapshots

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::config::{ConcurrentRuns, Config};
use super::snapshot::{Snapshot, SnapshotStore};
use super::{Catalog, Executor, PlaybookEntry, PlaybookStatus, ResultStore, RunResult};

/// Errors returned when a run cannot be started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// No playbook with that name in the current catalog.
    #[error("Playbook not found: {0}")]
    NotFound(String),

    /// The playbook has a run in flight and concurrent runs are rejected.
    #[error("Playbook '{0}' is already running")]
    AlreadyRunning(String),
}

/// Health summary of the service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// playdash version
    pub version: String,

    /// Whether the service is healthy
    pub healthy: bool,

    /// Directory scanned for playbooks
    pub playbooks_dir: String,

    /// Number of playbooks in the catalog
    pub playbook_count: usize,

    /// Number of playbooks with a run in flight
    pub running_count: usize,

    /// Number of cached results
    pub result_count: usize,

    /// Service uptime in seconds
    pub uptime_secs: u64,
}

/// Mutable state shared by request handlers and run tasks.
#[derive(Debug, Default)]
struct DashboardState {
    catalog: Catalog,
    results: ResultStore,
    sequence: u64,
}

impl DashboardState {
    /// Capture the state under the next sequence number.
    fn next_snapshot(&mut self) -> Snapshot {
        self.sequence += 1;
        Snapshot {
            sequence: self.sequence,
            entries: self.catalog.entries().to_vec(),
            results: self.results.all().clone(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    playbooks_dir: PathBuf,
    scanner: Catalog,
    executor: Executor,
    concurrent_runs: ConcurrentRuns,
    snapshots: SnapshotStore,
    state: Mutex<DashboardState>,
    started_at: Instant,
}

/// Handle to the dashboard service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PlaybookService {
    inner: Arc<Inner>,
}

impl PlaybookService {
    /// Create a service from configuration without loading saved state.
    pub fn new(config: &Config) -> Self {
        let executor =
            Executor::new(config.runner.program.clone()).with_args(config.runner.args.clone());

        Self::from_parts(
            config.playbooks_dir(),
            Catalog::with_extensions(&config.playbooks.extensions),
            executor,
            config.runner.concurrent_runs,
            SnapshotStore::new(config.state.file.clone()),
        )
    }

    /// Create a service from configuration and restore saved state.
    pub fn open(config: &Config) -> Self {
        let service = Self::new(config);
        service.restore();
        service
    }

    /// Create a service from its components.
    pub fn from_parts(
        playbooks_dir: PathBuf,
        catalog: Catalog,
        executor: Executor,
        concurrent_runs: ConcurrentRuns,
        snapshots: SnapshotStore,
    ) -> Self {
        let scanner = catalog.scanner();
        let state = DashboardState { catalog, ..DashboardState::default() };

        Self {
            inner: Arc::new(Inner {
                playbooks_dir,
                scanner,
                executor,
                concurrent_runs,
                snapshots,
                state: Mutex::new(state),
                started_at: Instant::now(),
            }),
        }
    }

    /// Load the saved snapshot into the catalog and result store.
    ///
    /// Entries saved while `Running` are reset to `Ready`, since no run
    /// survives a restart.
    pub fn restore(&self) {
        let mut snapshot = self.inner.snapshots.load_or_default();

        for entry in snapshot.entries.iter_mut().filter(|e| e.is_running()) {
            tracing::warn!(playbook = %entry.name, "Run was interrupted by a restart");
            entry.status = PlaybookStatus::Ready;
        }

        let mut state = self.inner.state.lock();
        state.catalog.replace(snapshot.entries);
        state.results.replace(snapshot.results);
        state.sequence = state.sequence.max(snapshot.sequence);
    }

    /// Get the directory scanned for playbooks.
    pub fn playbooks_dir(&self) -> &Path {
        &self.inner.playbooks_dir
    }

    /// Get the state document path.
    pub fn state_file(&self) -> &Path {
        self.inner.snapshots.path()
    }

    /// Rescan the playbooks directory and return the listing.
    ///
    /// The directory is read before the state lock is taken.
    pub fn list_playbooks(&self) -> Vec<PlaybookEntry> {
        let fresh = self.inner.scanner.scan(&self.inner.playbooks_dir);
        self.inner.state.lock().catalog.merge(fresh).to_vec()
    }

    /// Get the listing without rescanning.
    pub fn playbooks(&self) -> Vec<PlaybookEntry> {
        self.inner.state.lock().catalog.entries().to_vec()
    }

    /// Find a playbook by name in the current listing.
    pub fn find(&self, name: &str) -> Option<PlaybookEntry> {
        self.inner.state.lock().catalog.find(name).cloned()
    }

    /// Get the last result for a playbook, or the not-yet-run placeholder.
    pub fn result(&self, name: &str) -> RunResult {
        self.inner.state.lock().results.get(name)
    }

    /// Start a run of `name` on a background task.
    ///
    /// The name must be in the current catalog. Returns as soon as the task is
    /// spawned; the handle resolves to the recorded result. Must be called from
    /// within a tokio runtime.
    pub fn trigger_run(&self, name: &str) -> Result<JoinHandle<RunResult>, ServiceError> {
        let path = self.begin_run(name)?;
        let service = self.clone();
        let name = name.to_string();

        Ok(tokio::spawn(async move { service.execute(name, path).await }))
    }

    /// Run `name` to completion on the current task.
    pub async fn run_now(&self, name: &str) -> Result<RunResult, ServiceError> {
        let path = self.begin_run(name)?;
        Ok(self.execute(name.to_string(), path).await)
    }

    /// Get a health summary.
    pub fn status(&self) -> ServiceStatus {
        let state = self.inner.state.lock();
        ServiceStatus {
            version: crate::VERSION.to_string(),
            healthy: true,
            playbooks_dir: self.inner.playbooks_dir.display().to_string(),
            playbook_count: state.catalog.len(),
            running_count: state.catalog.running_count(),
            result_count: state.results.len(),
            uptime_secs: self.inner.started_at.elapsed().as_secs(),
        }
    }

    /// Validate a trigger and mark the entry as running.
    fn begin_run(&self, name: &str) -> Result<PathBuf, ServiceError> {
        let mut state = self.inner.state.lock();

        let entry =
            state.catalog.find(name).ok_or_else(|| ServiceError::NotFound(name.to_string()))?;

        if entry.is_running() {
            match self.inner.concurrent_runs {
                ConcurrentRuns::Reject => {
                    tracing::info!(playbook = name, "Rejecting trigger, run already in flight");
                    return Err(ServiceError::AlreadyRunning(name.to_string()));
                }
                ConcurrentRuns::Allow => {
                    tracing::warn!(playbook = name, "Starting overlapping run");
                }
            }
        }

        let path = PathBuf::from(&entry.path);
        state.catalog.set_status(name, PlaybookStatus::Running, Some(Utc::now()));
        Ok(path)
    }

    /// Run the playbook, record the result, and persist.
    async fn execute(&self, name: String, path: PathBuf) -> RunResult {
        let result = self.inner.executor.run(&name, &path).await;
        self.complete(&name, result.clone()).await;
        result
    }

    /// Record a finished run and write a snapshot.
    async fn complete(&self, name: &str, result: RunResult) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            let status = PlaybookStatus::from_success(result.success);
            state.results.put(name, result);
            if !state.catalog.set_status(name, status, Some(Utc::now())) {
                tracing::debug!(playbook = name, "Finished playbook is no longer in the catalog");
            }
            state.next_snapshot()
        };

        self.persist(snapshot).await;
    }

    /// Write a snapshot on the blocking pool, logging failures.
    async fn persist(&self, snapshot: Snapshot) {
        let inner = Arc::clone(&self.inner);
        let sequence = snapshot.sequence;

        match tokio::task::spawn_blocking(move || inner.snapshots.save(&snapshot)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(sequence, error = %e, "Failed to save state"),
            Err(e) => tracing::error!(sequence, error = %e, "State save task failed"),
        }
    }
}
