//! Core types and functionality for playdash.
//!
//! This module contains the run lifecycle: the playbook catalog, the runner,
//! the result cache, saved state, and the service that ties them together.

pub mod catalog;
pub mod config;
pub mod executor;
mod playbook;
mod results;
pub mod service;
pub mod snapshot;

pub use catalog::Catalog;
pub use config::{ConcurrentRuns, Config};
pub use executor::{ExecutionResult, Executor};
pub use playbook::{
    format_duration, PlaybookEntry, PlaybookStatus, RunResult, NO_RESULTS_PLACEHOLDER,
};
pub use results::ResultStore;
pub use service::{PlaybookService, ServiceError, ServiceStatus};
pub use snapshot::{LoadedSnapshot, Snapshot, SnapshotError, SnapshotStore};
