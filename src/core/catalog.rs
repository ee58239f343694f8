//! Playbook catalog.
//!
//! Discovers playbook files in a directory and keeps the current listing.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::{PlaybookEntry, PlaybookStatus};

/// File extensions recognised as playbooks when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["yml", "yaml"];

/// In-memory listing of discovered playbooks.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Entries in name order
    entries: Vec<PlaybookEntry>,

    /// Extensions (without the dot) that mark a file as a playbook
    extensions: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog matching `.yml` and `.yaml` files.
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS.iter().copied())
    }

    /// Create an empty catalog matching the given extensions.
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self { entries: Vec::new(), extensions }
    }

    /// List playbook files directly inside `dir`.
    ///
    /// Every entry is `Ready`. An unreadable directory is logged and yields
    /// an empty listing.
    pub fn scan(&self, dir: &Path) -> Vec<PlaybookEntry> {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Error reading playbooks directory");
                return Vec::new();
            }
        };

        let mut entries: Vec<PlaybookEntry> = read_dir
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                if !self.matches(&name) {
                    return None;
                }
                let path = dir.join(&name).to_string_lossy().into_owned();
                Some(PlaybookEntry::new(name, path))
            })
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(dir = %dir.display(), count = entries.len(), "Scanned playbooks");
        entries
    }

    /// Replace the listing with a fresh scan of `dir`.
    ///
    /// Equivalent to [`Catalog::scan`] followed by [`Catalog::merge`].
    pub fn rescan(&mut self, dir: &Path) -> &[PlaybookEntry] {
        let fresh = self.scan(dir);
        self.merge(fresh)
    }

    /// Replace the listing with scanned entries.
    ///
    /// Status and last run time carry over for names that are still present;
    /// entries missing from `fresh` are dropped.
    pub fn merge(&mut self, mut fresh: Vec<PlaybookEntry>) -> &[PlaybookEntry] {
        let mut previous: HashMap<String, PlaybookEntry> =
            self.entries.drain(..).map(|e| (e.name.clone(), e)).collect();

        for entry in &mut fresh {
            if let Some(old) = previous.remove(&entry.name) {
                entry.status = old.status;
                entry.last_run_time = old.last_run_time;
            }
        }

        if !previous.is_empty() {
            tracing::debug!(dropped = previous.len(), "Dropped playbooks no longer on disk");
        }

        self.entries = fresh;
        &self.entries
    }

    /// Get an empty catalog with the same extensions, for scanning.
    pub fn scanner(&self) -> Self {
        Self { entries: Vec::new(), extensions: self.extensions.clone() }
    }

    /// Install a listing restored from a snapshot.
    pub fn replace(&mut self, entries: Vec<PlaybookEntry>) {
        self.entries = entries;
    }

    /// Find an entry by exact name.
    pub fn find(&self, name: &str) -> Option<&PlaybookEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Update an entry's status and optionally its last run time.
    ///
    /// Returns `false` if no entry has that name.
    pub fn set_status(
        &mut self,
        name: &str,
        status: PlaybookStatus,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.status = status;
                if timestamp.is_some() {
                    entry.last_run_time = timestamp;
                }
                true
            }
            None => false,
        }
    }

    /// Get all entries.
    pub fn entries(&self) -> &[PlaybookEntry] {
        &self.entries
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count entries with a run in flight.
    pub fn running_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_running()).count()
    }

    /// Check whether a file name has a playbook extension.
    fn matches(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}
