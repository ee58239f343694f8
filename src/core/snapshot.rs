//! On-disk snapshot of the catalog and result store.
//!
//! The document is versioned JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "sequence": 7,
//!   "playbooks": [{ "name": "deploy.yml", "path": "...", "lastRunTime": "...", "status": "Success" }],
//!   "cache": { "deploy.yml": { "playbookName": "deploy.yml", "output": "...", "success": true, "runTime": "1.2s" } }
//! }
//! ```
//!
//! Loading is tolerant: `playbooks` and `cache` are parsed independently and
//! element by element, so one bad record never discards the rest. Documents
//! without a `version` are the legacy layout, which has the same fields.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::{PlaybookEntry, RunResult};

/// Schema version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Default location of the state document.
pub const DEFAULT_STATE_FILE: &str = "playbook_state.json";

/// Errors from reading or writing the state document.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not a JSON object.
    #[error("Malformed state document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failed.
    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Catalog listing and result cache at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Monotonic counter, bumped for every state change that is saved
    pub sequence: u64,

    /// Catalog entries in listing order
    pub entries: Vec<PlaybookEntry>,

    /// Most recent result per playbook name
    pub results: BTreeMap<String, RunResult>,
}

/// A snapshot read back from disk.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// The recovered state
    pub snapshot: Snapshot,

    /// Schema version found in the document (0 for legacy documents)
    pub version: u32,

    /// Parts of the document that were discarded
    pub warnings: Vec<String>,
}

/// Reads and writes the state document at a fixed path.
#[derive(Debug)]
pub struct SnapshotStore {
    /// Path to the state document
    path: PathBuf,

    /// Sequence of the newest snapshot on disk; held while writing
    last_written: Mutex<u64>,
}

impl SnapshotStore {
    /// Create a store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), last_written: Mutex::new(0) }
    }

    /// Get the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document.
    ///
    /// Returns `Ok(None)` when there is no document yet.
    pub fn load(&self) -> Result<Option<LoadedSnapshot>, SnapshotError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SnapshotError::Io { path: self.path.clone(), source }),
        };

        let loaded = decode(&content)
            .map_err(|source| SnapshotError::Malformed { path: self.path.clone(), source })?;

        let mut last_written = self.last_written.lock();
        *last_written = (*last_written).max(loaded.snapshot.sequence);

        Ok(Some(loaded))
    }

    /// Read the document, degrading to empty state on any failure.
    pub fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(Some(loaded)) => {
                for warning in &loaded.warnings {
                    tracing::warn!(path = %self.path.display(), "{}", warning);
                }
                if loaded.version > SNAPSHOT_VERSION {
                    tracing::warn!(
                        path = %self.path.display(),
                        version = loaded.version,
                        supported = SNAPSHOT_VERSION,
                        "State document is newer than this build; loading known fields"
                    );
                }
                tracing::info!(
                    path = %self.path.display(),
                    playbooks = loaded.snapshot.entries.len(),
                    results = loaded.snapshot.results.len(),
                    "Loaded saved state"
                );
                loaded.snapshot
            }
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "No saved state, starting fresh");
                Snapshot::default()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load saved state, starting fresh");
                Snapshot::default()
            }
        }
    }

    /// Write the snapshot, replacing the previous document.
    ///
    /// Returns `Ok(false)` without touching the file if a snapshot with the
    /// same or a newer sequence has already been written.
    pub fn save(&self, snapshot: &Snapshot) -> Result<bool, SnapshotError> {
        let mut last_written = self.last_written.lock();
        if snapshot.sequence <= *last_written && *last_written > 0 {
            tracing::debug!(
                sequence = snapshot.sequence,
                last_written = *last_written,
                "Skipping stale snapshot"
            );
            return Ok(false);
        }

        let content = encode(snapshot)?;
        write_file_atomic(&self.path, content.as_bytes())
            .map_err(|source| SnapshotError::Io { path: self.path.clone(), source })?;

        *last_written = snapshot.sequence;
        tracing::debug!(path = %self.path.display(), sequence = snapshot.sequence, "Saved state");
        Ok(true)
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    sequence: u64,
    playbooks: &'a [PlaybookEntry],
    cache: &'a BTreeMap<String, RunResult>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    version: Field<u32>,
    #[serde(default)]
    sequence: Field<u64>,
    #[serde(default)]
    playbooks: Field<Vec<Field<PlaybookEntry>>>,
    #[serde(default)]
    cache: Field<BTreeMap<String, Field<RunResult>>>,
}

/// A document field that is parsed on its own.
///
/// Deserializing a `Field` never fails once the input is valid JSON; a value
/// of the wrong shape becomes `Malformed` instead of aborting the document.
#[derive(Debug)]
enum Field<T> {
    Missing,
    Parsed(T),
    Malformed(String),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Missing
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Self::Missing);
        }
        Ok(match T::deserialize(value) {
            Ok(parsed) => Self::Parsed(parsed),
            Err(e) => Self::Malformed(e.to_string()),
        })
    }
}

/// Encode a snapshot as the current document version.
pub fn encode(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&DocumentRef {
        version: SNAPSHOT_VERSION,
        sequence: snapshot.sequence,
        playbooks: &snapshot.entries,
        cache: &snapshot.results,
    })
}

/// Decode a document, keeping every well-formed part.
///
/// Fails only if `content` is not a JSON object.
pub fn decode(content: &str) -> Result<LoadedSnapshot, serde_json::Error> {
    let document: Document = serde_json::from_str(content)?;
    let mut warnings = Vec::new();

    let version = match document.version {
        Field::Parsed(v) => v,
        Field::Missing => 0,
        Field::Malformed(e) => {
            warnings.push(format!("Ignoring malformed version: {}", e));
            0
        }
    };

    let sequence = match document.sequence {
        Field::Parsed(s) => s,
        Field::Missing => 0,
        Field::Malformed(e) => {
            warnings.push(format!("Ignoring malformed sequence: {}", e));
            0
        }
    };

    let mut entries = Vec::new();
    match document.playbooks {
        Field::Parsed(items) => {
            let mut seen = HashSet::new();
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Field::Parsed(entry) if entry.name.is_empty() => {
                        warnings.push(format!("Dropping playbook #{} with empty name", index));
                    }
                    Field::Parsed(entry) => {
                        if seen.insert(entry.name.clone()) {
                            entries.push(entry);
                        } else {
                            warnings.push(format!("Dropping duplicate playbook {}", entry.name));
                        }
                    }
                    Field::Malformed(e) => {
                        warnings.push(format!("Dropping malformed playbook #{}: {}", index, e));
                    }
                    Field::Missing => {}
                }
            }
        }
        Field::Malformed(e) => warnings.push(format!("Ignoring malformed playbooks list: {}", e)),
        Field::Missing => {}
    }

    let mut results = BTreeMap::new();
    match document.cache {
        Field::Parsed(items) => {
            for (name, item) in items {
                match item {
                    Field::Parsed(mut result) => {
                        if result.playbook_name.is_empty() {
                            result.playbook_name.clone_from(&name);
                        }
                        results.insert(name, result);
                    }
                    Field::Malformed(e) => {
                        warnings.push(format!("Dropping malformed result for {}: {}", name, e));
                    }
                    Field::Missing => {}
                }
            }
        }
        Field::Malformed(e) => warnings.push(format!("Ignoring malformed result cache: {}", e)),
        Field::Missing => {}
    }

    Ok(LoadedSnapshot { snapshot: Snapshot { sequence, entries, results }, version, warnings })
}

/// Write a file atomically (write to temp, then rename).
fn write_file_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}
