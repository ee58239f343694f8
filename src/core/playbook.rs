//! Playbook data structures.
//!
//! Defines the catalog entry for a discovered playbook and the result
//! record produced by a finished run.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output reported for a playbook that has never finished a run.
pub const NO_RESULTS_PLACEHOLDER: &str = "No execution results available";

/// Lifecycle status of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybookStatus {
    /// Discovered and idle
    #[default]
    Ready,
    /// A run has been triggered and has not finished
    Running,
    /// The last run exited with code 0
    Success,
    /// The last run exited non-zero or could not be launched
    Failed,
}

impl PlaybookStatus {
    /// Status recorded when a run finishes.
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failed
        }
    }

    /// Get the status label used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A playbook file discovered in the playbooks directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookEntry {
    /// File name, unique within the catalog
    pub name: String,

    /// Location of the playbook on disk
    pub path: String,

    /// When the playbook was last triggered or last finished
    #[serde(default, with = "zero_time")]
    pub last_run_time: Option<DateTime<Utc>>,

    /// Current lifecycle status
    #[serde(default)]
    pub status: PlaybookStatus,
}

impl PlaybookEntry {
    /// Create a ready entry that has never been run.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            last_run_time: None,
            status: PlaybookStatus::Ready,
        }
    }

    /// Check whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.status == PlaybookStatus::Running
    }
}

/// Outcome of the most recent finished run of a playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Name of the playbook this result belongs to
    #[serde(default)]
    pub playbook_name: String,

    /// Combined stdout and stderr of the runner
    #[serde(default)]
    pub output: String,

    /// Whether the runner exited with code 0
    #[serde(default)]
    pub success: bool,

    /// Human-readable run duration, empty if never run
    #[serde(default)]
    pub run_time: String,
}

impl RunResult {
    /// Create a result for a finished run.
    pub fn new(
        playbook_name: impl Into<String>,
        output: impl Into<String>,
        success: bool,
        duration: Duration,
    ) -> Self {
        Self {
            playbook_name: playbook_name.into(),
            output: output.into(),
            success,
            run_time: format_duration(duration),
        }
    }

    /// Result reported for a playbook that has no finished run.
    pub fn not_run(playbook_name: impl Into<String>) -> Self {
        Self {
            playbook_name: playbook_name.into(),
            output: NO_RESULTS_PLACEHOLDER.to_string(),
            success: false,
            run_time: String::new(),
        }
    }
}

/// Format a run duration the way it is shown on the dashboard (e.g. `1.5s`, `250ms`).
pub fn format_duration(duration: Duration) -> String {
    format!("{:?}", duration)
}

/// Serde adapter for optional timestamps.
///
/// `None` is written as the zero time `0001-01-01T00:00:00Z`. On read, the zero
/// time, `null`, an empty string and anything that is not a valid RFC 3339
/// timestamp all map back to `None`.
pub(crate) mod zero_time {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const ZERO: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let ts = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
        if ts.year() <= 1 {
            None
        } else {
            Some(ts)
        }
    }
}
