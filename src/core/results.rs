//! Cache of the most recent run result per playbook.

use std::collections::BTreeMap;

use super::RunResult;

/// Last-write-wins store of run results keyed by playbook name.
///
/// Keys are not checked against the catalog; a result may outlive the
/// playbook it was recorded for.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: BTreeMap<String, RunResult>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the result for `name`, or the not-yet-run placeholder.
    pub fn get(&self, name: &str) -> RunResult {
        self.results.get(name).cloned().unwrap_or_else(|| RunResult::not_run(name))
    }

    /// Get the stored result for `name`, if any.
    pub fn find(&self, name: &str) -> Option<&RunResult> {
        self.results.get(name)
    }

    /// Store a result, replacing any previous one for `name`.
    pub fn put(&mut self, name: impl Into<String>, result: RunResult) {
        self.results.insert(name.into(), result);
    }

    /// Install results restored from a snapshot.
    pub fn replace(&mut self, results: BTreeMap<String, RunResult>) {
        self.results = results;
    }

    /// Get all stored results.
    pub fn all(&self) -> &BTreeMap<String, RunResult> {
        &self.results
    }

    /// Get the number of stored results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
