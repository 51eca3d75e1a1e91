//! Report aggregation: per-build issue lists and the batch JSON document
//!
//! Every build scan produces a `ScanReport` holding `(description, path)`
//! pairs in three categories. The batch report keys those by application
//! and build, keeping only builds that reported anything and only
//! applications with at least one such build.

use crate::GateResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Build key used when an application has no build entries
pub const CURRENT_SOURCE_STATE: &str = "current-source-state";

/// One reported condition: description and path relative to the tree root.
/// Serializes as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue(pub String, pub String);

impl Issue {
    pub fn new(what: impl Into<String>, path_in_tree: impl Into<String>) -> Self {
        Self(what.into(), path_in_tree.into())
    }

    pub fn what(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &str {
        &self.1
    }
}

/// Issues of one build scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub infos: Vec<Issue>,
}

impl ScanReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, what: impl Into<String>, path_in_tree: impl Into<String>) {
        self.errors.push(Issue::new(what, path_in_tree));
    }

    pub fn warning(&mut self, what: impl Into<String>, path_in_tree: impl Into<String>) {
        self.warnings.push(Issue::new(what, path_in_tree));
    }

    pub fn info(&mut self, what: impl Into<String>, path_in_tree: impl Into<String>) {
        self.infos.push(Issue::new(what, path_in_tree));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.infos.is_empty()
    }

    pub fn total(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.infos.len()
    }
}

/// Application id → build key → report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchReport {
    apps: BTreeMap<String, BTreeMap<String, ScanReport>>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one application's builds. Empty builds are dropped; an
    /// application left with no builds is not recorded at all.
    pub fn add_app(&mut self, app_id: &str, builds: BTreeMap<String, ScanReport>) {
        let builds: BTreeMap<String, ScanReport> =
            builds.into_iter().filter(|(_, r)| !r.is_empty()).collect();
        if builds.is_empty() {
            return;
        }
        self.apps.insert(app_id.to_string(), builds);
    }

    pub fn get(&self, app_id: &str) -> Option<&BTreeMap<String, ScanReport>> {
        self.apps.get(app_id)
    }

    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Render as a JSON document
    pub fn render_json(&self) -> GateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
