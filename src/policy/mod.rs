//! Path policy: per-build scanignore/scandelete configuration
//!
//! A build descriptor names glob patterns, relative to the source tree
//! root, whose findings are either ignored or remediated by deleting the
//! offending file. Each pattern is expanded against the tree before the
//! scan into concrete path prefixes. Every pattern that never fires during
//! the scan is reported as an error, since stale policy would otherwise
//! mask real findings.

use crate::{GateError, GateResult};
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

/// Path policy of one build (loaded from the build descriptor)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPolicy {
    /// Globs whose findings are ignored
    #[serde(default)]
    pub scanignore: Vec<String>,

    /// Globs whose offending files are deleted
    #[serde(default)]
    pub scandelete: Vec<String>,

    /// Gradle flavors of the build, used for dependency keywords
    #[serde(default)]
    pub gradle: Vec<String>,
}

impl PathPolicy {
    pub fn from_file(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| GateError::Policy(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn is_empty(&self) -> bool {
        self.scanignore.is_empty() && self.scandelete.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Ignore,
    Delete,
}

impl PolicyKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ignore => "scanignore",
            Self::Delete => "scandelete",
        }
    }
}

/// Expanded policy entries plus the set of entries that have fired
#[derive(Debug, Clone)]
pub struct PolicyTable {
    kind: PolicyKind,
    entries: BTreeMap<String, BTreeSet<String>>,
    fired: BTreeSet<String>,
}

impl PolicyTable {
    pub fn empty(kind: PolicyKind) -> Self {
        Self::from_prefixes(kind, BTreeMap::new())
    }

    /// Table from already-expanded prefixes
    pub fn from_prefixes(kind: PolicyKind, entries: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            kind,
            entries,
            fired: BTreeSet::new(),
        }
    }

    /// Expand every glob against the tree under `root`. A glob matching
    /// nothing is a policy error.
    pub fn expand(kind: PolicyKind, root: &Path, globs: &[String]) -> GateResult<Self> {
        let mut entries = BTreeMap::new();
        if globs.is_empty() {
            return Ok(Self::from_prefixes(kind, entries));
        }

        let tree = relative_paths(root);
        for raw in globs {
            let pattern = normalize(raw);
            let matcher = GlobBuilder::new(&pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| GateError::Policy(format!("invalid {} glob '{}': {}", kind.key(), raw, e)))?
                .compile_matcher();

            let matched: BTreeSet<String> =
                tree.iter().filter(|p| matcher.is_match(p.as_str())).cloned().collect();
            if matched.is_empty() {
                return Err(GateError::Policy(format!(
                    "glob path '{}' did not match any files/dirs",
                    raw
                )));
            }
            entries.insert(raw.trim().to_string(), matched);
        }

        Ok(Self::from_prefixes(kind, entries))
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Whether `path_in_tree` lies under any entry; marks that entry fired
    pub fn matches(&mut self, path_in_tree: &str) -> bool {
        let hit = self.entries.iter().find(|(_, prefixes)| {
            prefixes.iter().any(|p| path_in_tree.starts_with(p.as_str()))
        });
        match hit {
            Some((entry, _)) => {
                let entry = entry.clone();
                self.fired.insert(entry);
                true
            }
            None => false,
        }
    }

    /// Entries that never matched a finding
    pub fn unused(&self) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|k| !self.fired.contains(*k))
            .map(|k| k.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `./libs/` and `libs` name the same path
fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.trim_end_matches('/').to_string()
}

/// Every file and directory below `root`, relative and `/`-separated
fn relative_paths(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}
