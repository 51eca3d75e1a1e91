//! Engine configuration: loaded from a TOML file or built in code
//!
//! Carries everything the components used to discover through ambient
//! lookup: the signature cache location, an optional defaults override,
//! recursion and freshness bounds, and the remote signature endpoints.

use crate::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SIGNATURE_URL: &str = "https://uniqx.gitlab.io/fdroid-scanner-signatures/sigs.json";
pub const DEFAULT_TRACKER_URL: &str = "https://reports.exodus-privacy.eu.org/api/trackers";

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Directory holding one cache file per signature set (required)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Directory with default signature files, replacing the bundled ones
    #[serde(default)]
    pub defaults_dir: Option<PathBuf>,

    /// Maximum nesting depth for container descent
    #[serde(default = "default_max_archive_depth")]
    pub max_archive_depth: usize,

    /// Largest archive entry buffered for nested inspection or disassembly
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,

    /// Age after which a cached signature set is due for refresh
    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: i64,

    /// Timeout for every remote fetch, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_signature_url")]
    pub signature_url: String,

    #[serde(default = "default_tracker_url")]
    pub tracker_url: String,

    /// Refresh stale caches from `signature_url` during load
    #[serde(default)]
    pub refresh_stale: bool,

    /// Disassembler used for embedded DEX files
    #[serde(default = "default_dexdump")]
    pub dexdump: PathBuf,
}

fn default_max_archive_depth() -> usize {
    10
}
fn default_max_entry_bytes() -> u64 {
    crate::archive::DEFAULT_MAX_ENTRY_BYTES
}
fn default_cache_max_age_days() -> i64 {
    7
}
fn default_fetch_timeout_secs() -> u64 {
    300
}
fn default_signature_url() -> String {
    DEFAULT_SIGNATURE_URL.to_string()
}
fn default_tracker_url() -> String {
    DEFAULT_TRACKER_URL.to_string()
}
fn default_dexdump() -> PathBuf {
    PathBuf::from("dexdump")
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            defaults_dir: None,
            max_archive_depth: default_max_archive_depth(),
            max_entry_bytes: default_max_entry_bytes(),
            cache_max_age_days: default_cache_max_age_days(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            signature_url: default_signature_url(),
            tracker_url: default_tracker_url(),
            refresh_stale: false,
            dexdump: default_dexdump(),
        }
    }
}

impl ScannerConfig {
    /// Config with only the cache location set
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScannerConfig = toml::from_str(&content).map_err(|e| {
            GateError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded scanner config from {}", path.display());
        Ok(config)
    }

    /// The signature cache directory, or a configuration error when unset
    pub fn require_cache_dir(&self) -> GateResult<&Path> {
        self.cache_dir
            .as_deref()
            .ok_or_else(|| GateError::Configuration("could not load 'cache_dir' config".into()))
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }
}
