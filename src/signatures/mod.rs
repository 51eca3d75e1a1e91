//! Signature repository: versioned, self-healing local cache of rule sets
//!
//! Each named signature set lives in its own JSON file under the cache
//! directory. A cache that is missing, unparsable, carries a different
//! schema version, or lacks a valid timestamp is malformed: the bundled
//! defaults are reloaded and immediately written back. A well-formed cache
//! older than the freshness horizon is still used, but reported as stale so
//! the caller may refresh it from the remote source.

pub mod remote;

use crate::config::ScannerConfig;
use crate::{GateError, GateResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version of cache files; any other value makes the file malformed
pub const CACHE_SCHEMA_VERSION: u32 = 1;

const BUNDLED_SCANNER_SIGNATURES: &str = include_str!("../../data/scanner.json");

/// Patterns belonging to one named rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRule {
    /// Matched against dependency coordinates and jar names
    #[serde(default, rename = "gradle_signatures", alias = "dependencyPatterns")]
    pub dependency_patterns: Vec<String>,
    /// Matched against class names discovered in compiled code
    #[serde(default, rename = "code_signatures", alias = "codePatterns")]
    pub code_patterns: Vec<String>,
}

/// A loaded signature set. Only `version`, `timestamp` and `signatures`
/// survive a parse, so unknown top-level keys are dropped on rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet {
    #[serde(skip)]
    pub name: String,
    pub version: u32,
    pub timestamp: String,
    #[serde(default)]
    pub signatures: BTreeMap<String, SignatureRule>,
}

/// Tracker definition from the Exodus tracker database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSignature {
    pub name: String,
    #[serde(default)]
    pub code_signature: String,
    #[serde(default)]
    pub network_signature: String,
}

/// Why a cache file could not be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheMalformed {
    #[error("cache file does not exist")]
    Missing,
    #[error("unparsable: {0}")]
    Unparsable(String),
    #[error("schema version {found:?} does not match the engine schema")]
    VersionMismatch { found: Option<u64> },
    #[error("invalid timestamp '{0}'")]
    BadTimestamp(String),
}

/// Freshness of a loaded set. Staleness never invalidates the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Fresh,
    Stale { age: Duration },
}

/// Where the data of a load came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOrigin {
    Cache,
    Defaults,
    Remote,
}

#[derive(Debug, Clone)]
pub struct LoadedSignatures {
    pub set: SignatureSet,
    pub origin: SignatureOrigin,
    pub state: CacheState,
}

impl SignatureSet {
    /// Strict parse: JSON object, matching schema version, valid timestamp
    pub fn parse(name: &str, content: &str) -> Result<Self, CacheMalformed> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| CacheMalformed::Unparsable(e.to_string()))?;

        let found = value.get("version").and_then(|v| v.as_u64());
        if found != Some(u64::from(CACHE_SCHEMA_VERSION)) {
            return Err(CacheMalformed::VersionMismatch { found });
        }

        let mut set: SignatureSet = serde_json::from_value(value)
            .map_err(|e| CacheMalformed::Unparsable(e.to_string()))?;
        if set.parsed_timestamp().is_none() {
            return Err(CacheMalformed::BadTimestamp(set.timestamp));
        }
        set.name = name.to_string();
        Ok(set)
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    pub fn to_json(&self) -> GateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// ISO-8601 with offset, or naive date/date-time read as UTC
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// A named signature set and its bundled recovery data
#[derive(Debug, Clone)]
pub struct SignatureSource {
    pub name: String,
    pub filename: String,
    bundled: &'static str,
}

impl SignatureSource {
    pub fn new(name: &str, filename: &str, bundled: &'static str) -> Self {
        Self {
            name: name.to_string(),
            filename: filename.to_string(),
            bundled,
        }
    }

    /// The scanner signature set shipped with the crate
    pub fn scanner() -> Self {
        Self::new("Scanner signatures", "scanner.json", BUNDLED_SCANNER_SIGNATURES)
    }
}

/// Loads signature sets from the cache directory, falling back to defaults
#[derive(Debug, Clone)]
pub struct SignatureRepository {
    cache_dir: PathBuf,
    defaults_dir: Option<PathBuf>,
    max_age: Duration,
}

impl SignatureRepository {
    /// Fails only when no cache location is configured. Creates the
    /// cache directory if absent.
    pub fn new(config: &ScannerConfig) -> GateResult<Self> {
        let cache_dir = config.require_cache_dir()?.to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            defaults_dir: config.defaults_dir.clone(),
            max_age: Duration::days(config.cache_max_age_days),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, source: &SignatureSource) -> PathBuf {
        self.cache_dir.join(&source.filename)
    }

    pub fn load(&self, source: &SignatureSource) -> GateResult<LoadedSignatures> {
        self.load_at(source, Utc::now())
    }

    /// Load with an explicit notion of "now" for the staleness check
    pub fn load_at(
        &self,
        source: &SignatureSource,
        now: DateTime<Utc>,
    ) -> GateResult<LoadedSignatures> {
        let (set, origin) = match self.load_from_cache(source) {
            Ok(set) => {
                tracing::info!(
                    "Loaded {} from cache ({} rules)",
                    source.name,
                    set.signatures.len()
                );
                (set, SignatureOrigin::Cache)
            }
            Err(reason) => {
                tracing::debug!("{} cache malformed ({}), reloading defaults", source.name, reason);
                let set = self.load_from_defaults(source)?;
                if let Err(e) = self.write_to_cache(source, &set) {
                    tracing::warn!("Failed to rewrite {} cache: {}", source.name, e);
                }
                (set, SignatureOrigin::Defaults)
            }
        };

        let state = self.freshness(&set, now);
        if let CacheState::Stale { age } = state {
            tracing::info!("{} are {} days old, due for refresh", source.name, age.num_days());
        }

        Ok(LoadedSignatures { set, origin, state })
    }

    pub fn load_from_cache(&self, source: &SignatureSource) -> Result<SignatureSet, CacheMalformed> {
        let path = self.cache_path(source);
        if !path.exists() {
            return Err(CacheMalformed::Missing);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CacheMalformed::Unparsable(e.to_string()))?;
        SignatureSet::parse(&source.name, &content)
    }

    /// Defaults from `defaults_dir` when configured, else the bundled copy.
    /// Broken defaults are a configuration error.
    pub fn load_from_defaults(&self, source: &SignatureSource) -> GateResult<SignatureSet> {
        let content = match &self.defaults_dir {
            Some(dir) => std::fs::read_to_string(dir.join(&source.filename))?,
            None => source.bundled.to_string(),
        };
        SignatureSet::parse(&source.name, &content).map_err(|e| {
            GateError::Configuration(format!("default {} are malformed: {}", source.name, e))
        })
    }

    pub fn write_to_cache(&self, source: &SignatureSource, set: &SignatureSet) -> GateResult<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(source);
        std::fs::write(&path, set.to_json()?)?;
        tracing::debug!("write '{}' to cache", source.filename);
        Ok(())
    }

    pub fn freshness(&self, set: &SignatureSet, now: DateTime<Utc>) -> CacheState {
        match set.parsed_timestamp() {
            Some(ts) if ts + self.max_age < now => CacheState::Stale { age: now - ts },
            _ => CacheState::Fresh,
        }
    }

    /// Fetch the set from `url` and replace the cached copy
    pub fn refresh(
        &self,
        source: &SignatureSource,
        url: &str,
        timeout: std::time::Duration,
    ) -> GateResult<SignatureSet> {
        let set = remote::fetch_signature_set(&source.name, url, timeout)?;
        self.write_to_cache(source, &set)?;
        tracing::info!("Refreshed {} from {}", source.name, url);
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(dir: &TempDir) -> SignatureRepository {
        SignatureRepository::new(&ScannerConfig::with_cache_dir(dir.path().join("cache"))).unwrap()
    }

    fn sample_set(timestamp: &str) -> SignatureSet {
        let mut signatures = BTreeMap::new();
        signatures.insert(
            "com.example.tracker".to_string(),
            SignatureRule {
                dependency_patterns: vec!["com.example.tracker".into()],
                code_patterns: vec!["com/example/tracker".into()],
            },
        );
        SignatureSet {
            name: "Scanner signatures".into(),
            version: CACHE_SCHEMA_VERSION,
            timestamp: timestamp.into(),
            signatures,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_bundled_defaults_parse() {
        let set = SignatureSet::parse("Scanner signatures", BUNDLED_SCANNER_SIGNATURES).unwrap();
        assert_eq!(set.version, CACHE_SCHEMA_VERSION);
        assert!(set.signatures.contains_key("com.google.firebase"));
        assert!(!set.is_empty());
    }

    #[test]
    fn test_missing_cache_falls_back_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let source = SignatureSource::scanner();
        assert!(repo.cache_dir().is_dir());

        let loaded = repo.load(&source).unwrap();
        assert_eq!(loaded.origin, SignatureOrigin::Defaults);
        assert!(repo.cache_path(&source).exists());

        let again = repo.load(&source).unwrap();
        assert_eq!(again.origin, SignatureOrigin::Cache);
        assert_eq!(again.set.signatures, loaded.set.signatures);
    }

    #[test]
    fn test_round_trip_preserves_signatures() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let source = SignatureSource::scanner();
        let set = sample_set("2024-01-01T00:00:00+00:00");

        repo.write_to_cache(&source, &set).unwrap();
        let loaded = repo.load_from_cache(&source).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_version_mismatch_is_malformed() {
        let content = r#"{"version": 2, "timestamp": "2024-01-01T00:00:00+00:00", "signatures": {}}"#;
        assert_eq!(
            SignatureSet::parse("x", content),
            Err(CacheMalformed::VersionMismatch { found: Some(2) })
        );
        // only an integral version counts
        let float = r#"{"version": 1.0, "timestamp": "2024-01-01T00:00:00+00:00", "signatures": {}}"#;
        assert_eq!(
            SignatureSet::parse("x", float),
            Err(CacheMalformed::VersionMismatch { found: None })
        );
        let missing = r#"{"timestamp": "2024-01-01T00:00:00+00:00", "signatures": {}}"#;
        assert_eq!(
            SignatureSet::parse("x", missing),
            Err(CacheMalformed::VersionMismatch { found: None })
        );
    }

    #[test]
    fn test_bad_or_missing_timestamp_is_malformed() {
        let bad = r#"{"version": 1, "timestamp": "yesterday", "signatures": {}}"#;
        assert!(matches!(
            SignatureSet::parse("x", bad),
            Err(CacheMalformed::BadTimestamp(_))
        ));
        let missing = r#"{"version": 1, "signatures": {}}"#;
        assert!(matches!(
            SignatureSet::parse("x", missing),
            Err(CacheMalformed::Unparsable(_))
        ));
    }

    #[test]
    fn test_corrupt_cache_is_repaired() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let source = SignatureSource::scanner();
        std::fs::write(repo.cache_path(&source), "{ not json").unwrap();

        let loaded = repo.load(&source).unwrap();
        assert_eq!(loaded.origin, SignatureOrigin::Defaults);
        assert!(repo.load_from_cache(&source).is_ok());
    }

    #[test]
    fn test_unknown_keys_dropped_on_rewrite() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let source = SignatureSource::scanner();
        let content = r#"{"version": 1, "timestamp": "2024-01-01", "extra": [1, 2], "signatures": {}}"#;
        let set = SignatureSet::parse(&source.name, content).unwrap();
        assert!(set.is_empty());
        repo.write_to_cache(&source, &set).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(repo.cache_path(&source)).unwrap()).unwrap();
        let keys: Vec<&String> = written.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert!(written.get("extra").is_none());
    }

    #[test]
    fn test_stale_cache_is_still_used() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir);
        let source = SignatureSource::scanner();
        repo.write_to_cache(&source, &sample_set("2024-01-01T00:00:00+00:00")).unwrap();

        let fresh = repo.load_at(&source, at("2024-01-05T00:00:00+00:00")).unwrap();
        assert_eq!(fresh.state, CacheState::Fresh);

        let stale = repo.load_at(&source, at("2024-01-09T00:00:00+00:00")).unwrap();
        assert_eq!(stale.origin, SignatureOrigin::Cache);
        assert!(matches!(stale.state, CacheState::Stale { age } if age.num_days() == 8));
        assert!(stale.set.signatures.contains_key("com.example.tracker"));
    }

    #[test]
    fn test_defaults_dir_override() {
        let dir = TempDir::new().unwrap();
        let defaults = dir.path().join("defaults");
        std::fs::create_dir_all(&defaults).unwrap();
        std::fs::write(
            defaults.join("scanner.json"),
            sample_set("2024-01-01T00:00:00Z").to_json().unwrap(),
        )
        .unwrap();

        let config = ScannerConfig {
            defaults_dir: Some(defaults),
            ..ScannerConfig::with_cache_dir(dir.path().join("cache"))
        };
        let repo = SignatureRepository::new(&config).unwrap();
        let loaded = repo.load(&SignatureSource::scanner()).unwrap();
        assert_eq!(loaded.set.signatures.len(), 1);
    }

    #[test]
    fn test_camel_case_rule_keys_accepted() {
        let content = r#"{"version": 1, "timestamp": "2024-01-01", "signatures":
            {"acme": {"dependencyPatterns": ["com.acme"], "codePatterns": ["com/acme"]}}}"#;
        let set = SignatureSet::parse("x", content).unwrap();
        assert_eq!(set.signatures["acme"].dependency_patterns, vec!["com.acme"]);
        assert_eq!(set.signatures["acme"].code_patterns, vec!["com/acme"]);
    }
}
