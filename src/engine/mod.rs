//! # Scan engine
//!
//! - `walker`: depth-first tree walk, VCS metadata and symlinks skipped
//! - `classify`: priority-ordered file classification by name
//! - `content`: binary heuristic, image magic, executable bit
//! - `disposition`: ignore > delete > test-path warning > hard error
//! - `binary_scan`: packaged artifacts against code signatures and trackers
//! - `batch`: many applications and builds into one `BatchReport`

pub mod batch;
pub mod binary_scan;
pub mod classify;
pub mod content;
pub mod disposition;
pub mod walker;

pub use batch::{scan_batch, AppJob, BatchOutcome, BuildJob};
pub use binary_scan::{scan_binary, BinaryScanOutcome};

use crate::archive::{ArchiveInspector, DexDump};
use crate::config::ScannerConfig;
use crate::gradle::GradleAnalyzer;
use crate::policy::{PathPolicy, PolicyKind, PolicyTable};
use crate::report::ScanReport;
use crate::rules::{compile_trackers, CompiledRuleSet, CompiledTracker};
use crate::signatures::{remote, CacheState, SignatureRepository, SignatureSource};
use crate::GateResult;
use classify::FileKind;
use disposition::DispositionEngine;
use std::path::{Path, PathBuf};
use walker::TreeFile;

// ─── Context ───────────────────────────────────────────────────────

/// Configuration plus compiled rules, built once per run and shared by
/// reference with every scan
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub config: ScannerConfig,
    pub rules: CompiledRuleSet,
}

impl ScanContext {
    pub fn new(config: ScannerConfig, rules: CompiledRuleSet) -> Self {
        Self { config, rules }
    }

    /// Load the scanner signatures through the cache and compile them.
    /// Fails before any scanning when no cache location is configured.
    pub fn load(config: ScannerConfig) -> GateResult<Self> {
        let repo = SignatureRepository::new(&config)?;
        let source = SignatureSource::scanner();
        let loaded = repo.load(&source)?;

        let set = match loaded.state {
            CacheState::Stale { .. } if config.refresh_stale => {
                match repo.refresh(&source, &config.signature_url, config.fetch_timeout()) {
                    Ok(set) => set,
                    Err(e) => {
                        tracing::warn!("Using stale {}: {}", source.name, e);
                        loaded.set
                    }
                }
            }
            _ => loaded.set,
        };

        let rules = CompiledRuleSet::compile(&[set]);
        Ok(Self::new(config, rules))
    }

    /// Download and compile the tracker database
    pub fn load_trackers(&self) -> GateResult<Vec<CompiledTracker>> {
        let trackers = remote::fetch_trackers(&self.config.tracker_url, self.config.fetch_timeout())?;
        Ok(compile_trackers(&trackers))
    }

    pub fn inspector(&self) -> ArchiveInspector<DexDump> {
        ArchiveInspector::from_config(&self.config)
    }
}

// ─── Findings ──────────────────────────────────────────────────────

/// One detected condition, consumed once by the disposition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: String,
    pub path_in_tree: String,
    pub absolute_path: PathBuf,
}

impl Finding {
    fn of(kind: impl Into<String>, file: &TreeFile) -> Self {
        Self {
            kind: kind.into(),
            path_in_tree: file.path_in_tree.clone(),
            absolute_path: file.absolute_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Hard errors, including unused policy entries
    pub violations: usize,
    pub report: ScanReport,
}

// ─── Source scan ───────────────────────────────────────────────────

/// Scan the tree under `root` with the build's path policy. Offending
/// files matched by delete policy, and build tool artifacts, are removed.
pub fn scan_source(ctx: &ScanContext, root: &Path, policy: &PathPolicy) -> GateResult<ScanOutcome> {
    let ignore = PolicyTable::expand(PolicyKind::Ignore, root, &policy.scanignore)?;
    let delete = PolicyTable::expand(PolicyKind::Delete, root, &policy.scandelete)?;
    let gradle = GradleAnalyzer::new(&ctx.rules, &policy.gradle)?;
    let mut engine = DispositionEngine::new(ignore, delete);

    tracing::debug!("Scanning source tree {}", root.display());

    for file in walker::tree_files(root) {
        match classify::classify(&file.file_name) {
            FileKind::BuildToolArtifact => {
                engine.remove(&Finding::of(file.file_name.as_str(), &file));
            }
            FileKind::ApplicationPackage => {
                engine.remove(&Finding::of("Android APK file", &file));
            }
            FileKind::Prebuilt(what) => {
                engine.handle(&Finding::of(what, &file));
            }
            FileKind::JavaArchive => {
                for pattern in ctx.rules.dependency_suspects(&file.file_name) {
                    engine.handle(&Finding::of(format!("usual suspect '{}'", pattern), &file));
                }
                engine.handle(&Finding::of("Java JAR file", &file));
            }
            FileKind::JavaSource => {
                let text = read_lossy(&file.absolute_path)?;
                if text.lines().any(|line| line.contains("DexClassLoader")) {
                    engine.handle(&Finding::of("DexClassLoader", &file));
                }
            }
            FileKind::GradleScript => {
                let text = read_lossy(&file.absolute_path)?;
                for found in gradle.analyze(&text) {
                    engine.handle(&Finding::of(found.describe(), &file));
                }
            }
            FileKind::ExtensionlessOrStub => {
                if content::is_binary(&file.absolute_path)? {
                    engine.handle(&Finding::of("binary", &file));
                }
            }
            FileKind::Other => {
                if content::is_executable(&file.absolute_path)
                    && content::is_binary(&file.absolute_path)?
                    && !content::is_safe_path(&file.path_in_tree)
                    && !content::is_image(&file.absolute_path)?
                {
                    engine.warn(&Finding::of("executable binary, possibly code", &file));
                }
            }
        }
    }

    Ok(engine.finish())
}

fn read_lossy(path: &Path) -> GateResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
