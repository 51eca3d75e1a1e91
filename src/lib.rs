//! # gatescan: build-policy gate for application sources and packages
//!
//! Statically audits an unpacked application source tree (and, separately,
//! already-built binary packages) before the artifact is accepted into a
//! trusted distribution pipeline. Runs once per application build.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ScanContext                           │
//! │  ┌──────────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  │SignatureRepository│──▶│ RuleCompiler │──▶│CompiledRuleSet│ │
//! │  │(cache + defaults) │   │ (.*pattern)  │   └──────┬───────┘  │
//! │  └──────────────────┘   └──────────────┘          │          │
//! │                                                   │          │
//! │  source tree ──▶ TreeScanner ──▶ GradleAnalyzer ◀──┤          │
//! │                     │                             │          │
//! │                     ▼                             │          │
//! │              DispositionEngine                    │          │
//! │        ignore > delete > test-warn > error        │          │
//! │                     │                             │          │
//! │                     ▼                             │          │
//! │                ScanReport ──▶ BatchReport         │          │
//! │                                                   │          │
//! │  package ──▶ ArchiveInspector ──▶ scan_binary ◀────┘          │
//! │            (nested zip, dexdump)                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Capabilities
//!
//! - **Signature repository**: versioned JSON cache with staleness detection,
//!   self-healing from bundled defaults, optional time-bounded remote refresh
//! - **Rule compiler**: case-insensitive dependency and code-pattern matchers
//! - **Archive inspector**: depth-bounded descent into nested zip containers,
//!   DEX extraction and disassembly, fake-name and zip-bomb anomalies
//! - **Gradle analysis**: tracker dependencies and untrusted Maven repositories
//! - **Disposition engine**: per-build ignore/delete policy with unused-entry
//!   detection, test-path downgrade, hard error accounting

pub mod archive;
pub mod config;
pub mod engine;
pub mod gradle;
pub mod policy;
pub mod report;
pub mod rules;
pub mod signatures;

// Re-exports for convenience
pub use archive::{ArchiveInspector, ClassLister, DexDump};
pub use config::ScannerConfig;
pub use engine::{scan_binary, scan_source, Finding, ScanContext, ScanOutcome};
pub use policy::{PathPolicy, PolicyKind, PolicyTable};
pub use report::{BatchReport, Issue, ScanReport};
pub use rules::{CompiledRuleSet, CompiledTracker};
pub use signatures::{SignatureRepository, SignatureSet, SignatureSource};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Signature fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("External tool failed: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type GateResult<T> = Result<T, GateError>;
