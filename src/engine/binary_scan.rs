//! Binary package scan: embedded classes matched against code signatures

use crate::archive::{ArchiveInspector, ClassLister};
use crate::rules::{CompiledRuleSet, CompiledTracker};
use crate::GateResult;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct BinaryScanOutcome {
    /// Hex SHA-256 of the scanned artifact
    pub sha256: String,
    pub problems: usize,
    /// Class names and anomalies found by the inspector
    pub classes: BTreeSet<String>,
}

/// Scan one packaged artifact. One problem per (class, code pattern) match,
/// plus one per tracker whose signature appears in any class name.
pub fn scan_binary<L: ClassLister>(
    inspector: &ArchiveInspector<L>,
    rules: &CompiledRuleSet,
    trackers: Option<&[CompiledTracker]>,
    path: &Path,
) -> GateResult<BinaryScanOutcome> {
    let sha256 = file_sha256(path)?;
    let classes = inspector.inspect(path);
    let mut problems = 0;

    for class in &classes {
        for pattern in rules.code_matches(class) {
            tracing::debug!("Found class '{}' matching '{}'", class, pattern);
            problems += 1;
        }
    }

    for tracker in trackers.unwrap_or(&[]) {
        if let Some(class) = tracker.find_in(&classes) {
            tracing::debug!("Found tracker class '{}' of '{}'", class, tracker.tracker.name);
            problems += 1;
        }
    }

    if problems > 0 {
        tracing::error!("Found problems in {} (sha256 {})", path.display(), sha256);
    }

    Ok(BinaryScanOutcome {
        sha256,
        problems,
        classes,
    })
}

fn file_sha256(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
