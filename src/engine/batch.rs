//! Batch orchestration: many applications, each with its builds
//!
//! A failure while scanning one application is logged and counted as a
//! single problem; the remaining applications are still scanned.

use super::{scan_source, ScanContext};
use crate::policy::PathPolicy;
use crate::report::{BatchReport, ScanReport, CURRENT_SOURCE_STATE};
use crate::GateResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One build of an application: a prepared source tree and its policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub version_code: String,
    pub tree_root: PathBuf,
    #[serde(default)]
    pub policy: PathPolicy,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppJob {
    pub app_id: String,
    /// Scanned as-is when the application lists no builds
    pub tree_root: PathBuf,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub builds: Vec<BuildJob>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub problems: usize,
    pub report: BatchReport,
}

/// Scan every application. Disabled applications and builds are skipped
/// unless `force` is set.
pub fn scan_batch(ctx: &ScanContext, apps: &[AppJob], force: bool) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for app in apps {
        if app.disabled && !force {
            tracing::info!("Skipping {}: disabled", app.app_id);
            continue;
        }

        let mut builds = BTreeMap::new();
        match scan_app(ctx, app, force, &mut builds) {
            Ok(problems) => outcome.problems += problems,
            Err(e) => {
                tracing::warn!("Could not scan app {} due to error: {}", app.app_id, e);
                outcome.problems += 1;
            }
        }
        outcome.report.add_app(&app.app_id, builds);
    }

    tracing::info!("Finished, {} problems found", outcome.problems);
    outcome
}

/// Scans the builds of one app into `builds`; reports of builds finished
/// before a failure are kept
fn scan_app(
    ctx: &ScanContext,
    app: &AppJob,
    force: bool,
    builds: &mut BTreeMap<String, ScanReport>,
) -> GateResult<usize> {
    if app.builds.is_empty() {
        tracing::info!("{}: no builds specified, running on current source state", app.app_id);
        let scanned = scan_source(ctx, &app.tree_root, &PathPolicy::default())?;
        if scanned.violations > 0 {
            tracing::warn!("Scanner found {} problems in {}", scanned.violations, app.app_id);
        }
        builds.insert(CURRENT_SOURCE_STATE.to_string(), scanned.report);
        return Ok(scanned.violations);
    }

    tracing::info!("Processing {}", app.app_id);
    let mut problems = 0;
    for build in &app.builds {
        if build.disabled && !force {
            tracing::info!("...skipping version {}", build.version_code);
            continue;
        }

        tracing::info!("...scanning version {}", build.version_code);
        let scanned = scan_source(ctx, &build.tree_root, &build.policy)?;
        if scanned.violations > 0 {
            tracing::warn!(
                "Scanner found {} problems in {}:{}",
                scanned.violations,
                app.app_id,
                build.version_code
            );
        }
        problems += scanned.violations;
        builds.insert(build.version_code.clone(), scanned.report);
    }
    Ok(problems)
}
