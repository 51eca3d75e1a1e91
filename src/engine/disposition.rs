//! Disposition: routes each finding to ignore, delete, warn or error
//!
//! Precedence is fixed: an ignore-policy match wins over a delete-policy
//! match, which wins over the test-path downgrade, which wins over a hard
//! error. Only hard errors count as violations.

use super::content::is_test_path;
use super::{Finding, ScanOutcome};
use crate::policy::PolicyTable;
use crate::report::ScanReport;
use std::io::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignored,
    Deleted,
    Warned,
    Error,
}

pub struct DispositionEngine {
    ignore: PolicyTable,
    delete: PolicyTable,
    report: ScanReport,
    violations: usize,
}

impl DispositionEngine {
    pub fn new(ignore: PolicyTable, delete: PolicyTable) -> Self {
        Self {
            ignore,
            delete,
            report: ScanReport::new(),
            violations: 0,
        }
    }

    /// Resolve a finding through the full precedence chain
    pub fn handle(&mut self, finding: &Finding) -> Disposition {
        if self.ignore.matches(&finding.path_in_tree) {
            let msg = format!("Ignoring {} at {}", finding.kind, finding.path_in_tree);
            tracing::info!("{}", msg);
            self.report.info(msg, &finding.path_in_tree);
            return Disposition::Ignored;
        }
        if self.delete.matches(&finding.path_in_tree) {
            self.remove(finding);
            return Disposition::Deleted;
        }
        if is_test_path(&finding.path_in_tree) {
            return self.warn(finding);
        }

        tracing::error!("Found {} at {}", finding.kind, finding.path_in_tree);
        self.report.error(&finding.kind, &finding.path_in_tree);
        self.violations += 1;
        Disposition::Error
    }

    /// Delete the offending file regardless of policy. A file already gone
    /// counts as removed, since one file can produce several findings.
    pub fn remove(&mut self, finding: &Finding) {
        let msg = format!("Removing {} at {}", finding.kind, finding.path_in_tree);
        tracing::info!("{}", msg);
        self.report.info(msg, &finding.path_in_tree);

        match std::fs::remove_file(&finding.absolute_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove {}: {}",
                finding.absolute_path.display(),
                e
            ),
        }
    }

    /// Soft finding: dropped when ignored by policy, never an error
    pub fn warn(&mut self, finding: &Finding) -> Disposition {
        if self.ignore.matches(&finding.path_in_tree) {
            return Disposition::Ignored;
        }
        tracing::warn!("Found {} at {}", finding.kind, finding.path_in_tree);
        self.report.warning(&finding.kind, &finding.path_in_tree);
        Disposition::Warned
    }

    /// Report every policy entry that never fired, then hand back the outcome
    pub fn finish(mut self) -> ScanOutcome {
        for table in [&self.ignore, &self.delete] {
            for entry in table.unused() {
                let msg = format!("Unused {} path: {}", table.kind().key(), entry);
                tracing::error!("{}", msg);
                self.report.error(msg, entry);
                self.violations += 1;
            }
        }

        ScanOutcome {
            violations: self.violations,
            report: self.report,
        }
    }
}
