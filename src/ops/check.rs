//! Static checks over candidate and override documents.
//!
//! `check` validates the documents without solving: declarations must
//! parse, overrides must apply cleanly, and every required mod should be
//! declared by some candidate.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::core::{CandidateDocument, ModCandidate, ModDependency};
use crate::overrides::DependencyOverrides;
use crate::util::diagnostic::{suggestions, Diagnostic};

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub candidates: PathBuf,
    pub overrides: Option<PathBuf>,
}

/// Summary of a document check.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub candidates: usize,
    pub mandatory: usize,
    pub overrides: usize,
    pub warnings: Vec<Diagnostic>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validate the documents named by `options`.
///
/// Declaration and parse errors are returned as errors; everything the
/// solver would still accept becomes a warning.
pub fn check(options: &CheckOptions) -> Result<CheckReport> {
    let mut candidates = CandidateDocument::load(&options.candidates)?;

    let mut report = CheckReport {
        candidates: candidates.len(),
        mandatory: candidates.iter().filter(|c| c.is_mandatory()).count(),
        ..CheckReport::default()
    };

    if let Some(path) = &options.overrides {
        let mut overrides = DependencyOverrides::load(path)?;
        report.overrides = overrides.len();
        report.warnings.extend(overrides.apply(&mut candidates));
    }

    report.warnings.extend(missing_targets(&candidates));
    debug!(
        "checked {} candidates, {} warning(s)",
        report.candidates,
        report.warnings.len()
    );
    Ok(report)
}

/// Required mods that no candidate declares or provides.
fn missing_targets(candidates: &[ModCandidate]) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();
    for candidate in candidates {
        for dependency in candidate.dependencies() {
            let ModDependency::Only(only) = dependency else {
                continue;
            };
            if only.optional || candidates.iter().any(|c| c.answers_to(&only.target)) {
                continue;
            }
            warnings.push(
                Diagnostic::warning(format!(
                    "{} requires `{}`, which no candidate provides",
                    candidate.key(),
                    only.target
                ))
                .with_suggestion(suggestions::MISSING_TARGET),
            );
        }
    }
    warnings
}

/// Human-readable check summary.
pub fn format_report(report: &CheckReport) -> String {
    let mut output = String::new();
    writeln!(
        output,
        "{} candidate(s), {} mandatory, {} override(s)",
        report.candidates, report.mandatory, report.overrides
    )
    .unwrap();
    if report.is_clean() {
        writeln!(output, "no problems found").unwrap();
    } else {
        writeln!(output, "{} warning(s)", report.warnings.len()).unwrap();
    }
    output
}
