//! Structured, presentation-ready error reports.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use url::Url;

use crate::diagnosis::errors::{
    BreakageError, CandidateRef, DependencyError, DuplicateMandatoryError, Mismatch, SolverError,
    UnhandledError,
};
use crate::util::diagnostic::Diagnostic;

/// A remediation the presentation layer can offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    /// Show the file a candidate came from
    ViewFile(PathBuf),
    OpenLink { label: String, url: String },
}

/// Which icon to show next to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IconHint {
    Mod { id: String },
    Generic,
}

/// One user-facing resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub title: String,
    pub description: Vec<String>,
    pub report_log: Vec<String>,
    pub actions: Vec<ReportAction>,
    pub icon: IconHint,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(error: &SolverError) -> Self {
        match error {
            SolverError::Dependency(e) => dependency_report(e),
            SolverError::DuplicateMandatory(e) => duplicate_report(e),
            SolverError::Breakage(e) => breakage_report(e),
            SolverError::Unhandled(e) => unhandled_report(e),
        }
    }

    /// Render for the terminal.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.title.clone());

        if let Some(path) = self.actions.iter().find_map(|action| match action {
            ReportAction::ViewFile(path) => Some(path.clone()),
            ReportAction::OpenLink { .. } => None,
        }) {
            diag = diag.with_location(path);
        }
        for line in &self.description {
            diag = diag.with_context(line.clone());
        }
        for suggestion in &self.suggestions {
            diag = diag.with_suggestion(suggestion.clone());
        }
        diag
    }
}

/// Plain-text rendering of every report, for crash-report style logs.
pub fn report_log_text(reports: &[ErrorReport]) -> String {
    let mut output = String::new();
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        output.push_str(&format!("Error {} of {}: {}\n", i + 1, reports.len(), report.title));
        for line in &report.report_log {
            output.push_str(&format!("  {}\n", line));
        }
    }
    output
}

fn label(candidate: &CandidateRef) -> String {
    format!("{} {}", candidate.name, candidate.version)
}

fn log_line(prefix: &str, candidate: &CandidateRef) -> String {
    format!("- {} {} from {}", prefix, candidate.key, candidate.origin)
}

/// View-file and issue-tracker actions for the given candidates.
fn actions<'a>(candidates: impl IntoIterator<Item = &'a CandidateRef>) -> Vec<ReportAction> {
    let mut actions = Vec::new();
    let mut seen = BTreeSet::new();
    for candidate in candidates {
        if seen.insert(candidate.origin.clone()) {
            actions.push(ReportAction::ViewFile(PathBuf::from(&candidate.origin)));
        }
        let Some(issues) = &candidate.issues else {
            continue;
        };
        match Url::parse(issues) {
            Ok(url) => actions.push(ReportAction::OpenLink {
                label: format!("Open the issue tracker for {}", candidate.name),
                url: url.to_string(),
            }),
            Err(e) => tracing::debug!("ignoring issue link `{}` of {}: {}", issues, candidate.id, e),
        }
    }
    actions
}

fn icon(candidates: &BTreeSet<CandidateRef>) -> IconHint {
    match candidates.iter().next() {
        Some(candidate) => IconHint::Mod {
            id: candidate.id.clone(),
        },
        None => IconHint::Generic,
    }
}

fn reason_lines(reasons: &BTreeSet<String>) -> impl Iterator<Item = String> + '_ {
    reasons.iter().map(|reason| format!("Reason given: {}", reason))
}

fn dependency_report(error: &DependencyError) -> ErrorReport {
    let requirement = format!("{} {}", error.target, error.range);
    let mismatch = error.mismatch();

    let (title, problem) = match &mismatch {
        Mismatch::Missing => (
            format!("Missing dependency `{}`", error.target),
            "which is missing!".to_string(),
        ),
        Mismatch::Single(found) => (
            format!("Wrong version of `{}`", error.target),
            format!("but only version {} is present!", found.version),
        ),
        Mismatch::Multiple(found) => (
            format!("Wrong versions of `{}`", error.target),
            format!(
                "but only versions {} are present!",
                found
                    .iter()
                    .map(|c| c.version.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ),
    };

    let mut description: Vec<String> = error
        .from
        .iter()
        .map(|c| format!("{} requires {}, {}", label(c), requirement, problem))
        .collect();
    description.extend(reason_lines(&error.reasons));

    let mut report_log = vec![format!("Unsatisfied dependency on {}", requirement)];
    report_log.extend(error.from.iter().map(|c| log_line("required by", c)));
    report_log.extend(error.wrong_versions.iter().map(|c| log_line("wrong version", c)));

    let suggestions = match mismatch {
        Mismatch::Missing => vec![format!("Install {} {}", error.target, error.range)],
        _ => vec![
            format!("Replace `{}` with a version matching {}", error.target, error.range),
            "Update the mods that require it".to_string(),
        ],
    };

    ErrorReport {
        title,
        description,
        report_log,
        actions: actions(error.from.iter().chain(&error.wrong_versions)),
        icon: icon(&error.from),
        suggestions,
    }
}

fn duplicate_report(error: &DuplicateMandatoryError) -> ErrorReport {
    let mut description = vec![format!(
        "{} ({}) is present more than once:",
        error.display_name, error.identity
    )];
    description.extend(
        error
            .candidates
            .iter()
            .map(|c| format!("{} from {}", label(c), c.origin)),
    );

    let mut report_log = vec![format!("Duplicate mandatory mods for `{}`", error.identity)];
    report_log.extend(error.candidates.iter().map(|c| log_line("candidate", c)));

    ErrorReport {
        title: format!("Duplicate mod `{}`", error.display_name),
        description,
        report_log,
        actions: actions(&error.candidates),
        icon: IconHint::Mod {
            id: error.identity.clone(),
        },
        suggestions: vec![format!("Remove all but one copy of `{}`", error.identity)],
    }
}

fn breakage_report(error: &BreakageError) -> ErrorReport {
    let requirement = format!("{} {}", error.target, error.range);
    let present = error
        .conflicting
        .iter()
        .map(label)
        .collect::<Vec<_>>()
        .join(", ");

    let mut description: Vec<String> = error
        .from
        .iter()
        .map(|c| {
            format!(
                "{} is incompatible with {}, but {} is present!",
                label(c),
                requirement,
                present
            )
        })
        .collect();
    description.extend(reason_lines(&error.reasons));

    let mut report_log = vec![format!("Declared conflict with {}", requirement)];
    report_log.extend(error.from.iter().map(|c| log_line("declared by", c)));
    report_log.extend(error.conflicting.iter().map(|c| log_line("conflicting", c)));

    ErrorReport {
        title: format!("Incompatible mods: `{}`", error.target),
        description,
        report_log,
        actions: actions(error.from.iter().chain(&error.conflicting)),
        icon: icon(&error.from),
        suggestions: vec![format!("Remove or replace `{}`", error.target)],
    }
}

fn unhandled_report(error: &UnhandledError) -> ErrorReport {
    let mut description = vec!["These constraints cannot all hold:".to_string()];
    description.extend(error.rules.iter().cloned());

    let mut report_log = vec!["Unrecognised resolution failure".to_string()];
    report_log.extend(error.rules.iter().map(|rule| format!("- {}", rule)));

    ErrorReport {
        title: "Unresolvable mod set".to_string(),
        description,
        report_log,
        actions: Vec::new(),
        icon: IconHint::Generic,
        suggestions: vec!["Run with --verbose to see every solve attempt".to_string()],
    }
}
