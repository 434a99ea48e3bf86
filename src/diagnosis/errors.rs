//! Error kinds produced by diagnosis, and merging of equivalent errors.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::{ModIdentifier, VersionRange};
use crate::solver::ModLoadOption;

/// A candidate named by an error.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CandidateRef {
    pub key: String,
    pub id: String,
    pub name: String,
    pub version: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<String>,
}

impl CandidateRef {
    pub fn from_option(option: &ModLoadOption) -> Self {
        let candidate = option.candidate();
        CandidateRef {
            key: candidate.key(),
            id: candidate.id().to_string(),
            name: candidate.display_name().to_string(),
            version: candidate.version().to_string(),
            origin: candidate.origin().to_string(),
            issues: candidate.issues().map(str::to_string),
        }
    }
}

/// How a dependency failed to find a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch<'a> {
    /// No candidate answers to the target at all
    Missing,
    /// One candidate exists, with the wrong version
    Single(&'a CandidateRef),
    /// Several candidates exist, none with a matching version
    Multiple(Vec<&'a CandidateRef>),
}

/// Mods require a target that is missing or present only in wrong versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyError {
    pub from: BTreeSet<CandidateRef>,
    pub target: ModIdentifier,
    pub range: VersionRange,
    pub wrong_versions: BTreeSet<CandidateRef>,
    pub reasons: BTreeSet<String>,
}

impl DependencyError {
    pub fn mismatch(&self) -> Mismatch<'_> {
        let mut wrong = self.wrong_versions.iter();
        match (wrong.next(), wrong.next()) {
            (None, _) => Mismatch::Missing,
            (Some(only), None) => Mismatch::Single(only),
            _ => Mismatch::Multiple(self.wrong_versions.iter().collect()),
        }
    }
}

/// Several mandatory candidates claim the same identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMandatoryError {
    pub identity: String,
    pub display_name: String,
    pub candidates: BTreeSet<CandidateRef>,
}

/// A mandatory mod declares a conflict with another mandatory mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakageError {
    pub from: BTreeSet<CandidateRef>,
    pub target: ModIdentifier,
    pub range: VersionRange,
    pub conflicting: BTreeSet<CandidateRef>,
    pub reasons: BTreeSet<String>,
}

/// A failure no pattern recognised; lists every contributing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledError {
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    Dependency(DependencyError),
    DuplicateMandatory(DuplicateMandatoryError),
    Breakage(BreakageError),
    Unhandled(UnhandledError),
}

impl SolverError {
    /// Fold `other` into `self` if both describe the same problem.
    pub fn merge(&mut self, other: &SolverError) -> bool {
        match (self, other) {
            (SolverError::Dependency(a), SolverError::Dependency(b))
                if a.target == b.target && a.range == b.range =>
            {
                a.from.extend(b.from.iter().cloned());
                a.wrong_versions.extend(b.wrong_versions.iter().cloned());
                a.reasons.extend(b.reasons.iter().cloned());
                true
            }
            (SolverError::Breakage(a), SolverError::Breakage(b))
                if a.target == b.target && a.range == b.range =>
            {
                a.from.extend(b.from.iter().cloned());
                a.conflicting.extend(b.conflicting.iter().cloned());
                a.reasons.extend(b.reasons.iter().cloned());
                true
            }
            (SolverError::DuplicateMandatory(a), SolverError::DuplicateMandatory(b))
                if a.identity == b.identity =>
            {
                a.candidates.extend(b.candidates.iter().cloned());
                true
            }
            (SolverError::Unhandled(a), SolverError::Unhandled(b)) => a == b,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SolverError::Dependency(_) => "dependency",
            SolverError::DuplicateMandatory(_) => "duplicate-mandatory",
            SolverError::Breakage(_) => "breakage",
            SolverError::Unhandled(_) => "unhandled",
        }
    }
}

/// Collapse errors describing the same problem, keeping first-seen order.
pub fn merge_errors(errors: impl IntoIterator<Item = SolverError>) -> Vec<SolverError> {
    let mut merged: Vec<SolverError> = Vec::new();
    'next: for error in errors {
        for existing in merged.iter_mut() {
            if existing.merge(&error) {
                continue 'next;
            }
        }
        merged.push(error);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::CandidateFixture;

    fn candidate(id: &str, version: &str) -> CandidateRef {
        CandidateRef::from_option(&ModLoadOption::new(CandidateFixture::new(id, version).build()))
    }

    fn missing(from: &str, target: &str, range: &str) -> SolverError {
        SolverError::Dependency(DependencyError {
            from: BTreeSet::from([candidate(from, "1.0")]),
            target: ModIdentifier::new(target),
            range: VersionRange::parse(range).unwrap(),
            wrong_versions: BTreeSet::new(),
            reasons: BTreeSet::new(),
        })
    }

    #[test]
    fn test_merge_unions_sources() {
        let merged = merge_errors(vec![
            missing("a", "lib", ">=2.0"),
            missing("b", "lib", ">=2.0"),
            missing("c", "other", "*"),
        ]);

        assert_eq!(merged.len(), 2);
        let SolverError::Dependency(first) = &merged[0] else {
            panic!("expected a dependency error");
        };
        let ids: Vec<&str> = first.from.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(merged[1].kind(), "dependency");
    }

    #[test]
    fn test_different_ranges_stay_apart() {
        let merged = merge_errors(vec![missing("a", "lib", ">=2.0"), missing("b", "lib", ">=3.0")]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_mismatch_kinds() {
        let SolverError::Dependency(mut error) = missing("a", "lib", ">=2.0") else {
            unreachable!()
        };
        assert_eq!(error.mismatch(), Mismatch::Missing);

        error.wrong_versions.insert(candidate("lib", "1.5"));
        match error.mismatch() {
            Mismatch::Single(c) => assert_eq!(c.version, "1.5"),
            other => panic!("unexpected {:?}", other),
        }

        error.wrong_versions.insert(candidate("lib", "1.6"));
        assert!(matches!(error.mismatch(), Mismatch::Multiple(v) if v.len() == 2));
    }
}
