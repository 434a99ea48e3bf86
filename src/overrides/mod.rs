//! User-editable dependency overrides.
//!
//! An override document rewrites the `depends` and `breaks` declarations of
//! chosen candidates before their rules are built:
//!
//! ```toml
//! [[override]]
//! path = "mods/foo.jar"
//!
//! [[override.depends.replace]]
//! from = { id = "lib" }
//! to = { id = "lib", versions = ">=1.0" }
//!
//! [[override.breaks.remove]]
//! id = "old"
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::core::dependency::{DeclarationKind, DependencySpecError};
use crate::core::{DependencyOnly, DependencySpec, ModCandidate, ModDependency};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error reading an override document.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum OverrideError {
    #[error("failed to parse override document")]
    #[diagnostic(code(modsolve::overrides::syntax))]
    Malformed(#[source] toml::de::Error),

    #[error("override #{index} needs a `path` or a `pattern`")]
    #[diagnostic(code(modsolve::overrides::key))]
    MissingKey { index: usize },

    #[error("override #{index} sets both `path` and `pattern`")]
    #[diagnostic(code(modsolve::overrides::key))]
    BothKeys { index: usize },

    #[error("override #{index} has an invalid pattern `{pattern}`")]
    #[diagnostic(code(modsolve::overrides::pattern))]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("override #{index} has an invalid declaration")]
    #[diagnostic(code(modsolve::overrides::declaration))]
    InvalidDeclaration {
        index: usize,
        #[source]
        source: DependencySpecError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct OverrideDocument {
    #[serde(rename = "override", default)]
    overrides: Vec<OverrideSpec>,
}

/// One `[[override]]` table as written.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideSpec {
    pub path: Option<String>,
    pub pattern: Option<String>,
    #[serde(default)]
    pub depends: DeclarationOverridesSpec,
    #[serde(default)]
    pub breaks: DeclarationOverridesSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationOverridesSpec {
    #[serde(default)]
    pub replace: Vec<ReplaceSpec>,
    #[serde(default)]
    pub remove: Vec<DependencySpec>,
    #[serde(default)]
    pub add: Vec<DependencySpec>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceSpec {
    pub from: DependencySpec,
    pub to: DependencySpec,
}

/// Which candidates an override applies to.
#[derive(Debug, Clone)]
enum OverrideKey {
    /// Exact origin
    Path(String),
    /// Glob over mod ids; must select a single candidate
    Pattern(glob::Pattern),
}

/// How an override entry finds the declaration it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    /// Any single declaration on this mod id
    Fuzzy(String),
    /// Exactly this declaration, reasons aside
    Exact(ModDependency),
}

impl Matcher {
    fn from_spec(spec: &DependencySpec, kind: DeclarationKind) -> Result<Self, DependencySpecError> {
        let dependency = spec.to_dependency(kind)?;
        if spec.is_identity_only() {
            if let ModDependency::Only(only) = &dependency {
                return Ok(Matcher::Fuzzy(only.target.id().to_string()));
            }
        }
        Ok(Matcher::Exact(dependency))
    }

    fn matches(&self, declaration: &ModDependency) -> bool {
        match self {
            Matcher::Fuzzy(id) => {
                matches!(declaration, ModDependency::Only(only) if only.target.id() == id)
            }
            Matcher::Exact(expected) => without_reasons(expected) == without_reasons(declaration),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Fuzzy(id) => write!(f, "`{}`", id),
            Matcher::Exact(dependency) => write!(f, "`{}`", dependency),
        }
    }
}

fn strip_reason(only: &DependencyOnly) -> DependencyOnly {
    DependencyOnly {
        reason: None,
        unless: only.unless.as_deref().map(|u| Box::new(without_reasons(u))),
        ..only.clone()
    }
}

fn without_reasons(dependency: &ModDependency) -> ModDependency {
    match dependency {
        ModDependency::Only(only) => ModDependency::Only(strip_reason(only)),
        ModDependency::Any(parts) => ModDependency::Any(parts.iter().map(strip_reason).collect()),
        ModDependency::All(parts) => ModDependency::All(parts.iter().map(strip_reason).collect()),
    }
}

#[derive(Debug, Clone, Default)]
struct DeclarationOverrides {
    replace: Vec<(Matcher, ModDependency)>,
    remove: Vec<Matcher>,
    add: Vec<ModDependency>,
}

impl DeclarationOverrides {
    fn from_spec(spec: &DeclarationOverridesSpec, kind: DeclarationKind) -> Result<Self, DependencySpecError> {
        Ok(DeclarationOverrides {
            replace: spec
                .replace
                .iter()
                .map(|r| -> Result<_, DependencySpecError> {
                    Ok((Matcher::from_spec(&r.from, kind)?, r.to.to_dependency(kind)?))
                })
                .collect::<Result<_, _>>()?,
            remove: spec
                .remove
                .iter()
                .map(|s| Matcher::from_spec(s, kind))
                .collect::<Result<_, _>>()?,
            add: spec
                .add
                .iter()
                .map(|s| s.to_dependency(kind))
                .collect::<Result<_, _>>()?,
        })
    }

    fn is_empty(&self) -> bool {
        self.replace.is_empty() && self.remove.is_empty() && self.add.is_empty()
    }

    /// Rewrite a declaration list; problems come back as messages.
    fn apply(&self, declarations: &[ModDependency]) -> (Vec<ModDependency>, Vec<String>) {
        let mut list = declarations.to_vec();
        let mut problems = Vec::new();

        for (from, to) in &self.replace {
            match locate(&list, from) {
                Ok(index) => list[index] = to.clone(),
                Err(problem) => problems.push(format!("cannot replace {}: {}", from, problem)),
            }
        }
        for matcher in &self.remove {
            match locate(&list, matcher) {
                Ok(index) => {
                    list.remove(index);
                }
                Err(problem) => problems.push(format!("cannot remove {}: {}", matcher, problem)),
            }
        }
        list.extend(self.add.iter().cloned());

        (list, problems)
    }
}

fn locate(list: &[ModDependency], matcher: &Matcher) -> Result<usize, String> {
    let mut found = list
        .iter()
        .enumerate()
        .filter(|(_, declaration)| matcher.matches(declaration))
        .map(|(index, _)| index);

    match (found.next(), found.next()) {
        (Some(index), None) => Ok(index),
        (None, _) => Err("no declaration matches".to_string()),
        (Some(_), Some(_)) => Err("several declarations match; qualify it further".to_string()),
    }
}

#[derive(Debug, Clone)]
struct OverrideEntry {
    key: OverrideKey,
    depends: DeclarationOverrides,
    breaks: DeclarationOverrides,
}

impl OverrideEntry {
    fn describe(&self) -> String {
        match &self.key {
            OverrideKey::Path(path) => format!("override for `{}`", path),
            OverrideKey::Pattern(pattern) => format!("override for pattern `{}`", pattern),
        }
    }
}

/// A validated override document.
#[derive(Debug, Clone, Default)]
pub struct DependencyOverrides {
    entries: Vec<OverrideEntry>,
    /// Candidate keys each pattern entry has matched, across batches
    matched: Vec<BTreeSet<String>>,
    source: Option<PathBuf>,
}

impl DependencyOverrides {
    /// Parse and validate an override document.
    pub fn parse(contents: &str) -> Result<Self, OverrideError> {
        let document: OverrideDocument = toml::from_str(contents).map_err(OverrideError::Malformed)?;

        let mut entries = Vec::with_capacity(document.overrides.len());
        for (index, spec) in document.overrides.iter().enumerate() {
            let key = match (&spec.path, &spec.pattern) {
                (Some(path), None) => OverrideKey::Path(path.clone()),
                (None, Some(pattern)) => OverrideKey::Pattern(glob::Pattern::new(pattern).map_err(
                    |source| OverrideError::InvalidPattern {
                        index,
                        pattern: pattern.clone(),
                        source,
                    },
                )?),
                (None, None) => return Err(OverrideError::MissingKey { index }),
                (Some(_), Some(_)) => return Err(OverrideError::BothKeys { index }),
            };

            let invalid = |source| OverrideError::InvalidDeclaration { index, source };
            entries.push(OverrideEntry {
                key,
                depends: DeclarationOverrides::from_spec(&spec.depends, DeclarationKind::Depends)
                    .map_err(invalid)?,
                breaks: DeclarationOverrides::from_spec(&spec.breaks, DeclarationKind::Breaks)
                    .map_err(invalid)?,
            });
        }

        Ok(DependencyOverrides {
            matched: vec![BTreeSet::new(); entries.len()],
            entries,
            source: None,
        })
    }

    /// Load and validate an override document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read override file: {}", path.display()))?;

        let mut overrides = Self::parse(&contents)
            .with_context(|| format!("invalid override file: {}", path.display()))?;
        overrides.source = Some(path.to_path_buf());
        Ok(overrides)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every override to a batch of candidates.
    ///
    /// Entries that cannot be applied unambiguously are skipped and
    /// reported as warnings. A pattern stays ambiguous once it has matched
    /// several candidates, counting the batches applied before.
    pub fn apply(&mut self, candidates: &mut [ModCandidate]) -> Vec<Diagnostic> {
        let mut warnings = Vec::new();
        let source = self.source.as_deref();
        self.matched.resize(self.entries.len(), BTreeSet::new());

        for (entry, seen) in self.entries.iter().zip(self.matched.iter_mut()) {
            let matched: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, candidate)| match &entry.key {
                    OverrideKey::Path(path) => candidate.origin() == path.as_str(),
                    OverrideKey::Pattern(pattern) => pattern.matches(candidate.id()),
                })
                .map(|(index, _)| index)
                .collect();

            if matched.is_empty() {
                continue;
            }
            if matches!(entry.key, OverrideKey::Pattern(_)) {
                seen.extend(matched.iter().map(|i| candidates[*i].key()));
                if seen.len() > 1 {
                    let keys: Vec<&str> = seen.iter().map(String::as_str).collect();
                    warnings.push(
                        located(
                            source,
                            format!("{} matches several mods; skipping it", entry.describe()),
                        )
                        .with_context(format!("matched: {}", keys.join(", ")))
                        .with_suggestion("Use a `path` key or a narrower pattern"),
                    );
                    continue;
                }
            }

            for index in matched {
                let candidate = &mut candidates[index];
                debug!("applying {} to {}", entry.describe(), candidate.key());

                for (overrides, kind) in [
                    (&entry.depends, DeclarationKind::Depends),
                    (&entry.breaks, DeclarationKind::Breaks),
                ] {
                    if overrides.is_empty() {
                        continue;
                    }
                    let current = match kind {
                        DeclarationKind::Depends => candidate.dependencies(),
                        DeclarationKind::Breaks => candidate.conflicts(),
                    };
                    let (rewritten, problems) = overrides.apply(current);
                    for problem in problems {
                        warnings.push(
                            located(
                                source,
                                format!("{} on {}: {}", entry.describe(), candidate.key(), problem),
                            )
                            .with_suggestion(suggestions::OVERRIDE_SKIPPED),
                        );
                    }
                    match kind {
                        DeclarationKind::Depends => candidate.set_depends(rewritten),
                        DeclarationKind::Breaks => candidate.set_breaks(rewritten),
                    }
                }
            }
        }

        warnings
    }
}

fn located(source: Option<&Path>, message: String) -> Diagnostic {
    let diag = Diagnostic::warning(message);
    match source {
        Some(path) => diag.with_location(path),
        None => diag,
    }
}
