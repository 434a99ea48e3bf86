//! Candidate mods.
//!
//! A candidate is one discovered mod file: an identity, a version, the
//! aliases it provides and the dependencies and conflicts it declares. The
//! discovery layer hands candidates to the solver either directly or through
//! a `mods.toml` document.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::dependency::{
    DeclarationKind, DependencySpec, DependencySpecError, ModDependency,
};
use crate::core::identifier::{is_valid_id, ModIdentifier};
use crate::core::version::{ModVersion, VersionError};

/// A candidate declaration rejected before it reaches the solver.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum DeclarationError {
    #[error("failed to parse candidate document")]
    #[diagnostic(code(modsolve::declaration::syntax))]
    Malformed(#[source] toml::de::Error),

    #[error("mod id `{0}` is not valid")]
    #[diagnostic(
        code(modsolve::declaration::identifier),
        help("mod ids must be non-empty and contain no whitespace or `:`")
    )]
    InvalidIdentifier(String),

    #[error("mod `{mod_id}` has an invalid version")]
    #[diagnostic(code(modsolve::declaration::version))]
    InvalidVersion {
        mod_id: String,
        #[source]
        source: VersionError,
    },

    #[error("mod `{mod_id}` has an invalid declaration")]
    #[diagnostic(
        code(modsolve::declaration::dependency),
        help("ranges look like `*`, `1.2.0`, `[2.0,3.0)` or `>=1.0, <2.0` and must match at least one version")
    )]
    InvalidDependency {
        mod_id: String,
        #[source]
        source: DependencySpecError,
    },

    #[error("candidate `{0}` is declared more than once")]
    #[diagnostic(
        code(modsolve::declaration::duplicate),
        help("each origin may declare a given mod id and version only once")
    )]
    DuplicateCandidate(String),
}

/// An alias provided by a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedMod {
    pub id: String,
    /// Version of the alias; the providing mod's version when absent
    pub version: Option<ModVersion>,
}

impl ProvidedMod {
    pub fn new(id: impl Into<String>) -> Self {
        ProvidedMod {
            id: id.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: ModVersion) -> Self {
        self.version = Some(version);
        self
    }
}

/// A discovered mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModCandidate {
    id: String,
    group: Option<String>,
    name: Option<String>,
    version: ModVersion,
    mandatory: bool,
    origin: String,
    issues: Option<String>,
    provides: Vec<ProvidedMod>,
    depends: Vec<ModDependency>,
    breaks: Vec<ModDependency>,
}

impl ModCandidate {
    /// Create a candidate with no declarations.
    pub fn new(id: impl Into<String>, version: ModVersion, origin: impl Into<String>) -> Self {
        ModCandidate {
            id: id.into(),
            group: None,
            name: None,
            version,
            mandatory: false,
            origin: origin.into(),
            issues: None,
            provides: Vec::new(),
            depends: Vec::new(),
            breaks: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_issues(mut self, url: impl Into<String>) -> Self {
        self.issues = Some(url.into());
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    pub fn provides(mut self, provided: ProvidedMod) -> Self {
        self.provides.push(provided);
        self
    }

    pub fn depends(mut self, dependency: impl Into<ModDependency>) -> Self {
        self.depends.push(dependency.into());
        self
    }

    pub fn breaks(mut self, conflict: impl Into<ModDependency>) -> Self {
        self.breaks.push(conflict.into());
        self
    }

    /// Replace the declared dependencies.
    pub fn set_depends(&mut self, depends: Vec<ModDependency>) {
        self.depends = depends;
    }

    /// Replace the declared conflicts.
    pub fn set_breaks(&mut self, breaks: Vec<ModDependency>) {
        self.breaks = breaks;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn version(&self) -> &ModVersion {
        &self.version
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Where the candidate was found. Opaque to the solver.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn issues(&self) -> Option<&str> {
        self.issues.as_deref()
    }

    pub fn provided(&self) -> &[ProvidedMod] {
        &self.provides
    }

    pub fn dependencies(&self) -> &[ModDependency] {
        &self.depends
    }

    pub fn conflicts(&self) -> &[ModDependency] {
        &self.breaks
    }

    /// Stable key: `id@version#origin`.
    pub fn key(&self) -> String {
        format!("{}@{}#{}", self.id, self.version, self.origin)
    }

    /// Every identity this candidate can satisfy: its own id, then provided aliases.
    ///
    /// Identities are bare mod ids. The maven group only narrows which
    /// candidates a grouped declaration accepts (see [`Self::answers_to`]),
    /// so `a:lib` and `b:lib` compete for the single `lib` identity.
    pub fn identities(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        std::iter::once(self.id.as_str())
            .chain(self.provides.iter().map(|p| p.id.as_str()))
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Version this candidate offers for an identity, if it has that identity.
    pub fn version_for(&self, id: &str) -> Option<&ModVersion> {
        if self.id == id {
            return Some(&self.version);
        }
        self.provides
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.version.as_ref().unwrap_or(&self.version))
    }

    /// Check whether the candidate is named by an identifier.
    ///
    /// Provided aliases carry no group, so a grouped identifier only matches
    /// the candidate's own id.
    pub fn answers_to(&self, target: &ModIdentifier) -> bool {
        if target.matches(&self.id, self.group.as_deref()) {
            return true;
        }
        target.group().is_none() && self.provides.iter().any(|p| p.id == target.id())
    }

    /// Check identifiers and aliases.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if !is_valid_id(&self.id) {
            return Err(DeclarationError::InvalidIdentifier(self.id.clone()));
        }
        for provided in &self.provides {
            if !is_valid_id(&provided.id) {
                return Err(DeclarationError::InvalidIdentifier(provided.id.clone()));
            }
        }
        Ok(())
    }
}

/// Alias as written in a candidate document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProvidedSpec {
    Simple(String),
    Detailed {
        id: String,
        #[serde(default)]
        version: Option<String>,
    },
}

/// One `[[mod]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub id: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub mandatory: bool,
    pub origin: String,
    #[serde(default)]
    pub issues: Option<String>,
    #[serde(default)]
    pub provides: Vec<ProvidedSpec>,
    #[serde(default)]
    pub depends: Vec<DependencySpec>,
    #[serde(default)]
    pub breaks: Vec<DependencySpec>,
}

impl CandidateSpec {
    /// Convert into a validated candidate.
    pub fn to_candidate(&self) -> Result<ModCandidate, DeclarationError> {
        let version_err = |source| DeclarationError::InvalidVersion {
            mod_id: self.id.clone(),
            source,
        };
        let dependency_err = |source| DeclarationError::InvalidDependency {
            mod_id: self.id.clone(),
            source,
        };

        let mut candidate = ModCandidate::new(
            &self.id,
            ModVersion::parse(&self.version).map_err(version_err)?,
            &self.origin,
        )
        .mandatory(self.mandatory);
        candidate.group = self.group.clone();
        candidate.name = self.name.clone();
        candidate.issues = self.issues.clone();

        for provided in &self.provides {
            candidate.provides.push(match provided {
                ProvidedSpec::Simple(id) => ProvidedMod::new(id),
                ProvidedSpec::Detailed { id, version } => ProvidedMod {
                    id: id.clone(),
                    version: version
                        .as_deref()
                        .map(ModVersion::parse)
                        .transpose()
                        .map_err(version_err)?,
                },
            });
        }

        for spec in &self.depends {
            let dep = spec
                .to_dependency(DeclarationKind::Depends)
                .map_err(dependency_err)?;
            candidate.depends.push(dep);
        }
        for spec in &self.breaks {
            let dep = spec
                .to_dependency(DeclarationKind::Breaks)
                .map_err(dependency_err)?;
            candidate.breaks.push(dep);
        }

        candidate.validate()?;
        Ok(candidate)
    }
}

/// A `mods.toml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateDocument {
    #[serde(rename = "mod", default)]
    pub mods: Vec<CandidateSpec>,
}

impl CandidateDocument {
    /// Parse and validate a candidate document.
    pub fn parse(contents: &str) -> Result<Vec<ModCandidate>, DeclarationError> {
        let document: CandidateDocument =
            toml::from_str(contents).map_err(DeclarationError::Malformed)?;
        document.to_candidates()
    }

    /// Load and validate a candidate document from disk.
    pub fn load(path: &Path) -> Result<Vec<ModCandidate>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read candidate file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("invalid candidate file: {}", path.display()))
    }

    /// Validate every declared candidate.
    pub fn to_candidates(&self) -> Result<Vec<ModCandidate>, DeclarationError> {
        let mut keys = BTreeSet::new();
        let mut candidates = Vec::with_capacity(self.mods.len());

        for spec in &self.mods {
            let candidate = spec.to_candidate()?;
            if !keys.insert(candidate.key()) {
                return Err(DeclarationError::DuplicateCandidate(candidate.key()));
            }
            candidates.push(candidate);
        }

        Ok(candidates)
    }
}
