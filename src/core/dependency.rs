//! Dependency and conflict declarations.
//!
//! A declaration describes what a mod needs from (or refuses to load with)
//! other mods. Three shapes exist: a single identity and range (`Only`), a
//! choice between several (`Any`, dependencies only), and a conjunction of
//! several (`All`, conflicts only). Any single declaration may carry an
//! `unless` declaration whose presence suppresses it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identifier::ModIdentifier;
use crate::core::version::{VersionError, VersionRange};

/// Which list a declaration was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Depends,
    Breaks,
}

/// Error converting a written declaration into a [`ModDependency`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencySpecError {
    #[error("invalid mod identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("versions of `{target}`: {source}")]
    Range {
        target: String,
        source: VersionError,
    },

    #[error("`any` is only valid in `depends`")]
    AnyInBreaks,

    #[error("`all` is only valid in `breaks`")]
    AllInDepends,

    #[error("`{0}` lists cannot be nested")]
    Nested(&'static str),

    #[error("`{0}` must list at least one declaration")]
    EmptyList(&'static str),
}

/// A single identity + range declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOnly {
    /// The mod being referenced
    pub target: ModIdentifier,
    /// Acceptable (for dependencies) or conflicting (for breaks) versions
    pub range: VersionRange,
    /// Optional dependencies only apply when the target is present at all
    pub optional: bool,
    /// Free-text reason given by the mod author
    pub reason: Option<String>,
    /// Declaration whose truth suppresses this one
    pub unless: Option<Box<ModDependency>>,
}

impl DependencyOnly {
    /// Create a declaration on any version of a mod.
    pub fn new(target: ModIdentifier) -> Self {
        DependencyOnly {
            target,
            range: VersionRange::any(),
            optional: false,
            reason: None,
            unless: None,
        }
    }

    /// Restrict the declaration to a version range.
    pub fn with_range(mut self, range: VersionRange) -> Self {
        self.range = range;
        self
    }

    /// Mark the declaration optional.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Attach a free-text reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach an unless-clause.
    pub fn unless(mut self, unless: ModDependency) -> Self {
        self.unless = Some(Box::new(unless));
        self
    }
}

impl fmt::Display for DependencyOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target, self.range)?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        if let Some(unless) = &self.unless {
            write!(f, " unless {}", unless)?;
        }
        Ok(())
    }
}

/// A declared dependency or conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModDependency {
    Only(DependencyOnly),
    Any(Vec<DependencyOnly>),
    All(Vec<DependencyOnly>),
}

impl ModDependency {
    /// Every single declaration inside this one.
    pub fn parts(&self) -> &[DependencyOnly] {
        match self {
            ModDependency::Only(only) => std::slice::from_ref(only),
            ModDependency::Any(parts) | ModDependency::All(parts) => parts,
        }
    }

    /// Check whether any part references the given mod id.
    pub fn references(&self, id: &str) -> bool {
        self.parts().iter().any(|part| part.target.id() == id)
    }
}

impl From<DependencyOnly> for ModDependency {
    fn from(only: DependencyOnly) -> Self {
        ModDependency::Only(only)
    }
}

impl fmt::Display for ModDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModDependency::Only(only) => write!(f, "{}", only),
            ModDependency::Any(parts) | ModDependency::All(parts) => {
                let word = if matches!(self, ModDependency::Any(_)) {
                    "any of"
                } else {
                    "all of"
                };
                let inner: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{} ({})", word, inner.join(", "))
            }
        }
    }
}

/// Declaration as it appears in a candidate or override document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Simple identifier: `"group:id"`
    Simple(String),

    /// `{ any = [...] }`
    Any { any: Vec<DependencySpec> },

    /// `{ all = [...] }`
    All { all: Vec<DependencySpec> },

    /// Detailed specification
    Detailed(DetailedDependencySpec),
}

/// Versions written as a single expression or a list (union).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionsSpec {
    Single(String),
    Many(Vec<String>),
}

/// Detailed single declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedDependencySpec {
    /// `id` or `group:id`
    pub id: String,

    /// Version range(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionsSpec>,

    /// Only applies when the target is present
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,

    /// Free-text reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Suppressing declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<Box<DependencySpec>>,
}

impl DependencySpec {
    /// Convert into a validated declaration.
    pub fn to_dependency(&self, kind: DeclarationKind) -> Result<ModDependency, DependencySpecError> {
        match self {
            DependencySpec::Simple(_) | DependencySpec::Detailed(_) => {
                Ok(ModDependency::Only(self.to_only()?))
            }
            DependencySpec::Any { any } => {
                if kind == DeclarationKind::Breaks {
                    return Err(DependencySpecError::AnyInBreaks);
                }
                Ok(ModDependency::Any(Self::list_to_parts(any, "any")?))
            }
            DependencySpec::All { all } => {
                if kind == DeclarationKind::Depends {
                    return Err(DependencySpecError::AllInDepends);
                }
                Ok(ModDependency::All(Self::list_to_parts(all, "all")?))
            }
        }
    }

    fn list_to_parts(
        list: &[DependencySpec],
        word: &'static str,
    ) -> Result<Vec<DependencyOnly>, DependencySpecError> {
        if list.is_empty() {
            return Err(DependencySpecError::EmptyList(word));
        }
        list.iter().map(|spec| spec.to_only_in(word)).collect()
    }

    fn to_only_in(&self, word: &'static str) -> Result<DependencyOnly, DependencySpecError> {
        match self {
            DependencySpec::Any { .. } | DependencySpec::All { .. } => {
                Err(DependencySpecError::Nested(word))
            }
            _ => self.to_only(),
        }
    }

    fn to_only(&self) -> Result<DependencyOnly, DependencySpecError> {
        match self {
            DependencySpec::Simple(id) => {
                let target = ModIdentifier::parse(id)
                    .ok_or_else(|| DependencySpecError::InvalidIdentifier(id.clone()))?;
                Ok(DependencyOnly::new(target))
            }
            DependencySpec::Detailed(detailed) => detailed.to_only(),
            DependencySpec::Any { .. } => Err(DependencySpecError::Nested("any")),
            DependencySpec::All { .. } => Err(DependencySpecError::Nested("all")),
        }
    }

    /// Check whether the spec names nothing beyond an identity.
    ///
    /// Overrides use this to decide between fuzzy and exact matching.
    pub fn is_identity_only(&self) -> bool {
        match self {
            DependencySpec::Simple(id) => !id.contains(':'),
            DependencySpec::Detailed(d) => {
                !d.id.contains(':') && d.versions.is_none() && !d.optional && d.unless.is_none()
            }
            DependencySpec::Any { .. } | DependencySpec::All { .. } => false,
        }
    }

    /// The mod id named by a single declaration spec.
    pub fn target_id(&self) -> Option<&str> {
        let raw = match self {
            DependencySpec::Simple(id) => id.as_str(),
            DependencySpec::Detailed(d) => d.id.as_str(),
            DependencySpec::Any { .. } | DependencySpec::All { .. } => return None,
        };
        Some(raw.rsplit_once(':').map(|(_, id)| id).unwrap_or(raw))
    }
}

impl DetailedDependencySpec {
    fn to_only(&self) -> Result<DependencyOnly, DependencySpecError> {
        let target = ModIdentifier::parse(&self.id)
            .ok_or_else(|| DependencySpecError::InvalidIdentifier(self.id.clone()))?;

        let range = match &self.versions {
            None => Ok(VersionRange::any()),
            Some(VersionsSpec::Single(expr)) => VersionRange::parse(expr),
            Some(VersionsSpec::Many(exprs)) => VersionRange::parse_all(exprs),
        }
        .map_err(|source| DependencySpecError::Range {
            target: self.id.clone(),
            source,
        })?;

        let unless = match &self.unless {
            Some(spec) => Some(Box::new(spec.to_dependency(DeclarationKind::Depends)?)),
            None => None,
        };

        Ok(DependencyOnly {
            target,
            range,
            optional: self.optional,
            reason: self.reason.clone(),
            unless,
        })
    }
}
