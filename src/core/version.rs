//! Mod versions and version ranges.
//!
//! Versions are read leniently into semver where possible and kept as raw
//! text otherwise. Ranges are interval sets over semver versions built on
//! PubGrub's `Range`, plus exact raw versions for mods that do not use
//! semantic versioning.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Bound;

use pubgrub::Range;
use semver::{BuildMetadata, Comparator, Op, Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error produced while reading versions or version ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version must not be empty")]
    EmptyVersion,

    #[error("invalid version range `{input}`: {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("version range `{0}` does not match any version")]
    EmptyRange(String),
}

/// A mod version.
///
/// The raw text is always kept for display. When the text can be read as a
/// (possibly incomplete) semantic version, the semver form is used for
/// ordering and range matching.
#[derive(Debug, Clone)]
pub struct ModVersion {
    raw: String,
    semantic: Option<Version>,
}

impl ModVersion {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(VersionError::EmptyVersion);
        }

        Ok(ModVersion {
            raw: raw.to_string(),
            semantic: parse_version_lenient(raw),
        })
    }

    /// Create a version from a semver version.
    pub fn from_semver(version: Version) -> Self {
        ModVersion {
            raw: version.to_string(),
            semantic: Some(version),
        }
    }

    /// The version exactly as declared.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The semantic form, if the version could be read as one.
    pub fn semantic(&self) -> Option<&Version> {
        self.semantic.as_ref()
    }
}

impl PartialEq for ModVersion {
    fn eq(&self, other: &Self) -> bool {
        match (&self.semantic, &other.semantic) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.raw == other.raw,
            _ => false,
        }
    }
}

impl Eq for ModVersion {}

impl Hash for ModVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.semantic {
            Some(v) => v.hash(state),
            None => self.raw.hash(state),
        }
    }
}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.semantic, &other.semantic) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl fmt::Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ModVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ModVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ModVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a version string, allowing for incomplete versions.
///
/// Accepts `1`, `1.2`, `1.2.3`, an optional leading `v`, and pre-release or
/// build suffixes on any of those.
pub fn parse_version_lenient(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s.strip_prefix(&['v', 'V'][..]).unwrap_or(s);

    // Try exact parse first
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    // Split off pre-release and build suffixes
    let (core, suffix) = match s.find(&['-', '+'][..]) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };

    // Try adding missing components
    let parts: Vec<&str> = core.split('.').collect();
    let padded = match parts.len() {
        1 => format!("{}.0.0{}", parts[0], suffix),
        2 => format!("{}.{}.0{}", parts[0], parts[1], suffix),
        _ => return None,
    };

    Version::parse(&padded).ok()
}

/// A set of acceptable versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    /// Intervals over semantic versions
    semantic: Range<Version>,
    /// Exact raw versions (for non-semantic versions)
    raw: BTreeSet<String>,
    /// Matches every version, semantic or not
    wildcard: bool,
}

impl VersionRange {
    /// A range matching every version.
    pub fn any() -> Self {
        VersionRange {
            semantic: Range::full(),
            raw: BTreeSet::new(),
            wildcard: true,
        }
    }

    /// A range matching nothing. Never valid in a declaration.
    pub fn none() -> Self {
        VersionRange {
            semantic: Range::empty(),
            raw: BTreeSet::new(),
            wildcard: false,
        }
    }

    /// A range matching exactly one version.
    pub fn exact(version: &ModVersion) -> Self {
        match version.semantic() {
            Some(v) => VersionRange {
                semantic: Range::singleton(v.clone()),
                raw: BTreeSet::new(),
                wildcard: false,
            },
            None => VersionRange {
                semantic: Range::empty(),
                raw: BTreeSet::from([version.raw().to_string()]),
                wildcard: false,
            },
        }
    }

    /// Parse a range expression.
    ///
    /// Alternatives separated by `||` are unioned. A range that matches no
    /// version at all is rejected.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(VersionRange::any());
        }

        let mut range = VersionRange::none();
        for alternative in trimmed.split("||") {
            range = range.union(&parse_alternative(alternative.trim(), input)?);
        }

        if range.is_empty() {
            return Err(VersionError::EmptyRange(input.to_string()));
        }

        Ok(range)
    }

    /// Parse several range expressions and union them.
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Self, VersionError> {
        if inputs.is_empty() {
            return Ok(VersionRange::any());
        }

        let mut range = VersionRange::none();
        for input in inputs {
            range = range.union(&VersionRange::parse(input.as_ref())?);
        }
        Ok(range)
    }

    /// Union of two ranges.
    pub fn union(&self, other: &VersionRange) -> VersionRange {
        VersionRange {
            semantic: self.semantic.union(&other.semantic),
            raw: self.raw.union(&other.raw).cloned().collect(),
            wildcard: self.wildcard || other.wildcard,
        }
    }

    /// Check whether a version is inside this range.
    pub fn matches(&self, version: &ModVersion) -> bool {
        if self.wildcard {
            return true;
        }

        match version.semantic() {
            Some(v) => self.semantic.contains(v),
            None => self.raw.contains(version.raw()),
        }
    }

    /// Check whether this range matches nothing.
    pub fn is_empty(&self) -> bool {
        !self.wildcard && self.semantic.is_empty() && self.raw.is_empty()
    }

    /// Check whether this range matches everything.
    pub fn is_any(&self) -> bool {
        self.wildcard
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        VersionRange::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            return f.write_str("*");
        }

        let mut parts: Vec<String> = self
            .semantic
            .iter()
            .map(|(lower, upper)| format_interval(lower, upper))
            .collect();
        parts.extend(self.raw.iter().cloned());

        if parts.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str(&parts.join(" or "))
        }
    }
}

fn format_interval(lower: &Bound<Version>, upper: &Bound<Version>) -> String {
    match (lower, upper) {
        (Bound::Unbounded, Bound::Unbounded) => "*".to_string(),
        (Bound::Included(a), Bound::Included(b)) if a == b => a.to_string(),
        (Bound::Included(a), Bound::Unbounded) => format!(">={}", a),
        (Bound::Excluded(a), Bound::Unbounded) => format!(">{}", a),
        (Bound::Unbounded, Bound::Included(b)) => format!("<={}", b),
        (Bound::Unbounded, Bound::Excluded(b)) => format!("<{}", b),
        (
            Bound::Included(low) | Bound::Excluded(low),
            Bound::Included(high) | Bound::Excluded(high),
        ) => {
            let open = if matches!(lower, Bound::Included(_)) { '[' } else { '(' };
            let close = if matches!(upper, Bound::Included(_)) { ']' } else { ')' };
            format!("{}{}, {}{}", open, low, high, close)
        }
    }
}

/// Parse one alternative of a range expression.
fn parse_alternative(s: &str, input: &str) -> Result<VersionRange, VersionError> {
    if s.is_empty() || s == "*" {
        return Ok(VersionRange::any());
    }

    if s.starts_with('[') || s.starts_with('(') {
        return parse_interval(s, input);
    }

    let starts_with_operator = s.starts_with(&['>', '<', '=', '^', '~'][..]);
    if !starts_with_operator && !s.contains(&[',', ' ', '*'][..]) {
        // Bare version: exact match
        let version = ModVersion::parse(s)?;
        return Ok(VersionRange::exact(&version));
    }

    let req = VersionReq::parse(&normalize_comparators(s)).map_err(|e| {
        VersionError::InvalidRange {
            input: input.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(VersionRange {
        semantic: version_req_to_range(&req),
        raw: BTreeSet::new(),
        wildcard: false,
    })
}

/// Rewrite whitespace-separated comparators into the comma form semver expects.
///
/// `>= 1.0 <2` becomes `>=1.0, <2`.
fn normalize_comparators(s: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_operator = String::new();

    for token in s.split(&[',', ' '][..]).filter(|t| !t.is_empty()) {
        if token.chars().all(|c| matches!(c, '>' | '<' | '=' | '^' | '~')) {
            pending_operator.push_str(token);
            continue;
        }
        comparators.push(format!("{}{}", pending_operator, token));
        pending_operator.clear();
    }

    comparators.join(", ")
}

/// Parse maven-style interval notation: `[a,b)`, `(a,b]`, `[a,)`, `(,b]`, `[a]`.
fn parse_interval(s: &str, input: &str) -> Result<VersionRange, VersionError> {
    let invalid = |reason: &str| VersionError::InvalidRange {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let lower_inclusive = s.starts_with('[');
    let upper_inclusive = match s.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(invalid("interval must end with `]` or `)`")),
    };
    let inner = &s[1..s.len() - 1];

    let read_bound = |text: &str| -> Result<Option<Version>, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        parse_version_lenient(text)
            .map(Some)
            .ok_or_else(|| invalid(&format!("`{}` is not a semantic version", text)))
    };

    let Some((low, high)) = inner.split_once(',') else {
        // [a] is an exact version
        if !(lower_inclusive && upper_inclusive) {
            return Err(invalid("single-version interval must use `[` and `]`"));
        }
        let version = read_bound(inner)?.ok_or_else(|| invalid("empty interval"))?;
        return Ok(VersionRange {
            semantic: Range::singleton(version),
            raw: BTreeSet::new(),
            wildcard: false,
        });
    };

    let lower = match read_bound(low)? {
        Some(v) if lower_inclusive => Range::higher_than(v),
        Some(v) => Range::strictly_higher_than(v),
        None => Range::full(),
    };
    let upper = match read_bound(high)? {
        Some(v) if upper_inclusive => Range::lower_than(v),
        Some(v) => Range::strictly_lower_than(v),
        None => Range::full(),
    };

    Ok(VersionRange {
        semantic: lower.intersection(&upper),
        raw: BTreeSet::new(),
        wildcard: false,
    })
}

/// Convert a semver VersionReq to a PubGrub Range.
pub fn version_req_to_range(req: &VersionReq) -> Range<Version> {
    if req.comparators.is_empty() {
        return Range::full();
    }

    let mut range = Range::full();

    for comp in &req.comparators {
        let comp_range = comparator_to_range(comp);
        range = range.intersection(&comp_range);
    }

    range
}

/// Convert a single semver Comparator to a PubGrub Range.
///
/// Partial comparators follow semver's reading: `<=1.2` admits every `1.2.x`,
/// `>1.2` starts at `1.3.0`, and `=1.2` means `1.2.x`.
fn comparator_to_range(comp: &Comparator) -> Range<Version> {
    let major = comp.major;
    let minor = comp.minor.unwrap_or(0);
    let patch = comp.patch.unwrap_or(0);

    let version = Version {
        major,
        minor,
        patch,
        pre: comp.pre.clone(),
        build: BuildMetadata::EMPTY,
    };

    // First version past the precision the comparator was written with
    let next = if comp.minor.is_none() {
        Version::new(major + 1, 0, 0)
    } else if comp.patch.is_none() {
        Version::new(major, minor + 1, 0)
    } else {
        Version::new(major, minor, patch + 1)
    };

    match comp.op {
        Op::Exact | Op::Wildcard => {
            if comp.patch.is_some() && comp.op == Op::Exact {
                Range::singleton(version)
            } else {
                Range::between(version, next)
            }
        }

        Op::Greater => {
            if comp.patch.is_some() {
                Range::strictly_higher_than(version)
            } else {
                Range::higher_than(next)
            }
        }

        Op::GreaterEq => Range::higher_than(version),

        Op::Less => Range::strictly_lower_than(version),

        Op::LessEq => {
            if comp.patch.is_some() {
                Range::lower_than(version)
            } else {
                Range::strictly_lower_than(next)
            }
        }

        Op::Tilde => {
            // ~1.2.3 means >=1.2.3 <1.3.0, ~1 means >=1.0.0 <2.0.0
            let upper = if comp.minor.is_some() {
                Version::new(major, minor + 1, 0)
            } else {
                Version::new(major + 1, 0, 0)
            };

            Range::between(version, upper)
        }

        Op::Caret => {
            // ^x.y.z allows changes that don't modify the left-most non-zero digit
            let upper = if major > 0 || comp.minor.is_none() {
                Version::new(major + 1, 0, 0)
            } else if minor > 0 || comp.patch.is_none() {
                Version::new(0, minor + 1, 0)
            } else {
                Version::new(0, 0, patch + 1)
            };

            Range::between(version, upper)
        }

        _ => Range::full(),
    }
}
