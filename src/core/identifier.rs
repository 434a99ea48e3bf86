//! Mod identifiers.
//!
//! An identifier names a mod id and, optionally, the maven group it must
//! belong to. Declarations write it as `group:id` or just `id`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A mod id with an optional maven group qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModIdentifier {
    group: Option<String>,
    id: String,
}

impl ModIdentifier {
    /// Create an identifier without a group.
    pub fn new(id: impl Into<String>) -> Self {
        ModIdentifier {
            group: None,
            id: id.into(),
        }
    }

    /// Create an identifier qualified by a maven group.
    pub fn with_group(group: impl Into<String>, id: impl Into<String>) -> Self {
        ModIdentifier {
            group: Some(group.into()),
            id: id.into(),
        }
    }

    /// Parse `group:id` or `id`.
    ///
    /// Returns `None` for empty parts or ids containing whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (group, id) = match s.rsplit_once(':') {
            Some((group, id)) => (Some(group), id),
            None => (None, s),
        };

        if !is_valid_id(id) {
            return None;
        }

        match group {
            Some(g) if g.is_empty() || g.contains(char::is_whitespace) => None,
            Some(g) => Some(ModIdentifier::with_group(g, id)),
            None => Some(ModIdentifier::new(id)),
        }
    }

    /// Get the mod id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the maven group, if qualified.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Check whether a mod with the given id and group is named by this identifier.
    ///
    /// An unqualified identifier matches any group.
    pub fn matches(&self, id: &str, group: Option<&str>) -> bool {
        if self.id != id {
            return false;
        }
        match &self.group {
            Some(required) => group == Some(required.as_str()),
            None => true,
        }
    }
}

/// Check that a mod id is usable as an identity.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(char::is_whitespace) && !id.contains(':')
}

impl fmt::Display for ModIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}:{}", group, self.id),
            None => f.write_str(&self.id),
        }
    }
}

impl Serialize for ModIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ModIdentifier::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid mod identifier `{}`", raw)))
    }
}
