//! Load options: the boolean variables of a resolution.
//!
//! Every candidate mod becomes one [`ModLoadOption`]. Declarations with an
//! `unless` clause add an [`UnlessOption`], a helper variable that is true
//! only when the unless-clause is satisfied.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{ModCandidate, ModVersion};

/// Index of an option inside a [`OptionStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionId(u32);

impl OptionId {
    pub(crate) fn from_index(index: usize) -> Self {
        OptionId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// An option or its negation.
///
/// Negating twice gives back the same literal, so `¬x` is never created as a
/// separate variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    option: OptionId,
    negated: bool,
}

impl Literal {
    pub fn positive(option: OptionId) -> Self {
        Literal {
            option,
            negated: false,
        }
    }

    pub fn negative(option: OptionId) -> Self {
        Literal {
            option,
            negated: true,
        }
    }

    pub fn negate(self) -> Self {
        Literal {
            option: self.option,
            negated: !self.negated,
        }
    }

    /// The underlying option, with any negation stripped.
    pub fn option(self) -> OptionId {
        self.option
    }

    pub fn is_negated(self) -> bool {
        self.negated
    }
}

impl From<OptionId> for Literal {
    fn from(option: OptionId) -> Self {
        Literal::positive(option)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.option)
        } else {
            write!(f, "{}", self.option)
        }
    }
}

/// A candidate mod as a load option.
///
/// Cheap to clone; the candidate is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModLoadOption {
    candidate: Arc<ModCandidate>,
}

impl ModLoadOption {
    pub fn new(candidate: ModCandidate) -> Self {
        ModLoadOption {
            candidate: Arc::new(candidate),
        }
    }

    pub fn candidate(&self) -> &ModCandidate {
        &self.candidate
    }

    pub fn id(&self) -> &str {
        self.candidate.id()
    }

    pub fn version(&self) -> &ModVersion {
        self.candidate.version()
    }

    pub fn key(&self) -> String {
        self.candidate.key()
    }
}

impl fmt::Display for ModLoadOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.candidate.display_name(),
            self.candidate.version(),
            self.candidate.origin()
        )
    }
}

/// Helper variable standing for "the unless-clause of a declaration holds".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlessOption {
    owner: String,
    path: String,
    description: String,
}

impl UnlessOption {
    /// `owner` is the key of the declaring option, `path` locates the
    /// declaration inside it (for example `/depends/0`).
    pub fn new(
        owner: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        UnlessOption {
            owner: owner.into(),
            path: path.into(),
            description: description.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn key(&self) -> String {
        format!("{}/unless{}", self.owner, self.path)
    }
}

/// A boolean decision variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOption {
    Mod(ModLoadOption),
    Unless(UnlessOption),
}

/// Kind of a load option, used to key result side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Mod,
    Unless,
}

impl LoadOption {
    /// Stable identity. Re-adding an option with a known key revives it.
    pub fn key(&self) -> String {
        match self {
            LoadOption::Mod(m) => m.key(),
            LoadOption::Unless(u) => u.key(),
        }
    }

    pub fn kind(&self) -> OptionKind {
        match self {
            LoadOption::Mod(_) => OptionKind::Mod,
            LoadOption::Unless(_) => OptionKind::Unless,
        }
    }

    pub fn as_mod(&self) -> Option<&ModLoadOption> {
        match self {
            LoadOption::Mod(m) => Some(m),
            LoadOption::Unless(_) => None,
        }
    }
}

impl From<ModCandidate> for LoadOption {
    fn from(candidate: ModCandidate) -> Self {
        LoadOption::Mod(ModLoadOption::new(candidate))
    }
}

impl fmt::Display for LoadOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOption::Mod(m) => write!(f, "{}", m),
            LoadOption::Unless(u) => write!(f, "unless {}", u.description),
        }
    }
}

#[derive(Debug, Clone)]
struct OptionSlot {
    option: LoadOption,
    live: bool,
}

/// Arena of every option ever added, keyed by stable key.
///
/// Removed options keep their slot so that ids stay valid and a later
/// re-add of the same key revives the same id.
#[derive(Debug, Clone, Default)]
pub struct OptionStore {
    slots: IndexMap<String, OptionSlot>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or revive an option.
    ///
    /// Returns the id and whether the option became live (false if it was
    /// already live).
    pub fn insert(&mut self, option: LoadOption) -> (OptionId, bool) {
        let key = option.key();
        if let Some((index, _, slot)) = self.slots.get_full_mut(&key) {
            let revived = !slot.live;
            slot.option = option;
            slot.live = true;
            return (OptionId::from_index(index), revived);
        }

        let (index, _) = self.slots.insert_full(key, OptionSlot { option, live: true });
        (OptionId::from_index(index), true)
    }

    /// Mark an option removed. Returns false if it was not live.
    pub fn remove(&mut self, id: OptionId) -> bool {
        match self.slots.get_index_mut(id.index()) {
            Some((_, slot)) if slot.live => {
                slot.live = false;
                true
            }
            _ => false,
        }
    }

    /// Look up an option, live or not.
    pub fn get(&self, id: OptionId) -> Option<&LoadOption> {
        self.slots.get_index(id.index()).map(|(_, slot)| &slot.option)
    }

    pub fn is_live(&self, id: OptionId) -> bool {
        self.slots
            .get_index(id.index())
            .is_some_and(|(_, slot)| slot.live)
    }

    pub fn lookup(&self, key: &str) -> Option<OptionId> {
        self.slots.get_index_of(key).map(OptionId::from_index)
    }

    /// Live options in insertion order.
    pub fn live(&self) -> impl Iterator<Item = (OptionId, &LoadOption)> {
        self.slots
            .values()
            .enumerate()
            .filter(|(_, slot)| slot.live)
            .map(|(index, slot)| (OptionId::from_index(index), &slot.option))
    }

    /// Human-readable description of an option.
    pub fn describe(&self, id: OptionId) -> String {
        match self.get(id) {
            Some(option) => option.to_string(),
            None => id.to_string(),
        }
    }

    /// Number of slots, live or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::CandidateFixture;

    #[test]
    fn test_literal_negation_is_canonical() {
        let lit = Literal::positive(OptionId::from_index(3));
        assert_eq!(lit.negate().negate(), lit);
        assert_eq!(lit.negate(), Literal::negative(OptionId::from_index(3)));
        assert_eq!(lit.negate().option(), lit.option());
        assert_eq!(lit.negate().to_string(), "!o3");
    }

    #[test]
    fn test_store_revives_same_slot() {
        let mut store = OptionStore::new();
        let foo = CandidateFixture::new("foo", "1.0").build();
        let bar = CandidateFixture::new("bar", "2.0").build();

        let (foo_id, added) = store.insert(foo.clone().into());
        assert!(added);
        let (bar_id, _) = store.insert(bar.into());
        assert_ne!(foo_id, bar_id);

        assert!(store.remove(foo_id));
        assert!(!store.remove(foo_id));
        assert!(!store.is_live(foo_id));
        assert_eq!(store.live().count(), 1);

        let (revived, became_live) = store.insert(foo.into());
        assert_eq!(revived, foo_id);
        assert!(became_live);
        assert_eq!(
            store.live().map(|(id, _)| id).collect::<Vec<_>>(),
            vec![foo_id, bar_id]
        );
    }

    #[test]
    fn test_unless_key() {
        let unless = UnlessOption::new("foo@1.0#foo.jar", "/breaks/0", "compat *");
        let option = LoadOption::Unless(unless);
        assert_eq!(option.key(), "foo@1.0#foo.jar/unless/breaks/0");
        assert_eq!(option.kind(), OptionKind::Unless);
        assert_eq!(option.to_string(), "unless compat *");
    }
}
