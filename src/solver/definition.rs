//! Identity definitions: the root constraints binding a mod to its options.
//!
//! - [`MandatoryDefinition`]: a directly requested candidate must load.
//! - [`DisabledDefinition`]: a candidate must never load.
//! - [`OptionalDefinition`]: one per identity, tracking every option that
//!   answers to it and allowing at most one of them to load.

use std::collections::BTreeSet;

use crate::solver::option::{Literal, LoadOption, OptionId, OptionStore};
use crate::solver::rule::RuleDefiner;

/// A candidate that must be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandatoryDefinition {
    pub option: OptionId,
}

impl MandatoryDefinition {
    pub fn new(option: OptionId) -> Self {
        MandatoryDefinition { option }
    }

    pub fn define(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        if options.is_live(self.option) {
            definer.at_least_one_of(&[Literal::positive(self.option)]);
        }
    }
}

/// A candidate that must not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledDefinition {
    pub option: OptionId,
}

impl DisabledDefinition {
    pub fn new(option: OptionId) -> Self {
        DisabledDefinition { option }
    }

    pub fn define(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        if options.is_live(self.option) {
            definer.at_most(0, &[Literal::positive(self.option)]);
        }
    }
}

/// Every option sharing one identity, own id or provided alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalDefinition {
    pub identity: String,
    pub options: BTreeSet<OptionId>,
}

impl OptionalDefinition {
    pub fn new(identity: impl Into<String>) -> Self {
        OptionalDefinition {
            identity: identity.into(),
            options: BTreeSet::new(),
        }
    }

    pub fn on_option_added(&mut self, id: OptionId, option: &LoadOption) -> bool {
        let Some(m) = option.as_mod() else {
            return false;
        };
        if m.candidate().identities().contains(&self.identity.as_str()) {
            self.options.insert(id)
        } else {
            false
        }
    }

    pub fn on_option_removed(&mut self, id: OptionId) -> bool {
        self.options.remove(&id)
    }

    pub fn define(&self, _options: &OptionStore, definer: &mut dyn RuleDefiner) {
        if self.options.len() > 1 {
            let literals: Vec<Literal> = self.options.iter().copied().map(Literal::positive).collect();
            definer.at_most(1, &literals);
        }
    }
}
