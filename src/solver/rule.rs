//! Rules: constraint generators over load options.
//!
//! A rule tracks the options relevant to it as they are added and removed,
//! and emits clauses through a [`RuleDefiner`] when asked to define itself.
//! Rule state is a function of the live option set only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::solver::definition::{DisabledDefinition, MandatoryDefinition, OptionalDefinition};
use crate::solver::dependency_rule::{AllRule, AnyRule, OnlyRule};
use crate::solver::option::{Literal, LoadOption, OptionId, OptionStore};

/// Index of a rule inside a resolution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(u32);

impl RuleId {
    pub(crate) fn from_index(index: usize) -> Self {
        RuleId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Capability a rule uses to emit clauses.
pub trait RuleDefiner {
    /// At least one of the literals must hold.
    fn at_least_one_of(&mut self, literals: &[Literal]);

    /// At most `n` of the literals may hold.
    fn at_most(&mut self, n: u32, literals: &[Literal]);

    /// Negation of a literal.
    fn negate(&self, literal: Literal) -> Literal {
        literal.negate()
    }
}

/// A clause emitted by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    AtLeastOne(Vec<Literal>),
    AtMost(u32, Vec<Literal>),
}

/// A [`RuleDefiner`] that records clauses in emission order.
#[derive(Debug, Default)]
pub struct ClauseCollector {
    clauses: Vec<Clause>,
}

impl ClauseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_clauses(self) -> Vec<Clause> {
        self.clauses
    }
}

impl RuleDefiner for ClauseCollector {
    fn at_least_one_of(&mut self, literals: &[Literal]) {
        self.clauses.push(Clause::AtLeastOne(literals.to_vec()));
    }

    fn at_most(&mut self, n: u32, literals: &[Literal]) {
        self.clauses.push(Clause::AtMost(n, literals.to_vec()));
    }
}

/// A constraint generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Mandatory(MandatoryDefinition),
    Disabled(DisabledDefinition),
    Optional(OptionalDefinition),
    DependencyOnly(OnlyRule),
    DependencyAny(AnyRule),
    BreakOnly(OnlyRule),
    BreakAll(AllRule),
}

impl Rule {
    /// Incorporate a newly live option. Returns true if the rule's clauses may change.
    pub fn on_option_added(&mut self, id: OptionId, option: &LoadOption) -> bool {
        match self {
            Rule::Mandatory(def) => def.option == id,
            Rule::Disabled(def) => def.option == id,
            Rule::Optional(def) => def.on_option_added(id, option),
            Rule::DependencyOnly(rule) | Rule::BreakOnly(rule) => rule.on_option_added(id, option),
            Rule::DependencyAny(AnyRule { parts, .. }) | Rule::BreakAll(AllRule { parts, .. }) => {
                parts
                    .iter_mut()
                    .fold(false, |changed, part| part.on_option_added(id, option) || changed)
            }
        }
    }

    /// Forget a removed option. Returns true if the rule's clauses may change.
    pub fn on_option_removed(&mut self, id: OptionId) -> bool {
        match self {
            Rule::Mandatory(def) => def.option == id,
            Rule::Disabled(def) => def.option == id,
            Rule::Optional(def) => def.on_option_removed(id),
            Rule::DependencyOnly(rule) | Rule::BreakOnly(rule) => rule.on_option_removed(id),
            Rule::DependencyAny(AnyRule { parts, .. }) | Rule::BreakAll(AllRule { parts, .. }) => {
                parts
                    .iter_mut()
                    .fold(false, |changed, part| part.on_option_removed(id) || changed)
            }
        }
    }

    /// Emit this rule's clauses for the current option set.
    pub fn define(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        match self {
            Rule::Mandatory(def) => def.define(options, definer),
            Rule::Disabled(def) => def.define(options, definer),
            Rule::Optional(def) => def.define(options, definer),
            Rule::DependencyOnly(rule) => rule.define_dependency(options, definer),
            Rule::BreakOnly(rule) => rule.define_break(options, definer),
            Rule::DependencyAny(rule) => rule.define(options, definer),
            Rule::BreakAll(rule) => rule.define(options, definer),
        }
    }

    /// Options this rule reads from.
    pub fn nodes_from(&self) -> Vec<OptionId> {
        self.source().into_iter().collect()
    }

    /// Options this rule can constrain.
    pub fn nodes_to(&self) -> Vec<OptionId> {
        match self {
            Rule::Mandatory(def) => vec![def.option],
            Rule::Disabled(def) => vec![def.option],
            Rule::Optional(def) => def.options.iter().copied().collect(),
            Rule::DependencyOnly(rule) | Rule::BreakOnly(rule) => rule.targets().collect(),
            Rule::DependencyAny(AnyRule { parts, .. }) | Rule::BreakAll(AllRule { parts, .. }) => {
                let mut targets: Vec<OptionId> = parts.iter().flat_map(|p| p.targets()).collect();
                targets.sort();
                targets.dedup();
                targets
            }
        }
    }

    /// The option a dependency or break rule is declared by.
    pub fn source(&self) -> Option<OptionId> {
        match self {
            Rule::Mandatory(_) | Rule::Disabled(_) | Rule::Optional(_) => None,
            Rule::DependencyOnly(rule) | Rule::BreakOnly(rule) => Some(rule.source),
            Rule::DependencyAny(rule) => Some(rule.source),
            Rule::BreakAll(rule) => Some(rule.source),
        }
    }

    /// Check whether this is an identity definition.
    pub fn is_definition(&self) -> bool {
        matches!(self, Rule::Mandatory(_) | Rule::Disabled(_) | Rule::Optional(_))
    }

    /// Drop all tracked option state, leaving the rule as first declared.
    pub fn reset(&mut self) {
        match self {
            Rule::Mandatory(_) | Rule::Disabled(_) => {}
            Rule::Optional(def) => def.options.clear(),
            Rule::DependencyOnly(rule) | Rule::BreakOnly(rule) => rule.reset(),
            Rule::DependencyAny(AnyRule { parts, .. }) | Rule::BreakAll(AllRule { parts, .. }) => {
                parts.iter_mut().for_each(OnlyRule::reset)
            }
        }
    }

    /// Plain-text description used when no diagnosis pattern applies.
    pub fn fallback_description(&self, options: &OptionStore) -> String {
        match self {
            Rule::Mandatory(def) => format!("{} is mandatory", options.describe(def.option)),
            Rule::Disabled(def) => format!("{} is disabled", options.describe(def.option)),
            Rule::Optional(def) => {
                let names: Vec<String> = def.options.iter().map(|o| options.describe(*o)).collect();
                format!(
                    "at most one mod may provide `{}`: {}",
                    def.identity,
                    names.join(", ")
                )
            }
            Rule::DependencyOnly(rule) => {
                format!("{} depends on {}", options.describe(rule.source), rule.declaration())
            }
            Rule::BreakOnly(rule) => {
                format!("{} breaks {}", options.describe(rule.source), rule.declaration())
            }
            Rule::DependencyAny(rule) => {
                let parts: Vec<String> = rule.parts.iter().map(|p| p.declaration()).collect();
                format!(
                    "{} depends on any of: {}",
                    options.describe(rule.source),
                    parts.join(", ")
                )
            }
            Rule::BreakAll(rule) => {
                let parts: Vec<String> = rule.parts.iter().map(|p| p.declaration()).collect();
                format!(
                    "{} breaks all of: {}",
                    options.describe(rule.source),
                    parts.join(", ")
                )
            }
        }
    }
}
