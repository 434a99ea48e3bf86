//! The resolution context: options, rules and weights for one resolution
//! session.
//!
//! Every mutation is recorded in an event log. Adding an option pushes it to
//! every rule, and adding a rule replays every live option into it, so a rule
//! may be declared before the mods it references have been discovered.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::solver::definition::OptionalDefinition;
use crate::solver::option::{LoadOption, OptionId, OptionStore};
use crate::solver::rule::{Clause, ClauseCollector, Rule, RuleId};

/// Misuse of the resolution context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("option `{option}` already has a mandatory definition")]
    DuplicateMandatory { option: String },

    #[error("identity `{identity}` already has an optional definition")]
    DuplicateOptional { identity: String },

    #[error("unknown option {0}")]
    UnknownOption(OptionId),

    #[error("unknown rule {0}")]
    UnknownRule(RuleId),
}

/// One recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    OptionAdded(OptionId),
    OptionRemoved(OptionId),
    RuleAdded(RuleId),
    RuleRemoved(RuleId),
    WeightSet {
        option: OptionId,
        rule: RuleId,
        weight: i32,
    },
}

#[derive(Debug, Clone)]
struct RuleSlot {
    rule: Rule,
    /// The rule as it was declared, before any option was pushed into it
    template: Rule,
    live: bool,
}

/// Options and rules accumulated across discovery cycles.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    options: OptionStore,
    rules: Vec<RuleSlot>,
    events: Vec<ContextEvent>,
    weights: BTreeMap<OptionId, BTreeMap<RuleId, i32>>,
    mandatory: BTreeMap<OptionId, RuleId>,
    optional: BTreeMap<String, RuleId>,
    clauses: BTreeMap<RuleId, Vec<Clause>>,
    dirty: BTreeSet<RuleId>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or revive an option and notify every live rule.
    pub fn add_option(&mut self, option: LoadOption) -> OptionId {
        let (id, became_live) = self.options.insert(option);
        if !became_live {
            return id;
        }

        tracing::trace!("option {} added: {}", id, self.options.describe(id));
        self.events.push(ContextEvent::OptionAdded(id));
        self.notify(id, true);
        id
    }

    /// Remove an option and notify every live rule.
    ///
    /// Rules declared by the option stay registered but emit nothing until
    /// the option is added again.
    pub fn remove_option(&mut self, id: OptionId) -> Result<(), ContextError> {
        if id.index() >= self.options.len() {
            return Err(ContextError::UnknownOption(id));
        }
        if !self.options.remove(id) {
            return Ok(());
        }

        tracing::trace!("option {} removed", id);
        self.events.push(ContextEvent::OptionRemoved(id));
        self.notify(id, false);
        Ok(())
    }

    fn notify(&mut self, id: OptionId, added: bool) {
        let option = match self.options.get(id) {
            Some(option) => option.clone(),
            None => return,
        };

        for (index, slot) in self.rules.iter_mut().enumerate() {
            if !slot.live {
                continue;
            }
            let changed = if added {
                slot.rule.on_option_added(id, &option)
            } else {
                slot.rule.on_option_removed(id)
            };
            if changed {
                self.dirty.insert(RuleId::from_index(index));
            }
        }
    }

    /// Register a rule and replay every live option into it.
    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleId, ContextError> {
        let id = RuleId::from_index(self.rules.len());

        match &rule {
            Rule::Mandatory(def) => {
                if self.options.get(def.option).is_none() {
                    return Err(ContextError::UnknownOption(def.option));
                }
                if self.mandatory.contains_key(&def.option) {
                    return Err(ContextError::DuplicateMandatory {
                        option: self.options.describe(def.option),
                    });
                }
                self.mandatory.insert(def.option, id);
            }
            Rule::Optional(def) => {
                if self.optional.contains_key(&def.identity) {
                    return Err(ContextError::DuplicateOptional {
                        identity: def.identity.clone(),
                    });
                }
                self.optional.insert(def.identity.clone(), id);
            }
            _ => {}
        }

        let mut template = rule;
        template.reset();
        let mut live_rule = template.clone();
        for (option_id, option) in self.options.live() {
            live_rule.on_option_added(option_id, option);
        }

        self.rules.push(RuleSlot {
            rule: live_rule,
            template,
            live: true,
        });
        self.events.push(ContextEvent::RuleAdded(id));
        self.dirty.insert(id);
        Ok(id)
    }

    /// Unregister a rule.
    pub fn remove_rule(&mut self, id: RuleId) -> Result<(), ContextError> {
        let slot = self
            .rules
            .get_mut(id.index())
            .ok_or(ContextError::UnknownRule(id))?;
        if !slot.live {
            return Ok(());
        }
        slot.live = false;

        match &slot.rule {
            Rule::Mandatory(def) => {
                self.mandatory.remove(&def.option);
            }
            Rule::Optional(def) => {
                self.optional.remove(&def.identity);
            }
            _ => {}
        }

        for weights in self.weights.values_mut() {
            weights.remove(&id);
        }
        self.clauses.remove(&id);
        self.dirty.remove(&id);
        self.events.push(ContextEvent::RuleRemoved(id));
        Ok(())
    }

    /// Swap one rule for another, e.g. a Mandatory definition for a Disabled one.
    pub fn replace_rule(&mut self, old: RuleId, new: Rule) -> Result<RuleId, ContextError> {
        self.remove_rule(old)?;
        self.add_rule(new)
    }

    /// Force a rule to emit its clauses again on the next solve.
    pub fn redefine(&mut self, id: RuleId) -> Result<(), ContextError> {
        match self.rules.get(id.index()) {
            Some(slot) if slot.live => {
                self.dirty.insert(id);
                Ok(())
            }
            _ => Err(ContextError::UnknownRule(id)),
        }
    }

    /// Record a soft preference for an option on behalf of a rule.
    ///
    /// Lower total weight is tried first.
    pub fn set_weight(&mut self, option: OptionId, rule: RuleId, weight: i32) -> Result<(), ContextError> {
        if option.index() >= self.options.len() {
            return Err(ContextError::UnknownOption(option));
        }
        if !self.is_rule_live(rule) {
            return Err(ContextError::UnknownRule(rule));
        }

        let entry = self.weights.entry(option).or_default();
        if entry.get(&rule) == Some(&weight) {
            return Ok(());
        }
        entry.insert(rule, weight);
        self.events.push(ContextEvent::WeightSet {
            option,
            rule,
            weight,
        });
        Ok(())
    }

    /// Sum of every weight recorded for an option.
    pub fn weight(&self, option: OptionId) -> i32 {
        self.weights
            .get(&option)
            .map(|weights| weights.values().sum())
            .unwrap_or(0)
    }

    /// The Optional definition for an identity, creating it if needed.
    pub fn ensure_optional(&mut self, identity: &str) -> Result<RuleId, ContextError> {
        if let Some(id) = self.optional.get(identity) {
            return Ok(*id);
        }
        self.add_rule(Rule::Optional(OptionalDefinition::new(identity)))
    }

    pub fn optional_definition(&self, identity: &str) -> Option<RuleId> {
        self.optional.get(identity).copied()
    }

    pub fn mandatory_definition(&self, option: OptionId) -> Option<RuleId> {
        self.mandatory.get(&option).copied()
    }

    pub fn options(&self) -> &OptionStore {
        &self.options
    }

    /// A live rule.
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules
            .get(id.index())
            .filter(|slot| slot.live)
            .map(|slot| &slot.rule)
    }

    pub fn is_rule_live(&self, id: RuleId) -> bool {
        self.rule(id).is_some()
    }

    /// Live rules in registration order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.live)
            .map(|(index, slot)| (RuleId::from_index(index), &slot.rule))
    }

    pub fn events(&self) -> &[ContextEvent] {
        &self.events
    }

    /// Clauses of every live rule, re-running `define` for rules that changed.
    pub fn clauses(&mut self) -> Vec<(RuleId, Vec<Clause>)> {
        let dirty = std::mem::take(&mut self.dirty);
        for id in dirty {
            let Some(slot) = self.rules.get(id.index()).filter(|slot| slot.live) else {
                continue;
            };
            let mut collector = ClauseCollector::new();
            slot.rule.define(&self.options, &mut collector);
            self.clauses.insert(id, collector.into_clauses());
        }

        self.rules()
            .map(|(id, _)| (id, self.clauses.get(&id).cloned().unwrap_or_default()))
            .collect()
    }

    /// Rebuild an equivalent context from the event log and the declared
    /// form of every rule.
    pub fn replay(&self) -> Result<ResolutionContext, ContextError> {
        let mut replayed = ResolutionContext::new();

        for event in &self.events {
            match *event {
                ContextEvent::OptionAdded(id) => {
                    let option = self
                        .options
                        .get(id)
                        .cloned()
                        .ok_or(ContextError::UnknownOption(id))?;
                    replayed.add_option(option);
                }
                ContextEvent::OptionRemoved(id) => replayed.remove_option(id)?,
                ContextEvent::RuleAdded(id) => {
                    let template = self
                        .rules
                        .get(id.index())
                        .map(|slot| slot.template.clone())
                        .ok_or(ContextError::UnknownRule(id))?;
                    replayed.add_rule(template)?;
                }
                ContextEvent::RuleRemoved(id) => replayed.remove_rule(id)?,
                ContextEvent::WeightSet {
                    option,
                    rule,
                    weight,
                } => replayed.set_weight(option, rule, weight)?,
            }
        }

        Ok(replayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DependencyOnly, ModDependency, ModIdentifier, VersionRange};
    use crate::solver::definition::{DisabledDefinition, MandatoryDefinition};
    use crate::solver::dependency_rule::RuleBuilder;
    use crate::solver::option::Literal;
    use crate::test_support::fixtures::CandidateFixture;

    fn live_rules(context: &ResolutionContext) -> Vec<(RuleId, Rule)> {
        context.rules().map(|(id, r)| (id, r.clone())).collect()
    }

    #[test]
    fn test_rule_declared_before_target() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let declaration = ModDependency::Only(DependencyOnly::new(ModIdentifier::new("lib")));
        let rule = RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap()
            .rules[0];

        let lib = context.add_option(CandidateFixture::new("lib", "1.0").build().into());
        let clauses = context.clauses();
        let (_, rule_clauses) = clauses.iter().find(|(id, _)| *id == rule).unwrap();
        assert_eq!(
            rule_clauses,
            &vec![Clause::AtLeastOne(vec![
                Literal::negative(foo),
                Literal::positive(lib)
            ])]
        );
    }

    #[test]
    fn test_duplicate_mandatory_rejected() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let first = context
            .add_rule(Rule::Mandatory(MandatoryDefinition::new(foo)))
            .unwrap();

        assert!(matches!(
            context.add_rule(Rule::Mandatory(MandatoryDefinition::new(foo))),
            Err(ContextError::DuplicateMandatory { .. })
        ));

        // Replacement goes through cleanly and frees the slot
        let disabled = context
            .replace_rule(first, Rule::Disabled(DisabledDefinition::new(foo)))
            .unwrap();
        assert!(context.mandatory_definition(foo).is_none());
        assert!(context.is_rule_live(disabled));
        assert!(!context.is_rule_live(first));
    }

    #[test]
    fn test_optional_definition_reused() {
        let mut context = ResolutionContext::new();
        let first = context.ensure_optional("foo").unwrap();
        let second = context.ensure_optional("foo").unwrap();
        assert_eq!(first, second);
        assert_eq!(context.rules().count(), 1);
    }

    #[test]
    fn test_weights_sum() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let a = context.ensure_optional("foo").unwrap();
        let b = context.ensure_optional("other").unwrap();

        context.set_weight(foo, a, 2).unwrap();
        context.set_weight(foo, b, 3).unwrap();
        assert_eq!(context.weight(foo), 5);

        context.remove_rule(b).unwrap();
        assert_eq!(context.weight(foo), 2);
    }

    #[test]
    fn test_remove_then_readd_restores_state() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let lib_candidate = CandidateFixture::new("lib", "2.0").build();
        let lib = context.add_option(lib_candidate.clone().into());
        context.ensure_optional("lib").unwrap();
        let declaration = ModDependency::Only(
            DependencyOnly::new(ModIdentifier::new("lib"))
                .with_range(VersionRange::parse(">=2").unwrap()),
        );
        RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap();

        let rules_before = live_rules(&context);
        let clauses_before = context.clauses();

        context.remove_option(lib).unwrap();
        assert_ne!(live_rules(&context), rules_before);

        let revived = context.add_option(lib_candidate.into());
        assert_eq!(revived, lib);
        assert_eq!(live_rules(&context), rules_before);
        assert_eq!(context.clauses(), clauses_before);
    }

    #[test]
    fn test_replay_matches_live_state() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let mandatory = context
            .add_rule(Rule::Mandatory(MandatoryDefinition::new(foo)))
            .unwrap();
        context.set_weight(foo, mandatory, 1).unwrap();
        let declaration = ModDependency::Only(DependencyOnly::new(ModIdentifier::new("lib")));
        RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap();
        let lib = context.add_option(CandidateFixture::new("lib", "1.0").build().into());
        context.add_option(CandidateFixture::new("lib", "2.0").build().into());
        context.remove_option(lib).unwrap();

        let mut replayed = context.replay().unwrap();
        assert_eq!(replayed.events(), context.events());
        assert_eq!(live_rules(&replayed), live_rules(&context));
        assert_eq!(replayed.weight(foo), context.weight(foo));
        assert_eq!(replayed.clauses(), context.clauses());
    }
}
