//! Dependency and conflict rules, and the builder that derives them from
//! declarations.
//!
//! A dependency reads: if the source loads, then the unless-clause holds or
//! a target with a matching version loads. A conflict reads: if the source
//! loads, then the unless-clause holds or no conflicting target loads.

use std::collections::BTreeSet;

use crate::core::{DependencyOnly, ModDependency, ModIdentifier, VersionRange};
use crate::solver::context::{ContextError, ResolutionContext};
use crate::solver::option::{Literal, LoadOption, OptionId, OptionStore, UnlessOption};
use crate::solver::rule::{Rule, RuleDefiner, RuleId};

/// A single identity + range rule, used for both dependencies and conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlyRule {
    pub source: OptionId,
    pub target: ModIdentifier,
    pub range: VersionRange,
    pub optional: bool,
    pub reason: Option<String>,
    /// Option standing for the unless-clause
    pub unless: Option<OptionId>,
    /// Every live option answering to the target identity
    pub all: BTreeSet<OptionId>,
    /// The subset of `all` whose version is inside the range
    pub valid: BTreeSet<OptionId>,
}

impl OnlyRule {
    pub fn new(source: OptionId, target: ModIdentifier, range: VersionRange) -> Self {
        OnlyRule {
            source,
            target,
            range,
            optional: false,
            reason: None,
            unless: None,
            all: BTreeSet::new(),
            valid: BTreeSet::new(),
        }
    }

    fn from_declaration(source: OptionId, declaration: &DependencyOnly, unless: Option<OptionId>) -> Self {
        OnlyRule {
            optional: declaration.optional,
            reason: declaration.reason.clone(),
            unless,
            ..OnlyRule::new(source, declaration.target.clone(), declaration.range.clone())
        }
    }

    pub fn on_option_added(&mut self, id: OptionId, option: &LoadOption) -> bool {
        if id == self.source || Some(id) == self.unless {
            return true;
        }
        let Some(m) = option.as_mod() else {
            return false;
        };
        let candidate = m.candidate();
        if !candidate.answers_to(&self.target) {
            return false;
        }

        self.all.insert(id);
        if candidate
            .version_for(self.target.id())
            .is_some_and(|version| self.range.matches(version))
        {
            self.valid.insert(id);
        }
        true
    }

    pub fn on_option_removed(&mut self, id: OptionId) -> bool {
        let tracked = self.all.remove(&id);
        self.valid.remove(&id);
        tracked || id == self.source || Some(id) == self.unless
    }

    pub fn reset(&mut self) {
        self.all.clear();
        self.valid.clear();
    }

    /// Options this rule can point at.
    pub fn targets(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.all.iter().copied().chain(self.unless)
    }

    /// Options answering to the target with a version outside the range.
    pub fn wrong_versions(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.all.difference(&self.valid).copied()
    }

    /// Check whether the rule imposes nothing because an optional target is absent.
    pub fn is_vacuous(&self) -> bool {
        self.optional && self.all.is_empty()
    }

    /// `target range` as written, for descriptions.
    pub fn declaration(&self) -> String {
        format!("{} {}", self.target, self.range)
    }

    fn escape(&self, options: &OptionStore) -> Option<Literal> {
        self.unless
            .filter(|u| options.is_live(*u))
            .map(Literal::positive)
    }

    pub fn define_dependency(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        if !options.is_live(self.source) || self.is_vacuous() {
            return;
        }

        let mut literals = vec![definer.negate(Literal::positive(self.source))];
        literals.extend(self.escape(options));
        literals.extend(self.valid.iter().copied().map(Literal::positive));
        definer.at_least_one_of(&literals);
    }

    pub fn define_break(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        if !options.is_live(self.source) {
            return;
        }

        let not_source = definer.negate(Literal::positive(self.source));
        let escape = self.escape(options);
        for conflict in self.valid.iter().filter(|c| **c != self.source) {
            let mut literals = vec![not_source];
            literals.extend(escape);
            literals.push(definer.negate(Literal::positive(*conflict)));
            definer.at_least_one_of(&literals);
        }
    }
}

/// At least one of several dependencies must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyRule {
    pub source: OptionId,
    pub parts: Vec<OnlyRule>,
}

impl AnyRule {
    pub fn define(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        if !options.is_live(self.source) || self.parts.iter().any(OnlyRule::is_vacuous) {
            return;
        }

        let mut literals = vec![definer.negate(Literal::positive(self.source))];
        for part in &self.parts {
            literals.extend(part.escape(options));
            literals.extend(part.valid.iter().copied().map(Literal::positive));
        }
        definer.at_least_one_of(&literals);
    }
}

/// Several conflicts declared together; each one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllRule {
    pub source: OptionId,
    pub parts: Vec<OnlyRule>,
}

impl AllRule {
    pub fn define(&self, options: &OptionStore, definer: &mut dyn RuleDefiner) {
        for part in &self.parts {
            part.define_break(options, definer);
        }
    }
}

/// Rules and helper options created for one declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltRules {
    pub rules: Vec<RuleId>,
    pub options: Vec<OptionId>,
}

/// Turns declarations into rules registered with a context.
pub struct RuleBuilder<'a> {
    context: &'a mut ResolutionContext,
    owner: String,
}

impl<'a> RuleBuilder<'a> {
    /// `owner` is the key of the declaring candidate; unless options are
    /// keyed beneath it.
    pub fn new(context: &'a mut ResolutionContext, owner: impl Into<String>) -> Self {
        RuleBuilder {
            context,
            owner: owner.into(),
        }
    }

    /// Build the rules for a `depends` entry.
    ///
    /// `path` locates the declaration inside its owner, e.g. `/depends/2`.
    pub fn build_dependency(
        &mut self,
        source: OptionId,
        path: &str,
        declaration: &ModDependency,
    ) -> Result<BuiltRules, ContextError> {
        let mut built = BuiltRules::default();
        let rule = match declaration {
            ModDependency::Only(only) => {
                Rule::DependencyOnly(self.only(source, path, only, &mut built)?)
            }
            ModDependency::Any(parts) | ModDependency::All(parts) => {
                let parts = self.parts(source, path, parts, &mut built)?;
                Rule::DependencyAny(AnyRule { source, parts })
            }
        };
        built.rules.push(self.context.add_rule(rule)?);
        Ok(built)
    }

    /// Build the rules for a `breaks` entry.
    pub fn build_break(
        &mut self,
        source: OptionId,
        path: &str,
        declaration: &ModDependency,
    ) -> Result<BuiltRules, ContextError> {
        let mut built = BuiltRules::default();
        let rule = match declaration {
            ModDependency::Only(only) => Rule::BreakOnly(self.only(source, path, only, &mut built)?),
            ModDependency::All(parts) | ModDependency::Any(parts) => {
                let parts = self.parts(source, path, parts, &mut built)?;
                Rule::BreakAll(AllRule { source, parts })
            }
        };
        built.rules.push(self.context.add_rule(rule)?);
        Ok(built)
    }

    fn parts(
        &mut self,
        source: OptionId,
        path: &str,
        parts: &[DependencyOnly],
        built: &mut BuiltRules,
    ) -> Result<Vec<OnlyRule>, ContextError> {
        parts
            .iter()
            .enumerate()
            .map(|(i, part)| self.only(source, &format!("{}/{}", path, i), part, built))
            .collect()
    }

    fn only(
        &mut self,
        source: OptionId,
        path: &str,
        declaration: &DependencyOnly,
        built: &mut BuiltRules,
    ) -> Result<OnlyRule, ContextError> {
        let unless = match &declaration.unless {
            Some(unless) => {
                let option = UnlessOption::new(&self.owner, path, unless.to_string());
                let unless_id = self.context.add_option(LoadOption::Unless(option));
                built.options.push(unless_id);

                // The helper option may only be true when its own declaration holds
                let nested = self.build_dependency(unless_id, &format!("{}/unless", path), unless)?;
                built.rules.extend(nested.rules);
                built.options.extend(nested.options);
                Some(unless_id)
            }
            None => None,
        };

        Ok(OnlyRule::from_declaration(source, declaration, unless))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProvidedMod;
    use crate::solver::rule::{Clause, ClauseCollector};
    use crate::test_support::fixtures::CandidateFixture;

    fn clauses(context: &ResolutionContext, rule: RuleId) -> Vec<Clause> {
        let mut collector = ClauseCollector::new();
        context
            .rule(rule)
            .unwrap()
            .define(context.options(), &mut collector);
        collector.into_clauses()
    }

    #[test]
    fn test_dependency_tracks_valid_versions() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let old = context.add_option(CandidateFixture::new("lib", "1.5").build().into());

        let declaration = ModDependency::Only(
            DependencyOnly::new(ModIdentifier::new("lib"))
                .with_range(VersionRange::parse("[2.0,3.0)").unwrap()),
        );
        let built = RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap();
        let rule_id = built.rules[0];

        // Only the wrong version exists: the source is forced off
        assert_eq!(
            clauses(&context, rule_id),
            vec![Clause::AtLeastOne(vec![Literal::negative(foo)])]
        );

        // A matching version discovered later is picked up
        let new = context.add_option(CandidateFixture::new("lib", "2.1").build().into());
        let Some(Rule::DependencyOnly(rule)) = context.rule(rule_id) else {
            panic!("expected a dependency rule");
        };
        assert_eq!(rule.all, BTreeSet::from([old, new]));
        assert_eq!(rule.valid, BTreeSet::from([new]));
        assert_eq!(rule.wrong_versions().collect::<Vec<_>>(), vec![old]);
        assert_eq!(
            clauses(&context, rule_id),
            vec![Clause::AtLeastOne(vec![
                Literal::negative(foo),
                Literal::positive(new)
            ])]
        );
    }

    #[test]
    fn test_provided_alias_version() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let provider = context.add_option(
            CandidateFixture::new("bundle", "1.0")
                .provides(ProvidedMod::new("lib").with_version(crate::core::ModVersion::parse("2.5").unwrap()))
                .build()
                .into(),
        );

        let declaration = ModDependency::Only(
            DependencyOnly::new(ModIdentifier::new("lib"))
                .with_range(VersionRange::parse(">=2.0").unwrap()),
        );
        let built = RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap();

        assert_eq!(
            clauses(&context, built.rules[0]),
            vec![Clause::AtLeastOne(vec![
                Literal::negative(foo),
                Literal::positive(provider)
            ])]
        );
    }

    #[test]
    fn test_optional_dependency_is_vacuous_without_candidates() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());

        let declaration =
            ModDependency::Only(DependencyOnly::new(ModIdentifier::new("lib")).optional(true));
        let built = RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap();
        assert!(clauses(&context, built.rules[0]).is_empty());

        context.add_option(CandidateFixture::new("lib", "1.0").build().into());
        assert_eq!(clauses(&context, built.rules[0]).len(), 1);
    }

    #[test]
    fn test_break_with_unless_builds_helper_option() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let bar = context.add_option(CandidateFixture::new("bar", "1.0").build().into());
        let compat = context.add_option(CandidateFixture::new("compat", "1.0").build().into());

        let declaration = ModDependency::Only(
            DependencyOnly::new(ModIdentifier::new("bar"))
                .unless(DependencyOnly::new(ModIdentifier::new("compat")).into()),
        );
        let built = RuleBuilder::new(&mut context, "foo@1.0#foo.jar")
            .build_break(foo, "/breaks/0", &declaration)
            .unwrap();

        assert_eq!(built.options.len(), 1);
        assert_eq!(built.rules.len(), 2);
        let unless = built.options[0];
        assert_eq!(
            context.options().lookup("foo@1.0#foo.jar/unless/breaks/0"),
            Some(unless)
        );

        // unless -> compat
        assert_eq!(
            clauses(&context, built.rules[0]),
            vec![Clause::AtLeastOne(vec![
                Literal::negative(unless),
                Literal::positive(compat)
            ])]
        );
        // foo -> unless or not bar
        assert_eq!(
            clauses(&context, built.rules[1]),
            vec![Clause::AtLeastOne(vec![
                Literal::negative(foo),
                Literal::positive(unless),
                Literal::negative(bar)
            ])]
        );
    }

    #[test]
    fn test_any_rule_single_clause() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(CandidateFixture::new("foo", "1.0").build().into());
        let a = context.add_option(CandidateFixture::new("a", "1.0").build().into());
        let b = context.add_option(CandidateFixture::new("b", "3.0").build().into());

        let declaration = ModDependency::Any(vec![
            DependencyOnly::new(ModIdentifier::new("a")),
            DependencyOnly::new(ModIdentifier::new("b"))
                .with_range(VersionRange::parse(">=2").unwrap()),
        ]);
        let built = RuleBuilder::new(&mut context, "foo")
            .build_dependency(foo, "/depends/0", &declaration)
            .unwrap();

        assert_eq!(
            clauses(&context, built.rules[0]),
            vec![Clause::AtLeastOne(vec![
                Literal::negative(foo),
                Literal::positive(a),
                Literal::positive(b)
            ])]
        );
    }

    #[test]
    fn test_break_ignores_self() {
        let mut context = ResolutionContext::new();
        let foo = context.add_option(
            CandidateFixture::new("foo", "1.0")
                .provides(ProvidedMod::new("legacy"))
                .build()
                .into(),
        );
        let declaration = ModDependency::Only(DependencyOnly::new(ModIdentifier::new("legacy")));
        let built = RuleBuilder::new(&mut context, "foo")
            .build_break(foo, "/breaks/0", &declaration)
            .unwrap();
        assert!(clauses(&context, built.rules[0]).is_empty());
    }
}
