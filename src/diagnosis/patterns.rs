//! Recognise common failure shapes in an unsat core.
//!
//! Patterns are tried in order: a broken dependency chain under a single
//! mandatory mod, duplicate mandatory mods, then a breakage between two
//! mandatory mods. Anything else falls back to listing every rule.

use std::collections::BTreeSet;

use tracing::debug;

use crate::diagnosis::errors::{
    BreakageError, CandidateRef, DependencyError, DuplicateMandatoryError,
    SolverError, UnhandledError,
};
use crate::diagnosis::graph::DiagnosisGraph;
use crate::solver::{OnlyRule, OptionId, ResolutionContext, Rule, RuleId, UnsatCore};

/// What diagnosis found for one failed solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub errors: Vec<SolverError>,
    /// A rule whose removal lets the next solve look past this failure
    pub drop_rule: Option<RuleId>,
}

/// Diagnose an unsat core against the context that produced it.
pub fn diagnose(core: &UnsatCore, context: &ResolutionContext) -> Diagnosis {
    let graph = DiagnosisGraph::build(core, context);
    let roots = graph.roots();

    if let Some(diagnosis) = dependency_chain(&graph, &roots, context) {
        debug!("diagnosed a broken dependency chain");
        return diagnosis;
    }
    if let Some(diagnosis) = duplicate_mandatory(&roots, context) {
        debug!("diagnosed duplicate mandatory mods");
        return diagnosis;
    }
    if let Some(diagnosis) = mandatory_breakage(&graph, &roots, context) {
        debug!("diagnosed a breakage between mandatory mods");
        return diagnosis;
    }

    debug!("no pattern matched {} rules", core.rules().len());
    Diagnosis {
        errors: vec![SolverError::Unhandled(UnhandledError {
            rules: core
                .rules()
                .iter()
                .filter_map(|id| context.rule(*id))
                .map(|rule| rule.fallback_description(context.options()))
                .collect(),
        })],
        drop_rule: None,
    }
}

fn candidate_ref(context: &ResolutionContext, option: OptionId) -> Option<CandidateRef> {
    context
        .options()
        .get(option)
        .and_then(|o| o.as_mod())
        .map(CandidateRef::from_option)
}

fn candidate_refs(
    context: &ResolutionContext,
    options: impl IntoIterator<Item = OptionId>,
) -> Option<BTreeSet<CandidateRef>> {
    options
        .into_iter()
        .map(|option| candidate_ref(context, option))
        .collect()
}

/// One mandatory root, followed through dependency rules until every
/// dependency at the current step has no valid target.
fn dependency_chain(
    graph: &DiagnosisGraph,
    roots: &[RuleId],
    context: &ResolutionContext,
) -> Option<Diagnosis> {
    let [root] = roots else {
        return None;
    };
    let Some(Rule::Mandatory(definition)) = context.rule(*root) else {
        return None;
    };

    let mut frontier = BTreeSet::from([definition.option]);
    let mut visited = BTreeSet::new();

    loop {
        let mut step: Vec<(RuleId, &OnlyRule)> = Vec::new();
        for option in &frontier {
            visited.insert(*option);
            for rule_id in graph.rules_from(*option) {
                match context.rule(rule_id) {
                    Some(Rule::DependencyOnly(rule)) => step.push((rule_id, rule)),
                    _ => return None,
                }
            }
        }

        let (_, first) = step.first()?;
        if step.iter().any(|(_, rule)| rule.target != first.target) {
            return None;
        }

        let broken = step.iter().filter(|(_, rule)| rule.valid.is_empty()).count();
        if broken == step.len() {
            // Every frontier node fails on the same target: one error with
            // the combined requirement
            let mut range = first.range.clone();
            let mut sources = BTreeSet::new();
            let mut wrong = BTreeSet::new();
            let mut reasons = BTreeSet::new();
            for (_, rule) in &step {
                range = range.union(&rule.range);
                sources.insert(rule.source);
                wrong.extend(rule.wrong_versions());
                reasons.extend(rule.reason.iter().cloned());
            }

            let error = SolverError::Dependency(DependencyError {
                from: candidate_refs(context, sources)?,
                target: first.target.clone(),
                range,
                wrong_versions: candidate_refs(context, wrong)?,
                reasons,
            });
            return Some(Diagnosis {
                errors: vec![error],
                drop_rule: step.iter().map(|(id, _)| *id).min(),
            });
        }
        if broken > 0 {
            return None;
        }

        frontier = step
            .iter()
            .flat_map(|(_, rule)| rule.valid.iter().copied())
            .filter(|option| !visited.contains(option))
            .collect();
        if frontier.is_empty() {
            return None;
        }
    }
}

/// One optional definition plus several mandatory or disabled definitions
/// whose candidates all answer to its identity.
fn duplicate_mandatory(roots: &[RuleId], context: &ResolutionContext) -> Option<Diagnosis> {
    if roots.len() < 3 {
        return None;
    }

    let mut optional = None;
    let mut fixed = Vec::new();
    for root in roots {
        match context.rule(*root)? {
            Rule::Optional(definition) => {
                if optional.replace((*root, definition)).is_some() {
                    return None;
                }
            }
            Rule::Mandatory(definition) => fixed.push(definition.option),
            Rule::Disabled(definition) => fixed.push(definition.option),
            _ => return None,
        }
    }

    let (optional_id, definition) = optional?;
    if !fixed.iter().all(|option| definition.options.contains(option)) {
        return None;
    }

    let candidates = candidate_refs(context, fixed.iter().copied())?;
    let display_name = fixed
        .iter()
        .filter_map(|option| context.options().get(*option)?.as_mod())
        .find(|m| m.id() == definition.identity)
        .map(|m| m.candidate().display_name().to_string())
        .unwrap_or_else(|| definition.identity.clone());

    Some(Diagnosis {
        errors: vec![SolverError::DuplicateMandatory(DuplicateMandatoryError {
            identity: definition.identity.clone(),
            display_name,
            candidates,
        })],
        drop_rule: Some(optional_id),
    })
}

/// Two mandatory roots where a conflict declared by one hits the other.
fn mandatory_breakage(
    graph: &DiagnosisGraph,
    roots: &[RuleId],
    context: &ResolutionContext,
) -> Option<Diagnosis> {
    let [first, second] = roots else {
        return None;
    };
    let (Some(Rule::Mandatory(a)), Some(Rule::Mandatory(b))) =
        (context.rule(*first), context.rule(*second))
    else {
        return None;
    };

    for (source, victim) in [(a.option, b.option), (b.option, a.option)] {
        for rule_id in graph.rules_from(source) {
            let parts: Vec<&OnlyRule> = match context.rule(rule_id) {
                Some(Rule::BreakOnly(rule)) => vec![rule],
                Some(Rule::BreakAll(rule)) => rule.parts.iter().collect(),
                _ => continue,
            };
            let Some(part) = parts.into_iter().find(|part| part.valid.contains(&victim)) else {
                continue;
            };

            return Some(Diagnosis {
                errors: vec![SolverError::Breakage(BreakageError {
                    from: candidate_refs(context, [source])?,
                    target: part.target.clone(),
                    range: part.range.clone(),
                    conflicting: candidate_refs(context, [victim])?,
                    reasons: part.reason.iter().cloned().collect(),
                })],
                drop_rule: Some(rule_id),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        DependencyOnly, ModCandidate, ModDependency, ModIdentifier, ModVersion, ProvidedMod, VersionRange,
    };
    use crate::diagnosis::errors::Mismatch;
    use crate::solver::{MandatoryDefinition, RuleBuilder, SolverAdapter};
    use crate::test_support::fixtures::CandidateFixture;

    /// Register candidates the way the driver does and solve once.
    fn solve(candidates: Vec<ModCandidate>) -> (ResolutionContext, UnsatCore) {
        let mut context = ResolutionContext::new();
        for candidate in candidates {
            let key = candidate.key();
            let mandatory = candidate.is_mandatory();
            let identities: Vec<String> =
                candidate.identities().into_iter().map(str::to_string).collect();
            let depends = candidate.dependencies().to_vec();
            let breaks = candidate.conflicts().to_vec();

            let option = context.add_option(candidate.into());
            if mandatory {
                context
                    .add_rule(Rule::Mandatory(MandatoryDefinition::new(option)))
                    .unwrap();
            }
            for identity in &identities {
                context.ensure_optional(identity).unwrap();
            }
            let mut builder = RuleBuilder::new(&mut context, key);
            for (i, declaration) in depends.iter().enumerate() {
                builder
                    .build_dependency(option, &format!("/depends/{}", i), declaration)
                    .unwrap();
            }
            for (i, declaration) in breaks.iter().enumerate() {
                builder
                    .build_break(option, &format!("/breaks/{}", i), declaration)
                    .unwrap();
            }
        }
        let core = SolverAdapter::new()
            .solve(&mut context)
            .unwrap()
            .core()
            .unwrap();
        (context, core)
    }

    fn on(id: &str, range: &str) -> ModDependency {
        ModDependency::Only(
            DependencyOnly::new(ModIdentifier::new(id)).with_range(VersionRange::parse(range).unwrap()),
        )
    }

    #[test]
    fn test_missing_dependency() {
        let (context, core) = solve(vec![CandidateFixture::new("foo", "1.0")
            .mandatory()
            .depends(on("lib", "[2.0,3.0)"))
            .build()]);

        let diagnosis = diagnose(&core, &context);
        assert_eq!(diagnosis.errors.len(), 1);
        let SolverError::Dependency(error) = &diagnosis.errors[0] else {
            panic!("expected a dependency error, got {:?}", diagnosis.errors);
        };
        assert_eq!(error.target.id(), "lib");
        assert_eq!(error.mismatch(), Mismatch::Missing);
        assert!(diagnosis.drop_rule.is_some());
    }

    #[test]
    fn test_chain_reaches_transitive_break() {
        let (context, core) = solve(vec![
            CandidateFixture::new("foo", "1.0")
                .mandatory()
                .depends(on("mid", "*"))
                .build(),
            CandidateFixture::new("mid", "1.0")
                .depends(on("lib", ">=2.0"))
                .build(),
            CandidateFixture::new("lib", "1.5").build(),
        ]);

        let diagnosis = diagnose(&core, &context);
        let SolverError::Dependency(error) = &diagnosis.errors[0] else {
            panic!("expected a dependency error, got {:?}", diagnosis.errors);
        };
        assert_eq!(error.from.iter().next().unwrap().id, "mid");
        match error.mismatch() {
            Mismatch::Single(c) => assert_eq!(c.version, "1.5"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chain_combines_frontier_ranges() {
        let (context, core) = solve(vec![
            CandidateFixture::new("foo", "1.0")
                .mandatory()
                .depends(on("mid", "*"))
                .build(),
            CandidateFixture::new("mid", "1.0")
                .depends(on("lib", ">=2.0"))
                .build(),
            CandidateFixture::new("mid", "2.0")
                .depends(on("lib", ">=3.0"))
                .build(),
            CandidateFixture::new("lib", "1.5").build(),
        ]);

        let diagnosis = diagnose(&core, &context);
        assert_eq!(diagnosis.errors.len(), 1);
        let SolverError::Dependency(error) = &diagnosis.errors[0] else {
            panic!("expected a dependency error, got {:?}", diagnosis.errors);
        };
        let from: Vec<_> = error.from.iter().map(|c| c.version.as_str()).collect();
        assert_eq!(from, vec!["1.0", "2.0"]);
        assert_eq!(
            error.range,
            VersionRange::parse(">=2.0").unwrap().union(&VersionRange::parse(">=3.0").unwrap())
        );
        assert!(error.range.matches(&ModVersion::parse("2.5").unwrap()));
        assert!(matches!(error.mismatch(), Mismatch::Single(c) if c.version == "1.5"));
    }

    #[test]
    fn test_duplicate_through_alias() {
        let (context, core) = solve(vec![
            CandidateFixture::new("foo", "1.0").mandatory().build(),
            CandidateFixture::new("bundle", "2.0")
                .mandatory()
                .provides(ProvidedMod::new("foo"))
                .build(),
        ]);

        let diagnosis = diagnose(&core, &context);
        assert_eq!(diagnosis.errors.len(), 1);
        let SolverError::DuplicateMandatory(error) = &diagnosis.errors[0] else {
            panic!("expected a duplicate error, got {:?}", diagnosis.errors);
        };
        assert_eq!(error.identity, "foo");
        assert_eq!(error.candidates.len(), 2);
        assert_eq!(diagnosis.drop_rule, context.optional_definition("foo"));
    }

    #[test]
    fn test_breakage_between_mandatory_mods() {
        let (context, core) = solve(vec![
            CandidateFixture::new("foo", "1.0")
                .mandatory()
                .breaks(ModDependency::Only(
                    DependencyOnly::new(ModIdentifier::new("bar"))
                        .with_range(VersionRange::parse("<2.0").unwrap())
                        .with_reason("corrupts worlds"),
                ))
                .build(),
            CandidateFixture::new("bar", "1.0").mandatory().build(),
        ]);

        let diagnosis = diagnose(&core, &context);
        let SolverError::Breakage(error) = &diagnosis.errors[0] else {
            panic!("expected a breakage error, got {:?}", diagnosis.errors);
        };
        assert_eq!(error.conflicting.iter().next().unwrap().id, "bar");
        assert!(error.reasons.contains("corrupts worlds"));
    }

    #[test]
    fn test_fallback_lists_rules() {
        // Two mandatory mods want incompatible versions of a shared library
        let (context, core) = solve(vec![
            CandidateFixture::new("a", "1.0").mandatory().depends(on("lib", "<2.0")).build(),
            CandidateFixture::new("b", "1.0").mandatory().depends(on("lib", ">=2.0")).build(),
            CandidateFixture::new("lib", "1.0").build(),
            CandidateFixture::new("lib", "2.0").build(),
        ]);

        let diagnosis = diagnose(&core, &context);
        let SolverError::Unhandled(error) = &diagnosis.errors[0] else {
            panic!("expected an unhandled error, got {:?}", diagnosis.errors);
        };
        assert_eq!(error.rules.len(), core.rules().len());
        assert!(diagnosis.drop_rule.is_none());
    }
}
