//! Resolution properties checked through the public library API.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use modsolve::core::{CandidateDocument, ModCandidate};
use modsolve::diagnosis::{merge_errors, Mismatch, SolverError};
use modsolve::solver::{LoadOption, MandatoryDefinition, ResolutionContext, Rule, RuleBuilder, SolverAdapter};
use modsolve::{ModSolver, ResolutionResult, ResolveOutcome, ResolveReport, SolverConfig};

fn candidates(document: &str) -> Vec<ModCandidate> {
    CandidateDocument::parse(document).unwrap()
}

fn resolve(candidates: Vec<ModCandidate>) -> ResolveReport {
    let mut solver = ModSolver::new(SolverConfig::default());
    for candidate in candidates {
        solver.add_candidate(candidate).unwrap();
    }
    solver.resolve().unwrap()
}

fn resolved(report: &ResolveReport) -> &ResolutionResult {
    match &report.outcome {
        ResolveOutcome::Resolved(result) => result,
        other => panic!("expected a resolution, got {:?}", other),
    }
}

const MODPACK: &str = r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = [{ id = "lib", versions = "[2.0,3.0)" }, { id = "api" }]

[[mod]]
id = "bar"
version = "3.1"
origin = "mods/bar.jar"
mandatory = true
depends = [{ id = "lib", versions = ">=2.2" }]

[[mod]]
id = "lib"
version = "2.0"
origin = "mods/lib-2.0.jar"

[[mod]]
id = "lib"
version = "2.4"
origin = "mods/lib-2.4.jar"

[[mod]]
id = "lib"
version = "3.0"
origin = "mods/lib-3.0.jar"

[[mod]]
id = "bundle"
version = "1.0"
origin = "mods/bundle.jar"
provides = ["api"]
"#;

#[test]
fn test_resolution_is_deterministic() {
    let first = resolve(candidates(MODPACK));
    let second = resolve(candidates(MODPACK));
    let mut reversed = candidates(MODPACK);
    reversed.reverse();
    let third = resolve(reversed);

    let selections = resolved(&first).selections();
    assert_eq!(selections, resolved(&second).selections());
    assert_eq!(selections, resolved(&third).selections());
    assert_eq!(resolved(&first).get("lib").unwrap().version().raw(), "2.4");
}

#[test]
fn test_every_mandatory_identity_selected_once() {
    let report = resolve(candidates(MODPACK));
    let result = resolved(&report);

    let selections = result.selections();
    let ids: BTreeSet<_> = selections.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), selections.len());
    assert!(result.get("foo").is_some());
    assert!(result.get("bar").is_some());
    assert_eq!(result.provider_of("api").unwrap().id(), "bundle");
}

#[test]
fn test_optional_dependency_without_candidates() {
    let report = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = [{ id = "extra", optional = true }]
"#,
    ));

    assert!(resolved(&report).get("foo").is_some());
}

#[test]
fn test_optional_dependency_binds_when_target_present() {
    let report = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = [{ id = "extra", versions = ">=1.0", optional = true }]

[[mod]]
id = "extra"
version = "0.5"
origin = "mods/extra.jar"
"#,
    ));

    let SolverError::Dependency(error) = &report.errors[0] else {
        panic!("expected a dependency error, got {:?}", report.outcome);
    };
    assert!(matches!(error.mismatch(), Mismatch::Single(found) if found.version == "0.5"));
}

#[test]
fn test_missing_and_mismatched_dependency() {
    let missing = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = [{ id = "lib", versions = "[2.0,3.0)" }]
"#,
    ));
    let SolverError::Dependency(error) = &missing.errors[0] else {
        panic!("expected a dependency error, got {:?}", missing.errors);
    };
    assert_eq!(error.mismatch(), Mismatch::Missing);

    let mismatched = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = [{ id = "lib", versions = "[2.0,3.0)" }]

[[mod]]
id = "lib"
version = "1.5"
origin = "mods/lib.jar"
"#,
    ));
    let SolverError::Dependency(error) = &mismatched.errors[0] else {
        panic!("expected a dependency error, got {:?}", mismatched.errors);
    };
    match error.mismatch() {
        Mismatch::Single(found) => assert_eq!(found.version, "1.5"),
        other => panic!("expected a single mismatch, got {:?}", other),
    }
}

#[test]
fn test_duplicate_through_alias_reported_once() {
    let report = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true

[[mod]]
id = "bundle"
version = "2.0"
origin = "mods/bundle.jar"
mandatory = true
provides = ["foo"]
"#,
    ));

    assert!(matches!(report.outcome, ResolveOutcome::Failed(_)));
    assert_eq!(report.errors.len(), 1);
    let SolverError::DuplicateMandatory(error) = &report.errors[0] else {
        panic!("expected a duplicate error, got {:?}", report.errors);
    };
    let origins: Vec<_> = error.candidates.iter().map(|c| c.origin.as_str()).collect();
    assert!(origins.contains(&"mods/foo.jar"));
    assert!(origins.contains(&"mods/bundle.jar"));
}

#[test]
fn test_group_narrows_dependency_but_not_identity() {
    let report = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = ["org.a:lib"]

[[mod]]
id = "lib"
group = "org.b"
version = "2.0"
origin = "mods/lib-b.jar"

[[mod]]
id = "lib"
group = "org.a"
version = "1.0"
origin = "mods/lib-a.jar"
"#,
    ));
    let lib = resolved(&report).get("lib").unwrap();
    assert_eq!(lib.candidate().group(), Some("org.a"));

    let report = resolve(candidates(
        r#"
[[mod]]
id = "lib"
group = "org.a"
version = "1.0"
origin = "mods/lib-a.jar"
mandatory = true

[[mod]]
id = "lib"
group = "org.b"
version = "1.0"
origin = "mods/lib-b.jar"
mandatory = true
"#,
    ));
    let SolverError::DuplicateMandatory(error) = &report.errors[0] else {
        panic!("expected a duplicate error, got {:?}", report.errors);
    };
    assert_eq!(error.identity, "lib");
}

const BREAKS_UNLESS: &str = r#"
[[mod]]
id = "a"
version = "1.0"
origin = "mods/a.jar"
mandatory = true
breaks = [{ id = "b", unless = { id = "c" } }]

[[mod]]
id = "b"
version = "1.0"
origin = "mods/b.jar"
mandatory = true
"#;

#[test]
fn test_unless_suppresses_break() {
    let document = format!(
        "{}\n[[mod]]\nid = \"c\"\nversion = \"1.0\"\norigin = \"mods/c.jar\"\nmandatory = true\n",
        BREAKS_UNLESS
    );
    let report = resolve(candidates(&document));
    let result = resolved(&report);
    assert!(result.get("a").is_some());
    assert!(result.get("b").is_some());

    let report = resolve(candidates(BREAKS_UNLESS));
    assert!(matches!(report.outcome, ResolveOutcome::Failed(_)));
}

#[test]
fn test_same_requirement_errors_merge() {
    let report = resolve(candidates(
        r#"
[[mod]]
id = "foo"
version = "1.0"
origin = "mods/foo.jar"
mandatory = true
depends = [{ id = "lib", versions = "[2.0,3.0)" }]

[[mod]]
id = "bar"
version = "1.0"
origin = "mods/bar.jar"
mandatory = true
depends = [{ id = "lib", versions = "[2.0,3.0)" }]
"#,
    ));

    assert_eq!(report.errors.len(), 1);
    let SolverError::Dependency(error) = &report.errors[0] else {
        panic!("expected a dependency error, got {:?}", report.errors);
    };
    let from: Vec<_> = error.from.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(from, vec!["bar", "foo"]);

    // Merging is idempotent
    assert_eq!(merge_errors(report.errors.clone()), report.errors);
}

#[test]
fn test_remove_and_readd_option_round_trips() {
    let mut context = ResolutionContext::new();
    let mut options = Vec::new();
    for candidate in candidates(MODPACK) {
        let mandatory = candidate.is_mandatory();
        let key = candidate.key();
        let identities: Vec<String> = candidate.identities().into_iter().map(str::to_string).collect();
        let depends = candidate.dependencies().to_vec();

        let option = context.add_option(LoadOption::from(candidate));
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
        options.push(option);
    }

    let adapter = SolverAdapter::new();
    let before = adapter.solve(&mut context).unwrap();
    assert!(before.clone().assignment().is_some());

    let lib = options[3];
    let pristine = context.options().get(lib).cloned().unwrap();
    context.remove_option(lib).unwrap();
    assert_eq!(context.add_option(pristine), lib);

    let after = adapter.solve(&mut context).unwrap();
    assert_eq!(before, after);

    let mut replayed = context.replay().unwrap();
    assert_eq!(adapter.solve(&mut replayed).unwrap(), before);
}

#[test]
fn test_withdraw_and_readd_candidate_round_trips() {
    let mut solver = ModSolver::new(SolverConfig::default());
    for candidate in candidates(MODPACK) {
        solver.add_candidate(candidate).unwrap();
    }
    let before = resolved(&solver.resolve().unwrap()).selections();

    // Only 2.4 satisfies both foo and bar
    solver.withdraw_candidate("lib@2.4#mods/lib-2.4.jar", "testing");
    let withdrawn = solver.resolve().unwrap();
    assert!(matches!(withdrawn.outcome, ResolveOutcome::Failed(_)));

    let lib = candidates(MODPACK)
        .into_iter()
        .find(|c| c.key() == "lib@2.4#mods/lib-2.4.jar")
        .unwrap();
    solver.add_candidate(lib).unwrap();
    let after = resolved(&solver.resolve().unwrap()).selections();
    assert_eq!(before, after);
}

/// Two unconstrained versions for each of `count` mods.
fn fillers(count: usize) -> String {
    let mut document = String::new();
    for i in 0..count {
        for version in ["1.0", "2.0"] {
            write!(
                document,
                "\n[[mod]]\nid = \"filler{i}\"\nversion = \"{version}\"\norigin = \"mods/filler{i}-{version}.jar\"\n"
            )
            .unwrap();
        }
    }
    document
}

// Whichever version of x is picked, the chain through q and r ends in a
// version of r that breaks x.
const BROKEN_CYCLE: &str = r#"
[[mod]]
id = "a"
version = "1.0"
origin = "mods/a.jar"
mandatory = true
depends = ["x"]

[[mod]]
id = "x"
version = "1.0"
origin = "mods/x-1.0.jar"
depends = [{ id = "q", versions = ">=2.0" }]

[[mod]]
id = "x"
version = "2.0"
origin = "mods/x-2.0.jar"
depends = [{ id = "q", versions = "<2.0" }]

[[mod]]
id = "q"
version = "1.0"
origin = "mods/q-1.0.jar"
depends = [{ id = "r", versions = ">=2.0" }]

[[mod]]
id = "q"
version = "2.0"
origin = "mods/q-2.0.jar"
depends = [{ id = "r", versions = "<2.0" }]

[[mod]]
id = "r"
version = "1.0"
origin = "mods/r-1.0.jar"
breaks = [{ id = "x" }]

[[mod]]
id = "r"
version = "2.0"
origin = "mods/r-2.0.jar"
breaks = [{ id = "x" }]
"#;

#[test]
fn test_conflict_behind_many_unrelated_mods() {
    let started = Instant::now();
    let report = resolve(candidates(&format!("{}{}", fillers(48), BROKEN_CYCLE)));

    assert!(matches!(report.outcome, ResolveOutcome::Failed(_)));
    assert!(!report.errors.is_empty());
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_large_pack_resolves() {
    let started = Instant::now();
    let report = resolve(candidates(&format!("{}{}", fillers(64), MODPACK)));

    let result = resolved(&report);
    assert_eq!(result.get("lib").unwrap().version().raw(), "2.4");
    assert_eq!(result.provider_of("api").unwrap().id(), "bundle");
    assert!(started.elapsed() < Duration::from_secs(30));
}
