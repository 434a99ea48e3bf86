//! The resolution loop.
//!
//! [`ModSolver`] owns one resolution session. Each cycle runs queued
//! discovery tasks, registers new candidates (after overrides), applies
//! withdrawals and solves. A failed solve is diagnosed; with
//! `collect_all_errors` one rule is dropped and the loop goes on to find
//! further independent problems. A successful solve is shown to plugins,
//! which may ask for another cycle.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::core::{CandidateDocument, DeclarationError, ModCandidate};
use crate::diagnosis::{
    diagnose, merge_errors, DiagnosisGraph, ErrorReport, GraphSnapshot, SolverError,
};
use crate::overrides::DependencyOverrides;
use crate::solver::{
    DisabledDefinition, DiscoveryTask, LoadOption, MandatoryDefinition, OptionId,
    ResolutionContext, ResolutionResult, Rule, RuleBuilder, RuleId, Solution, SolverAdapter,
    TaskError, TaskId, TaskQueue,
};
use crate::util::config::SolverConfig;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Something a plugin asks for after a successful solve.
pub enum PluginAction {
    /// Withdraw a candidate by key and solve again
    Withdraw { key: String, reason: String },
    /// Run a discovery task and solve again
    Submit(Box<dyn DiscoveryTask>),
    /// Stop resolving
    Halt { reason: String },
}

/// Observer of successful solves.
pub trait SolvePlugin {
    fn name(&self) -> &str;

    fn on_solved(&mut self, result: &ResolutionResult) -> Vec<PluginAction>;
}

/// How a resolution ended.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved(ResolutionResult),
    Failed(Vec<ErrorReport>),
    Halted { reason: String },
}

impl ResolveOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolveOutcome::Resolved(_))
    }
}

/// The outcome of [`ModSolver::resolve`] plus what happened on the way.
#[derive(Debug, Clone)]
pub struct ResolveReport {
    pub outcome: ResolveOutcome,
    /// Merged errors behind a `Failed` outcome
    pub errors: Vec<SolverError>,
    /// Cycles run
    pub cycles: usize,
    /// Rules dropped while collecting errors
    pub dropped_rules: Vec<RuleId>,
    /// Override and task warnings
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
struct Registration {
    option: OptionId,
    rules: Vec<RuleId>,
    /// Unless options created for the candidate's declarations
    helpers: Vec<OptionId>,
    live: bool,
}

enum PluginStep {
    Done,
    Again,
    Halt(String),
}

/// Drives candidates through discovery, solving and diagnosis.
pub struct ModSolver {
    config: SolverConfig,
    context: ResolutionContext,
    adapter: SolverAdapter,
    overrides: Option<DependencyOverrides>,
    pending: Vec<ModCandidate>,
    withdrawals: Vec<(String, String)>,
    registered: IndexMap<String, Registration>,
    tasks: TaskQueue,
    plugins: Vec<Box<dyn SolvePlugin>>,
    warnings: Vec<Diagnostic>,
    first_failure: Option<DiagnosisGraph>,
    /// Rules dropped during the current `resolve` call
    dropped: Vec<(RuleId, Rule)>,
}

impl ModSolver {
    pub fn new(config: SolverConfig) -> Self {
        ModSolver {
            tasks: TaskQueue::new(config.tasks.jobs),
            config,
            context: ResolutionContext::new(),
            adapter: SolverAdapter::new(),
            overrides: None,
            pending: Vec::new(),
            withdrawals: Vec::new(),
            registered: IndexMap::new(),
            plugins: Vec::new(),
            warnings: Vec::new(),
            first_failure: None,
            dropped: Vec::new(),
        }
    }

    /// Apply an override document to every candidate registered from now on.
    pub fn with_overrides(mut self, overrides: DependencyOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Queue a candidate for the next cycle.
    pub fn add_candidate(&mut self, candidate: ModCandidate) -> Result<(), DeclarationError> {
        candidate.validate()?;

        let key = candidate.key();
        let registered = self.registered.get(&key).is_some_and(|r| r.live);
        if registered || self.pending.iter().any(|c| c.key() == key) {
            return Err(DeclarationError::DuplicateCandidate(key));
        }
        self.pending.push(candidate);
        Ok(())
    }

    /// Withdraw a candidate at the start of the next cycle.
    pub fn withdraw_candidate(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.withdrawals.push((key.into(), reason.into()));
    }

    /// Queue a discovery task after the given tasks.
    pub fn submit_task(
        &mut self,
        task: Box<dyn DiscoveryTask>,
        dependencies: &[TaskId],
    ) -> Result<TaskId, TaskError> {
        self.tasks.submit(task, dependencies)
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn SolvePlugin>) {
        self.plugins.push(plugin);
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    /// Diagnosis graph of the first failed solve, if any.
    pub fn diagnosis_graph(&self) -> Option<&DiagnosisGraph> {
        self.first_failure.as_ref()
    }

    /// Run cycles until the mod set resolves, fails or halts.
    ///
    /// Rules dropped while collecting errors are restored before returning.
    pub fn resolve(&mut self) -> Result<ResolveReport> {
        let max_cycles = self.config.max_cycles();
        let mut errors: Vec<SolverError> = Vec::new();
        let mut dropped: Vec<RuleId> = Vec::new();

        for cycle in 1..=max_cycles {
            debug!("resolution cycle {}", cycle);

            if let Some(reason) = self.run_tasks()? {
                return Ok(self.finish(ResolveOutcome::Halted { reason }, errors, cycle, dropped));
            }
            self.register_pending()?;
            self.apply_withdrawals()?;

            let solution = self
                .adapter
                .solve(&mut self.context)
                .context("failed to solve the mod set")?;
            match solution {
                Solution::Satisfied(assignment) => {
                    if !errors.is_empty() {
                        return Ok(self.failed(errors, cycle, dropped));
                    }

                    let result = ResolutionResult::from_assignment(&self.context, &assignment);
                    match self.run_plugins(&result)? {
                        PluginStep::Done => {
                            info!("resolved {} mods in {} cycle(s)", result.len(), cycle);
                            return Ok(self.finish(
                                ResolveOutcome::Resolved(result),
                                errors,
                                cycle,
                                dropped,
                            ));
                        }
                        PluginStep::Again => continue,
                        PluginStep::Halt(reason) => {
                            return Ok(self.finish(
                                ResolveOutcome::Halted { reason },
                                errors,
                                cycle,
                                dropped,
                            ));
                        }
                    }
                }
                Solution::Unsatisfiable(core) => {
                    if self.first_failure.is_none() {
                        self.first_failure = Some(DiagnosisGraph::build(&core, &self.context));
                    }

                    let diagnosis = diagnose(&core, &self.context);
                    errors.extend(diagnosis.errors);

                    match diagnosis.drop_rule {
                        Some(rule)
                            if self.config.collect_all_errors()
                                && dropped.len() < self.config.max_dropped_rules() =>
                        {
                            debug!("dropping {} to look for further errors", rule);
                            if let Some(removed) = self.context.rule(rule).cloned() {
                                self.dropped.push((rule, removed));
                            }
                            self.context
                                .remove_rule(rule)
                                .context("failed to drop a diagnosed rule")?;
                            dropped.push(rule);
                        }
                        _ => return Ok(self.failed(errors, cycle, dropped)),
                    }
                }
            }
        }

        if errors.is_empty() {
            warn!("resolution did not settle within {} cycles", max_cycles);
            let reason = format!("did not settle within {} cycles", max_cycles);
            self.warnings.push(
                Diagnostic::warning(format!("resolution {}", reason))
                    .with_suggestion(suggestions::NOT_SETTLED),
            );
            Ok(self.finish(ResolveOutcome::Halted { reason }, errors, max_cycles, dropped))
        } else {
            Ok(self.failed(errors, max_cycles, dropped))
        }
    }

    fn failed(&mut self, errors: Vec<SolverError>, cycles: usize, dropped: Vec<RuleId>) -> ResolveReport {
        let errors = merge_errors(errors);
        info!("resolution failed with {} error(s)", errors.len());
        let reports = errors.iter().map(ErrorReport::from_error).collect();
        self.finish(ResolveOutcome::Failed(reports), errors, cycles, dropped)
    }

    fn finish(
        &mut self,
        outcome: ResolveOutcome,
        errors: Vec<SolverError>,
        cycles: usize,
        dropped_rules: Vec<RuleId>,
    ) -> ResolveReport {
        if let ResolveOutcome::Halted { reason } = &outcome {
            info!("resolution halted: {}", reason);
        }
        self.restore_dropped();
        ResolveReport {
            outcome,
            errors,
            cycles,
            dropped_rules,
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn restore_dropped(&mut self) {
        for (old, rule) in std::mem::take(&mut self.dropped) {
            let identity = match &rule {
                Rule::Optional(definition) => Some(definition.identity.clone()),
                _ => None,
            };
            let restored = match self.context.add_rule(rule) {
                Ok(restored) => restored,
                Err(e) => {
                    debug!("not restoring {}: {}", old, e);
                    continue;
                }
            };

            for registration in self.registered.values_mut() {
                for id in registration.rules.iter_mut().filter(|id| **id == old) {
                    *id = restored;
                }
            }
            if let Some(identity) = identity {
                if let Err(e) = self.reweigh(&identity) {
                    debug!("failed to reweigh {}: {:#}", identity, e);
                }
            }
        }
    }

    /// Run queued tasks and queue their outputs. Returns a halt reason if a
    /// task asked to stop.
    fn run_tasks(&mut self) -> Result<Option<String>> {
        if self.tasks.is_empty() {
            return Ok(None);
        }

        let outcomes = self.tasks.run_all()?;
        for outcome in outcomes {
            let output = match outcome.result {
                Ok(output) => output,
                Err(message) => {
                    self.warnings.push(
                        Diagnostic::warning(format!("discovery task `{}` failed", outcome.name))
                            .with_context(message),
                    );
                    continue;
                }
            };

            for candidate in output.candidates {
                if let Err(e) = self.add_candidate(candidate) {
                    self.warnings.push(
                        Diagnostic::warning(format!(
                            "discovery task `{}` produced an invalid candidate",
                            outcome.name
                        ))
                        .with_context(e.to_string()),
                    );
                }
            }
            for key in output.withdraw {
                self.withdraw_candidate(key, format!("withdrawn by task `{}`", outcome.name));
            }
            if let Some(reason) = output.halt {
                return Ok(Some(format!("{}: {}", outcome.name, reason)));
            }
        }
        Ok(None)
    }

    fn run_plugins(&mut self, result: &ResolutionResult) -> Result<PluginStep> {
        let mut again = false;
        for plugin in self.plugins.iter_mut() {
            for action in plugin.on_solved(result) {
                match action {
                    PluginAction::Withdraw { key, reason } => {
                        debug!("plugin `{}` withdraws {}", plugin.name(), key);
                        self.withdrawals.push((key, reason));
                    }
                    PluginAction::Submit(task) => {
                        debug!("plugin `{}` submits task `{}`", plugin.name(), task.name());
                        self.tasks.submit(task, &[])?;
                    }
                    PluginAction::Halt { reason } => {
                        return Ok(PluginStep::Halt(format!("{}: {}", plugin.name(), reason)));
                    }
                }
                again = true;
            }
        }
        Ok(if again { PluginStep::Again } else { PluginStep::Done })
    }

    fn register_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        let (revived, mut fresh): (Vec<ModCandidate>, Vec<ModCandidate>) = batch
            .into_iter()
            .partition(|c| self.registered.contains_key(&c.key()));

        if let Some(overrides) = self.overrides.as_mut() {
            self.warnings.extend(overrides.apply(&mut fresh));
        }

        let mut touched = BTreeSet::new();
        for candidate in revived {
            touched.extend(candidate.identities().into_iter().map(str::to_string));
            self.revive(candidate);
        }
        for candidate in fresh {
            touched.extend(candidate.identities().into_iter().map(str::to_string));
            let key = candidate.key();
            self.register(candidate)
                .with_context(|| format!("failed to register candidate {}", key))?;
        }
        for identity in touched {
            self.reweigh(&identity)?;
        }
        debug!("{} candidates registered", self.registered.len());
        Ok(())
    }

    fn register(&mut self, candidate: ModCandidate) -> Result<()> {
        let key = candidate.key();
        let disabled = self.config.is_disabled(candidate.id());
        let mandatory = candidate.is_mandatory();
        let identities: Vec<String> = candidate.identities().into_iter().map(str::to_string).collect();
        let depends = candidate.dependencies().to_vec();
        let breaks = candidate.conflicts().to_vec();

        let option = self.context.add_option(LoadOption::from(candidate));
        let mut rules = Vec::new();
        let mut helpers = Vec::new();

        if mandatory {
            rules.push(self.context.add_rule(Rule::Mandatory(MandatoryDefinition::new(option)))?);
        }
        if disabled {
            let rule = Rule::Disabled(DisabledDefinition::new(option));
            match self.context.mandatory_definition(option) {
                Some(existing) => {
                    rules.retain(|r| *r != existing);
                    rules.push(self.context.replace_rule(existing, rule)?);
                }
                None => rules.push(self.context.add_rule(rule)?),
            }
            debug!("{} is disabled", key);
        }
        for identity in &identities {
            self.context.ensure_optional(identity)?;
        }

        let mut builder = RuleBuilder::new(&mut self.context, key.clone());
        for (i, declaration) in depends.iter().enumerate() {
            let built = builder.build_dependency(option, &format!("/depends/{}", i), declaration)?;
            rules.extend(built.rules);
            helpers.extend(built.options);
        }
        for (i, declaration) in breaks.iter().enumerate() {
            let built = builder.build_break(option, &format!("/breaks/{}", i), declaration)?;
            rules.extend(built.rules);
            helpers.extend(built.options);
        }

        self.registered.insert(
            key,
            Registration {
                option,
                rules,
                helpers,
                live: true,
            },
        );
        Ok(())
    }

    /// Bring a withdrawn candidate back; its rules were never removed.
    fn revive(&mut self, candidate: ModCandidate) {
        let key = candidate.key();
        let Some(registration) = self.registered.get_mut(&key) else {
            return;
        };

        self.context.add_option(LoadOption::from(candidate));
        for helper in &registration.helpers {
            if let Some(option) = self.context.options().get(*helper).cloned() {
                self.context.add_option(option);
            }
        }
        registration.live = true;
        debug!("revived {} ({} rules)", key, registration.rules.len());
    }

    fn apply_withdrawals(&mut self) -> Result<()> {
        for (key, reason) in std::mem::take(&mut self.withdrawals) {
            let Some(registration) = self.registered.get_mut(&key).filter(|r| r.live) else {
                warn!("cannot withdraw {}: not registered", key);
                self.warnings
                    .push(Diagnostic::warning(format!("cannot withdraw unknown candidate {}", key)));
                continue;
            };

            info!("withdrawing {}: {}", key, reason);
            registration.live = false;
            self.context.remove_option(registration.option)?;
            for helper in &registration.helpers {
                self.context.remove_option(*helper)?;
            }
        }
        Ok(())
    }

    /// Prefer newer versions of an identity: newest gets weight 0.
    fn reweigh(&mut self, identity: &str) -> Result<()> {
        let Some(rule) = self.context.optional_definition(identity) else {
            return Ok(());
        };
        let Some(Rule::Optional(definition)) = self.context.rule(rule) else {
            return Ok(());
        };

        let options = self.context.options();
        let mut ranked: Vec<_> = definition
            .options
            .iter()
            .filter_map(|id| {
                let version = options.get(*id)?.as_mod()?.candidate().version_for(identity)?;
                Some((version.clone(), *id))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (rank, (_, option)) in ranked.into_iter().enumerate() {
            self.context.set_weight(option, rule, rank as i32)?;
        }
        Ok(())
    }
}

/// Inputs of a document-driven resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Candidate document (`mods.toml`)
    pub candidates: PathBuf,
    /// Optional override document
    pub overrides: Option<PathBuf>,
    pub config: SolverConfig,
}

/// A finished document-driven resolution.
#[derive(Debug, Clone)]
pub struct ResolveRun {
    pub report: ResolveReport,
    /// Diagnosis graph of the first failed solve
    pub graph: Option<GraphSnapshot>,
}

/// Load the documents named by `options` and resolve them.
pub fn resolve_documents(options: &ResolveOptions) -> Result<ResolveRun> {
    let candidates = CandidateDocument::load(&options.candidates)?;
    debug!(
        "loaded {} candidates from {}",
        candidates.len(),
        options.candidates.display()
    );

    let mut solver = ModSolver::new(options.config.clone());
    if let Some(path) = &options.overrides {
        solver = solver.with_overrides(DependencyOverrides::load(path)?);
    }
    for candidate in candidates {
        solver.add_candidate(candidate)?;
    }

    let report = solver.resolve()?;
    let graph = solver.diagnosis_graph().map(DiagnosisGraph::snapshot);
    Ok(ResolveRun { report, graph })
}

/// One `id version origin` line per selected mod.
pub fn format_resolution(result: &ResolutionResult) -> String {
    let mut output = String::new();
    for selected in result.selections() {
        write!(output, "{} {} {}", selected.id, selected.version, selected.origin).unwrap();
        if !selected.provides.is_empty() {
            write!(output, " (provides {})", selected.provides.join(", ")).unwrap();
        }
        writeln!(output).unwrap();
    }
    output
}
