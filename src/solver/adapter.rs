//! Bridge between the resolution context and the satisfiability engine.

use std::collections::BTreeMap;

use crate::solver::context::ResolutionContext;
use crate::solver::option::{Literal, OptionId, OptionKind};
use crate::solver::rule::{Clause, RuleId};
use crate::solver::sat::{lit, Constraint, Lit, SatError, SatOutcome, SatProblem};

/// A satisfying assignment over every live option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: BTreeMap<OptionId, bool>,
}

impl Assignment {
    pub fn is_selected(&self, option: OptionId) -> bool {
        self.values.get(&option).copied().unwrap_or(false)
    }

    /// Selected options in id order.
    pub fn selected(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.values
            .iter()
            .filter(|(_, value)| **value)
            .map(|(id, _)| *id)
    }

    pub fn values(&self) -> &BTreeMap<OptionId, bool> {
        &self.values
    }
}

/// Rules that cannot all hold at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatCore {
    rules: Vec<RuleId>,
}

impl UnsatCore {
    pub fn new(mut rules: Vec<RuleId>) -> Self {
        rules.sort();
        rules.dedup();
        UnsatCore { rules }
    }

    pub fn rules(&self) -> &[RuleId] {
        &self.rules
    }

    pub fn contains(&self, rule: RuleId) -> bool {
        self.rules.binary_search(&rule).is_ok()
    }
}

/// Outcome of solving a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solution {
    Satisfied(Assignment),
    Unsatisfiable(UnsatCore),
}

impl Solution {
    pub fn assignment(self) -> Option<Assignment> {
        match self {
            Solution::Satisfied(assignment) => Some(assignment),
            Solution::Unsatisfiable(_) => None,
        }
    }

    pub fn core(self) -> Option<UnsatCore> {
        match self {
            Solution::Satisfied(_) => None,
            Solution::Unsatisfiable(core) => Some(core),
        }
    }
}

/// Translates a context into a satisfiability problem and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverAdapter;

impl SolverAdapter {
    pub fn new() -> Self {
        SolverAdapter
    }

    /// Solve the current state of the context.
    ///
    /// Options are decided in ascending (weight, id) order; mod options are
    /// tried selected first and unless options unselected first.
    pub fn solve(&self, context: &mut ResolutionContext) -> Result<Solution, SatError> {
        let clauses = context.clauses();
        let options = context.options();

        let live: Vec<(OptionId, OptionKind)> =
            options.live().map(|(id, option)| (id, option.kind())).collect();
        let vars: BTreeMap<OptionId, usize> = live
            .iter()
            .enumerate()
            .map(|(var, (id, _))| (*id, var))
            .collect();

        let mut problem = SatProblem::new(live.len());
        let mut groups = Vec::with_capacity(clauses.len());
        for (rule, rule_clauses) in &clauses {
            let group = groups.len();
            groups.push(*rule);
            for clause in rule_clauses {
                if let Some(constraint) = to_constraint(clause, &vars) {
                    problem.add(constraint, group);
                }
            }
        }

        let mut order = live.clone();
        order.sort_by_key(|(id, _)| (context.weight(*id), *id));
        problem.set_decision_order(
            order
                .iter()
                .map(|(id, kind)| lit(vars[id], *kind == OptionKind::Mod))
                .collect(),
        );

        tracing::debug!(
            "solving {} options against {} rules",
            problem.num_vars(),
            groups.len()
        );

        match problem.solve()? {
            SatOutcome::Sat(values) => Ok(Solution::Satisfied(Assignment {
                values: live
                    .iter()
                    .map(|(id, _)| (*id, values[vars[id]]))
                    .collect(),
            })),
            SatOutcome::Unsat(core) => {
                let core: Vec<RuleId> = core.into_iter().map(|group| groups[group]).collect();
                tracing::debug!("unsatisfiable; core of {} rules", core.len());
                Ok(Solution::Unsatisfiable(UnsatCore::new(core)))
            }
        }
    }
}

/// Map a clause onto solver literals.
///
/// Options that are no longer live count as unselected. Returns `None` when
/// the clause is trivially satisfied.
fn to_constraint(clause: &Clause, vars: &BTreeMap<OptionId, usize>) -> Option<Constraint> {
    let map = |literal: &Literal| -> Result<Lit, bool> {
        match vars.get(&literal.option()) {
            Some(var) => Ok(lit(*var, !literal.is_negated())),
            // A dead option is false, so its literal has a fixed value
            None => Err(literal.is_negated()),
        }
    };

    match clause {
        Clause::AtLeastOne(literals) => {
            let mut lits = Vec::with_capacity(literals.len());
            for literal in literals {
                match map(literal) {
                    Ok(l) => lits.push(l),
                    Err(true) => return None,
                    Err(false) => {}
                }
            }
            Some(Constraint::AtLeastOne(lits))
        }
        Clause::AtMost(n, literals) => {
            let mut lits = Vec::with_capacity(literals.len());
            let mut fixed_true = 0u32;
            for literal in literals {
                match map(literal) {
                    Ok(l) => lits.push(l),
                    Err(true) => fixed_true += 1,
                    Err(false) => {}
                }
            }
            match n.checked_sub(fixed_true) {
                Some(remaining) => Some(Constraint::AtMost(remaining, lits)),
                None => Some(Constraint::AtLeastOne(Vec::new())),
            }
        }
    }
}
