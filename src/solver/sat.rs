//! Grouped satisfiability problems solved with `varisat`.
//!
//! Variables are numbered from 0. Literals are encoded as `var + 1`, negated
//! for the false polarity, which is the DIMACS numbering the engine uses.
//! Each constraint carries the group (rule) that emitted it. Every group is
//! guarded by a selector literal passed as an assumption, so the engine's
//! failed assumptions name the groups of an unsat core.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use varisat::{ExtendFormula, Lit as EngineLit, Solver};

/// Signed literal: `+(var + 1)` or `-(var + 1)`.
pub type Lit = i32;

/// Literal for a variable with the given polarity.
pub fn lit(var: usize, value: bool) -> Lit {
    let encoded = var as Lit + 1;
    if value {
        encoded
    } else {
        -encoded
    }
}

fn var_of(lit: Lit) -> usize {
    (lit.unsigned_abs() - 1) as usize
}

/// A constraint over literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// At least one literal is true
    AtLeastOne(Vec<Lit>),
    /// At most `n` literals are true
    AtMost(u32, Vec<Lit>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SatError {
    #[error("satisfiability engine failed: {0}")]
    Engine(String),
}

/// Result of solving a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatOutcome {
    /// Value of every variable
    Sat(Vec<bool>),
    /// Groups that cannot hold together; removing any one of them makes
    /// the rest satisfiable
    Unsat(BTreeSet<usize>),
}

/// A set of grouped constraints over a fixed number of variables.
#[derive(Debug, Clone, Default)]
pub struct SatProblem {
    num_vars: usize,
    constraints: Vec<(Constraint, usize)>,
    /// Decision order with the polarity to try first
    order: Vec<Lit>,
}

impl SatProblem {
    pub fn new(num_vars: usize) -> Self {
        SatProblem {
            num_vars,
            constraints: Vec::new(),
            order: (0..num_vars).map(|v| lit(v, false)).collect(),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Add a constraint emitted by `group`.
    pub fn add(&mut self, constraint: Constraint, group: usize) {
        let constraint = match constraint {
            Constraint::AtLeastOne(mut lits) => {
                lits.sort_unstable();
                lits.dedup();
                Constraint::AtLeastOne(lits)
            }
            Constraint::AtMost(n, mut lits) => {
                lits.sort_unstable();
                lits.dedup();
                Constraint::AtMost(n, lits)
            }
        };
        self.constraints.push((constraint, group));
    }

    /// Set the order in which variables are decided, with the preferred
    /// polarity of each. Variables left out come last, false first.
    pub fn set_decision_order(&mut self, preferred: Vec<Lit>) {
        let mut seen = vec![false; self.num_vars];
        let mut order = Vec::with_capacity(self.num_vars);
        for l in preferred {
            let var = var_of(l);
            if var < self.num_vars && !seen[var] {
                seen[var] = true;
                order.push(l);
            }
        }
        order.extend((0..self.num_vars).filter(|v| !seen[*v]).map(|v| lit(v, false)));
        self.order = order;
    }

    /// Every group that emitted at least one constraint, ascending.
    pub fn groups(&self) -> BTreeSet<usize> {
        self.constraints.iter().map(|(_, group)| *group).collect()
    }

    /// Solve using every constraint.
    ///
    /// A satisfiable problem yields the first model in decision order: each
    /// variable takes its preferred polarity unless that contradicts the
    /// choices made before it. An unsatisfiable one yields a minimal core.
    pub fn solve(&self) -> Result<SatOutcome, SatError> {
        let mut engine = Engine::encode(self);
        let groups = self.groups();
        if !engine.check(&groups)? {
            return Ok(SatOutcome::Unsat(engine.minimal_core()?));
        }
        Ok(SatOutcome::Sat(engine.preferred_model(&self.order)?))
    }

    /// Whether the constraints of the enabled groups hold together.
    pub fn is_satisfiable_with(&self, enabled: impl Fn(usize) -> bool) -> Result<bool, SatError> {
        let groups: BTreeSet<usize> = self.groups().into_iter().filter(|g| enabled(*g)).collect();
        Engine::encode(self).check(&groups)
    }
}

struct Engine {
    solver: Solver<'static>,
    num_vars: usize,
    selectors: BTreeMap<usize, EngineLit>,
    /// Selector literal in DIMACS form to its group
    groups_by_selector: BTreeMap<isize, usize>,
}

impl Engine {
    fn encode(problem: &SatProblem) -> Self {
        let mut solver = Solver::new();
        for _ in 0..problem.num_vars {
            solver.new_var();
        }

        let mut selectors = BTreeMap::new();
        for group in problem.groups() {
            selectors.insert(group, solver.new_lit());
        }

        for (constraint, group) in &problem.constraints {
            let guard = !selectors[group];
            match constraint {
                Constraint::AtLeastOne(lits) => {
                    let mut clause = vec![guard];
                    clause.extend(lits.iter().map(|l| to_engine(*l)));
                    solver.add_clause(&clause);
                }
                Constraint::AtMost(n, lits) => {
                    let lits: Vec<EngineLit> = lits.iter().map(|l| to_engine(*l)).collect();
                    at_most(&mut solver, guard, *n as usize, &lits);
                }
            }
        }

        let groups_by_selector = selectors
            .iter()
            .map(|(group, selector)| (selector.to_dimacs(), *group))
            .collect();

        Engine {
            solver,
            num_vars: problem.num_vars,
            selectors,
            groups_by_selector,
        }
    }

    fn assumptions(&self, groups: &BTreeSet<usize>) -> Vec<EngineLit> {
        groups.iter().filter_map(|g| self.selectors.get(g).copied()).collect()
    }

    fn run(&mut self, assumptions: &[EngineLit]) -> Result<bool, SatError> {
        self.solver.assume(assumptions);
        self.solver
            .solve()
            .map_err(|err| SatError::Engine(err.to_string()))
    }

    fn check(&mut self, groups: &BTreeSet<usize>) -> Result<bool, SatError> {
        let assumptions = self.assumptions(groups);
        self.run(&assumptions)
    }

    /// Groups among the failed assumptions of the last unsatisfiable run.
    fn failed_groups(&self) -> BTreeSet<usize> {
        self.solver
            .failed_core()
            .unwrap_or_default()
            .iter()
            .filter_map(|l| self.groups_by_selector.get(&l.to_dimacs()).copied())
            .collect()
    }

    /// Shrink the failed groups until every one of them is needed.
    ///
    /// Groups are tried for removal in ascending order. When the rest stays
    /// unsatisfiable, the core shrinks to the groups that run failed on.
    fn minimal_core(&mut self) -> Result<BTreeSet<usize>, SatError> {
        let mut core = self.failed_groups();
        let candidates: Vec<usize> = core.iter().copied().collect();
        for group in candidates {
            if !core.contains(&group) {
                continue;
            }
            let mut trial = core.clone();
            trial.remove(&group);
            if !self.check(&trial)? {
                let failed = self.failed_groups();
                core = trial.intersection(&failed).copied().collect();
            }
        }
        Ok(core)
    }

    fn model(&self) -> Vec<bool> {
        let mut values = vec![false; self.num_vars];
        for l in self.solver.model().unwrap_or_default() {
            let index = l.var().index();
            if index < self.num_vars {
                values[index] = l.is_positive();
            }
        }
        values
    }

    /// Fix variables one at a time in `order`, keeping the preferred
    /// polarity whenever some model still allows it. Must follow a
    /// satisfiable run with every selector assumed.
    fn preferred_model(&mut self, order: &[Lit]) -> Result<Vec<bool>, SatError> {
        let mut fixed: Vec<EngineLit> = self.selectors.values().copied().collect();
        let mut values = self.model();

        for &preferred in order {
            let var = var_of(preferred);
            let wanted = preferred > 0;
            if values[var] != wanted {
                fixed.push(to_engine(preferred));
                if self.run(&fixed)? {
                    values = self.model();
                    continue;
                }
                fixed.pop();
            }
            fixed.push(to_engine(lit(var, values[var])));
        }
        Ok(values)
    }
}

fn to_engine(l: Lit) -> EngineLit {
    EngineLit::from_dimacs(l as isize)
}

/// Guarded sequential counter: when `guard` is false, at most `n` of `lits`
/// are true.
fn at_most(solver: &mut Solver<'static>, guard: EngineLit, n: usize, lits: &[EngineLit]) {
    if lits.len() <= n {
        return;
    }
    if n == 0 {
        for l in lits {
            solver.add_clause(&[guard, !*l]);
        }
        return;
    }

    // counters[i][j]: at least j + 1 of lits[..=i] are true
    let counters: Vec<Vec<EngineLit>> = (0..lits.len() - 1)
        .map(|_| (0..n).map(|_| solver.new_lit()).collect())
        .collect();

    solver.add_clause(&[guard, !lits[0], counters[0][0]]);
    for j in 1..n {
        solver.add_clause(&[guard, !counters[0][j]]);
    }

    for i in 1..lits.len() - 1 {
        solver.add_clause(&[guard, !lits[i], counters[i][0]]);
        solver.add_clause(&[guard, !counters[i - 1][0], counters[i][0]]);
        for j in 1..n {
            solver.add_clause(&[guard, !lits[i], !counters[i - 1][j - 1], counters[i][j]]);
            solver.add_clause(&[guard, !counters[i - 1][j], counters[i][j]]);
        }
        solver.add_clause(&[guard, !lits[i], !counters[i - 1][n - 1]]);
    }

    let last = lits.len() - 1;
    solver.add_clause(&[guard, !lits[last], !counters[last - 1][n - 1]]);
}
