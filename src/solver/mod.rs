//! Constraint-based mod selection.
//!
//! Candidates become boolean load options; identity definitions and
//! declared dependencies become rules that emit clauses. The adapter feeds
//! those clauses to a satisfiability engine and reads back either a
//! selection or the set of rules that cannot hold together.

pub mod adapter;
pub mod context;
pub mod definition;
pub mod dependency_rule;
pub mod option;
pub mod result;
pub mod rule;
pub mod sat;
pub mod task;

pub use adapter::{Assignment, Solution, SolverAdapter, UnsatCore};
pub use context::{ContextError, ContextEvent, ResolutionContext};
pub use definition::{DisabledDefinition, MandatoryDefinition, OptionalDefinition};
pub use dependency_rule::{AllRule, AnyRule, BuiltRules, OnlyRule, RuleBuilder};
pub use option::{Literal, LoadOption, ModLoadOption, OptionId, OptionKind, OptionStore, UnlessOption};
pub use result::{ResolutionResult, SelectedMod};
pub use rule::{Clause, ClauseCollector, Rule, RuleDefiner, RuleId};
pub use sat::{SatError, SatOutcome};
pub use task::{DiscoveryTask, TaskError, TaskId, TaskOutcome, TaskOutput, TaskQueue};
