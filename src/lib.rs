//! modsolve - constraint-based mod dependency resolution
//!
//! This crate turns declared mod candidates into a satisfiability problem,
//! picks one version per mod, and explains failures as readable reports.

pub mod core;
pub mod diagnosis;
pub mod ops;
pub mod overrides;
pub mod solver;
pub mod util;

/// Test utilities for modsolve unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides candidate fixtures and document helpers.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{CandidateDocument, ModCandidate, ModDependency, ModIdentifier, ModVersion, VersionRange};
pub use crate::diagnosis::{ErrorReport, SolverError};
pub use crate::ops::{ModSolver, ResolveOutcome, ResolveReport};
pub use crate::overrides::DependencyOverrides;
pub use crate::solver::{ResolutionContext, ResolutionResult};
pub use crate::util::config::SolverConfig;
