//! High-level operations.
//!
//! This module contains the implementation of modsolve commands.

pub mod check;
pub mod resolve;

pub use check::{check, format_report, CheckOptions, CheckReport};
pub use resolve::{
    format_resolution, resolve_documents, ModSolver, PluginAction, ResolveOptions, ResolveOutcome,
    ResolveReport, ResolveRun, SolvePlugin,
};
