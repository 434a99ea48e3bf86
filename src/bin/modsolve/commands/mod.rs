//! Command implementations

pub mod check;
pub mod completions;
pub mod graph;
pub mod resolve;
