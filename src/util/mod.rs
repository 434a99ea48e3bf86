//! Utility modules.

pub mod config;
pub mod context;
pub mod diagnostic;

pub use config::{load_config, SolverConfig};
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
