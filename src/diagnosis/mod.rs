//! Failure diagnosis.
//!
//! An unsat core becomes a graph of rules and options, the graph is matched
//! against known failure shapes, and each recognised failure becomes a
//! mergeable error and finally a structured report.

pub mod errors;
pub mod graph;
pub mod patterns;
pub mod report;

pub use errors::{
    merge_errors, BreakageError, CandidateRef, DependencyError, DuplicateMandatoryError, Mismatch,
    SolverError, UnhandledError,
};
pub use graph::{DiagnosisGraph, GraphSnapshot, Link};
pub use patterns::{diagnose, Diagnosis};
pub use report::{report_log_text, ErrorReport, IconHint, ReportAction};
