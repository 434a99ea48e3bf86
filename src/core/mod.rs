//! Core data structures for modsolve.
//!
//! This module contains the input model the solver works from:
//! - Versions and version ranges
//! - Mod identifiers
//! - Dependency and conflict declarations
//! - Candidate mods and the `mods.toml` document

pub mod candidate;
pub mod dependency;
pub mod identifier;
pub mod version;

pub use candidate::{CandidateDocument, DeclarationError, ModCandidate, ProvidedMod};
pub use dependency::{DependencyOnly, DependencySpec, ModDependency};
pub use identifier::ModIdentifier;
pub use version::{ModVersion, VersionError, VersionRange};
