//! Test utilities for modsolve unit tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use modsolve::test_support::fixtures::CandidateFixture;
//!
//! let foo = CandidateFixture::new("foo", "1.0").mandatory().build();
//! assert_eq!(foo.origin(), "mods/foo-1.0.jar");
//! ```

pub mod fixtures;

use std::path::{Path, PathBuf};

pub use fixtures::*;

/// Write a document into a directory and return its path.
pub fn write_document(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create document dir");
    }
    std::fs::write(&path, contents).expect("failed to write document");
    path
}

/// Assertion helpers for testing.
pub mod assertions {
    /// Assert that a result is Ok and return the value.
    pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
        match result {
            Ok(v) => v,
            Err(e) => panic!("expected Ok, got Err: {:?}", e),
        }
    }

    /// Assert that a result is Err and return the error.
    pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
        match result {
            Ok(v) => panic!("expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CandidateDocument;

    #[test]
    fn test_fixture_defaults() {
        let foo = CandidateFixture::new("foo", "1.0").mandatory().build();
        assert_eq!(foo.origin(), "mods/foo-1.0.jar");
        assert_eq!(foo.key(), "foo@1.0#mods/foo-1.0.jar");
        assert!(foo.is_mandatory());
    }

    #[test]
    fn test_sample_document_parses() {
        let candidates = assertions::assert_ok(CandidateDocument::parse(sample_document()));
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].dependencies().len(), 2);
    }

    #[test]
    fn test_write_document() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_document(tmp.path(), "nested/mods.toml", sample_document());
        assert!(path.exists());
    }
}
