//! Global context for modsolve operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::util::config::{self, SolverConfig};
use crate::util::diagnostic::suggestions;

/// File name of a candidate document.
pub const CANDIDATES_FILE: &str = "mods.toml";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global modsolve data (~/.modsolve/)
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let home = config::global_config_dir().unwrap_or_else(|| PathBuf::from(".modsolve"));

        Ok(GlobalContext {
            cwd,
            home,
            verbose: false,
            color: true,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the modsolve home directory (~/.modsolve/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the project configuration file path.
    pub fn project_config_path(&self) -> PathBuf {
        config::project_config_path(&self.cwd)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Load the solver configuration.
    ///
    /// An explicit file replaces the global and project files; it must
    /// exist and parse.
    pub fn load_config(&self, explicit: Option<&Path>) -> Result<SolverConfig> {
        match explicit {
            Some(path) => SolverConfig::load(path),
            None => Ok(config::load_config(&self.config_path(), &self.project_config_path())),
        }
    }

    /// Resolve a candidate document path.
    ///
    /// A given path is taken relative to cwd. Otherwise `mods.toml` is
    /// searched from cwd upward.
    pub fn find_candidates(&self, given: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = given {
            let path = self.cwd.join(path);
            if !path.is_file() {
                bail!("candidate document not found: {}", path.display());
            }
            return Ok(path);
        }

        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(CANDIDATES_FILE);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                bail!(
                    "could not find `{}` in `{}` or any parent directory\n\nhelp: {}",
                    CANDIDATES_FILE,
                    self.cwd.display(),
                    suggestions::NO_CANDIDATES
                );
            }
        }
    }
}
