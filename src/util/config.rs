//! Configuration file support for modsolve.
//!
//! modsolve reads two configuration file locations:
//! - Global: `~/.modsolve/config.toml` - User-wide defaults
//! - Project: `.modsolve/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CYCLES: usize = 16;
pub const DEFAULT_MAX_DROPPED_RULES: usize = 32;

/// modsolve configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Resolution loop settings
    pub solver: SolverSettings,

    /// Per-mod settings
    pub mods: ModsConfig,

    /// Discovery task settings
    pub tasks: TasksConfig,
}

/// Resolution loop settings.
///
/// Unset values fall back to defaults through the accessors on
/// [`SolverConfig`], so that merging can tell "unset" from "set to default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Hard bound on discovery/solve cycles
    pub max_cycles: Option<usize>,

    /// Hard bound on rules dropped while collecting errors
    pub max_dropped_rules: Option<usize>,

    /// Drop one rule per failed cycle to find further errors
    pub collect_all_errors: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModsConfig {
    /// Mod ids whose candidates get a Disabled definition
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Worker threads for discovery tasks (None = rayon default)
    pub jobs: Option<usize>,
}

impl SolverConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: SolverConfig) {
        if other.solver.max_cycles.is_some() {
            self.solver.max_cycles = other.solver.max_cycles;
        }
        if other.solver.max_dropped_rules.is_some() {
            self.solver.max_dropped_rules = other.solver.max_dropped_rules;
        }
        if other.solver.collect_all_errors.is_some() {
            self.solver.collect_all_errors = other.solver.collect_all_errors;
        }

        // Disabled lists accumulate
        for id in other.mods.disabled {
            if !self.mods.disabled.contains(&id) {
                self.mods.disabled.push(id);
            }
        }

        if other.tasks.jobs.is_some() {
            self.tasks.jobs = other.tasks.jobs;
        }
    }

    pub fn max_cycles(&self) -> usize {
        self.solver.max_cycles.unwrap_or(DEFAULT_MAX_CYCLES)
    }

    pub fn max_dropped_rules(&self) -> usize {
        self.solver.max_dropped_rules.unwrap_or(DEFAULT_MAX_DROPPED_RULES)
    }

    pub fn collect_all_errors(&self) -> bool {
        self.solver.collect_all_errors.unwrap_or(true)
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.mods.disabled.iter().any(|d| d == id)
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.modsolve/config.toml)
/// 2. Global config (~/.modsolve/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> SolverConfig {
    let mut config = SolverConfig::default();

    if global_path.exists() {
        config.merge(SolverConfig::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(SolverConfig::load_or_default(project_path));
    }

    config
}

/// Get the global modsolve config directory (~/.modsolve).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".modsolve"))
}

/// Get the global config path (~/.modsolve/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.modsolve/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".modsolve").join("config.toml")
}
