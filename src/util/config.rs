//! Configuration file support for toolchain discovery.
//!
//! Discovery settings live in two locations:
//! - Global: `~/.extbuild/toolchain.toml` - User-wide defaults
//! - Project: `.extbuild/toolchain.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::errors::{Result, ToolchainError};

/// Environment variable naming the host interpreter to query.
pub const PYTHON_ENV: &str = "EXTBUILD_PYTHON";

/// Discovery configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Discovery settings
    pub discovery: DiscoverySettings,
}

/// Settings steering default toolchain discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Host interpreter asked for its build Makefile (default `python3`)
    pub python: Option<PathBuf>,

    /// Explicit build Makefile, skipping the interpreter query
    pub makefile: Option<PathBuf>,

    /// Replacement for the compiler recorded in the Makefile
    pub cc: Option<PathBuf>,

    /// CUDA compiler driver (default `nvcc`)
    pub nvcc: Option<PathBuf>,

    /// Additional compile flags appended after the host flags
    #[serde(default)]
    pub cflags: Vec<String>,

    /// Additional link flags appended after the host flags
    #[serde(default)]
    pub ldflags: Vec<String>,
}

impl DiscoverySettings {
    /// Interpreter to query, honoring `EXTBUILD_PYTHON`.
    pub fn python(&self) -> PathBuf {
        self.python
            .clone()
            .or_else(|| std::env::var_os(PYTHON_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("python3"))
    }

    /// CUDA compiler driver to use.
    pub fn nvcc(&self) -> PathBuf {
        self.nvcc.clone().unwrap_or_else(|| PathBuf::from("nvcc"))
    }
}

impl DiscoveryConfig {
    /// Load discovery configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ToolchainError::io(path, e))?;

        toml::from_str(&contents).map_err(|e| {
            ToolchainError::Configuration(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with fallback to defaults if the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: DiscoveryConfig) {
        let other = other.discovery;
        if other.python.is_some() {
            self.discovery.python = other.python;
        }
        if other.makefile.is_some() {
            self.discovery.makefile = other.makefile;
        }
        if other.cc.is_some() {
            self.discovery.cc = other.cc;
        }
        if other.nvcc.is_some() {
            self.discovery.nvcc = other.nvcc;
        }
        if !other.cflags.is_empty() {
            self.discovery.cflags = other.cflags;
        }
        if !other.ldflags.is_empty() {
            self.discovery.ldflags = other.ldflags;
        }
    }
}

/// Load merged discovery configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.extbuild/toolchain.toml)
/// 2. Global config (~/.extbuild/toolchain.toml)
/// 3. Defaults
pub fn load_discovery_config(global_path: Option<&Path>, project_path: &Path) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default();

    if let Some(global) = global_path {
        config.merge(DiscoveryConfig::load_or_default(global));
    }

    config.merge(DiscoveryConfig::load_or_default(project_path));

    config
}

/// Load the discovery configuration that applies to the current directory.
pub fn load_current_discovery_config() -> DiscoveryConfig {
    let cwd = std::env::current_dir().unwrap_or_default();
    let global = global_config_path();
    load_discovery_config(global.as_deref(), &project_config_path(&cwd))
}

/// Get the global config directory (~/.extbuild).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".extbuild"))
}

/// Get the global config path (~/.extbuild/toolchain.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("toolchain.toml"))
}

/// Get the project config path (.extbuild/toolchain.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".extbuild").join("toolchain.toml")
}
