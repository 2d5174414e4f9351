//! Discovery configuration for Plugrack
//!
//! Settings are read from `~/.plugrack/config.json` (every field optional)
//! and can be overridden from the environment:
//!
//! - `PLUGRACK_ROOT_PACKAGE`: root package name used for module identifiers
//! - `PLUGRACK_PLUGIN_DIRS`: package directories, separated like `PATH`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RackError, Result};

pub const ENV_ROOT_PACKAGE: &str = "PLUGRACK_ROOT_PACKAGE";
pub const ENV_PLUGIN_DIRS: &str = "PLUGRACK_PLUGIN_DIRS";

/// Module discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory name module identifiers are rooted at. Defaults to `plugins`.
    pub root_package: String,

    /// Package directories scanned for plugin modules.
    /// Defaults to `["~/.plugrack/plugins"]`.
    pub plugin_dirs: Vec<String>,

    /// Allowlist of module identifiers. If empty, all modules are allowed.
    pub allowed_modules: Vec<String>,

    /// Blocklist of module identifiers.
    /// Blocklist takes precedence over allowlist.
    pub blocked_modules: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root_package: "plugins".to_string(),
            plugin_dirs: vec!["~/.plugrack/plugins".to_string()],
            allowed_modules: Vec::new(),
            blocked_modules: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// `~/.plugrack`, if a home directory is known.
    pub fn dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".plugrack"))
    }

    /// `~/.plugrack/config.json`, if a home directory is known.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|dir| dir.join("config.json"))
    }

    /// Load from `path` (defaults when the file does not exist), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                RackError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                RackError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load from the default location, falling back to defaults plus
    /// environment overrides when there is no home directory.
    pub fn load_default() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load(&path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides(|key| env::var(key).ok());
                Ok(config)
            }
        }
    }

    /// Apply overrides looked up through `var`.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(root) = var(ENV_ROOT_PACKAGE).filter(|v| !v.trim().is_empty()) {
            self.root_package = root.trim().to_string();
        }
        if let Some(dirs) = var(ENV_PLUGIN_DIRS).filter(|v| !v.is_empty()) {
            self.plugin_dirs = env::split_paths(&dirs)
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }
    }

    /// Plugin directories with a leading `~` expanded.
    pub fn resolved_plugin_dirs(&self) -> Vec<PathBuf> {
        self.plugin_dirs.iter().map(|dir| expand_home(dir)).collect()
    }

    /// Check whether a module identifier is permitted by the allow/block lists.
    pub fn is_module_permitted(&self, module: &str) -> bool {
        if self.blocked_modules.iter().any(|m| m == module) {
            return false;
        }
        self.allowed_modules.is_empty() || self.allowed_modules.iter().any(|m| m == module)
    }
}

fn expand_home(dir: &str) -> PathBuf {
    if dir == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(dir));
    }
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(dir),
    }
}
