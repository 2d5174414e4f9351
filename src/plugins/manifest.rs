//! Declarative plugin modules for Plugrack
//!
//! A manifest module is a `plugin_*.json` file naming the plugins it
//! registers. Classes are referenced by key and resolved against a
//! [`ClassCatalog`] built into the host application, so a manifest can only
//! register code the host was compiled with.
//!
//! # Example plugin_static_imputation.json
//!
//! ```json
//! {
//!   "description": "Static imputers",
//!   "plugins": [
//!     { "name": "mean", "category": "preprocessing.imputation.static", "class": "mean_imputer" },
//!     { "name": "constant", "category": "preprocessing.imputation.static", "class": "constant_imputer" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RackError, Result};

use super::discovery::{ModuleLoader, ModuleRegistrar, ModuleSpec};
use super::registry::ModuleHandle;
use super::types::PluginClass;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid regex"));

static CATEGORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex")
});

/// Contents of a manifest module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plugins: Vec<PluginDecl>,
}

/// One plugin registered by a manifest module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDecl {
    pub name: String,
    pub category: String,
    /// Key of the class in the [`ClassCatalog`].
    pub class: String,
}

/// Builds the descriptor of a compiled-in plugin class.
pub type ClassFactory = fn() -> PluginClass;

/// Plugin classes a manifest may refer to, by key.
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    classes: HashMap<String, ClassFactory>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, factory: ClassFactory) -> Self {
        self.insert(key, factory);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, factory: ClassFactory) {
        self.classes.insert(key.into(), factory);
    }

    /// A fresh descriptor for the class registered under `key`.
    pub fn get(&self, key: &str) -> Option<PluginClass> {
        self.classes.get(key).map(|factory| factory())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.classes.contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Loads `plugin_*.json` manifest modules.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    catalog: ClassCatalog,
}

impl ManifestLoader {
    pub fn new(catalog: ClassCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }
}

impl ModuleLoader for ManifestLoader {
    fn extension(&self) -> &str {
        "json"
    }

    fn load(&self, spec: &ModuleSpec, registrar: &ModuleRegistrar) -> Result<Option<ModuleHandle>> {
        let content = fs::read_to_string(&spec.path).map_err(|e| RackError::load(&spec.name, e))?;
        let manifest: ModuleManifest =
            serde_json::from_str(&content).map_err(|e| RackError::load(&spec.name, e))?;

        validate_manifest(&manifest, &self.catalog).map_err(|reason| RackError::load(&spec.name, reason))?;

        for decl in &manifest.plugins {
            // Checked by validate_manifest.
            let Some(class) = self.catalog.get(&decl.class) else {
                continue;
            };
            debug!(module = %spec.name, plugin = %decl.name, class = %decl.class, "Registering manifest plugin");
            registrar.register(&decl.name, &decl.category, class)?;
        }

        Ok(None)
    }
}

/// Validate a manifest against the naming rules and the catalog.
///
/// - Plugin names: 1-64 characters, letters, digits and underscores,
///   not starting with a digit
/// - Categories: dot-separated segments following the same rule
/// - Every class key must exist in the catalog
///
/// # Returns
/// `Ok(())` if valid, or a message describing the first violation.
pub fn validate_manifest(manifest: &ModuleManifest, catalog: &ClassCatalog) -> std::result::Result<(), String> {
    for decl in &manifest.plugins {
        if !NAME_RE.is_match(&decl.name) {
            return Err(format!(
                "Invalid plugin name '{}': must be 1-64 letters, digits and underscores, not starting with a digit",
                decl.name
            ));
        }
        if !CATEGORY_RE.is_match(&decl.category) {
            return Err(format!(
                "Invalid category '{}' for plugin '{}': must be dot-separated identifiers",
                decl.category, decl.name
            ));
        }
        if !catalog.contains(&decl.class) {
            return Err(format!(
                "Unknown plugin class '{}' for plugin '{}'",
                decl.class, decl.name
            ));
        }
    }
    Ok(())
}
