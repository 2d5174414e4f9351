//! Plugin registry for Plugrack
//!
//! This module provides the `Registry` service: the category table, the
//! fully-qualified-name table of plugin classes and the module cache. It is
//! a cheaply cloneable handle; every clone refers to the same state, so an
//! application builds one at its entry point and passes it to discovery and
//! to the loader.
//!
//! Registration validates a class against its category and enforces two
//! uniqueness rules: the fully-qualified name (`category.name`) is unique,
//! and the bare name is unique across all categories. A class that is judged
//! the same as the one already registered (see
//! [`PluginClass::is_same_class`]) is accepted silently, so loading a plugin
//! module twice does not fail.
//!
//! # Example
//!
//! ```rust
//! use plugrack::plugins::{BaseContract, FromParams, Identity, Plugin, PluginClass, Registry};
//! use serde_json::Value;
//!
//! trait Scaler: Plugin {}
//!
//! #[derive(Debug)]
//! struct StandardScaler {
//!     identity: Identity,
//! }
//!
//! impl Plugin for StandardScaler {
//!     fn identity(&self) -> &Identity {
//!         &self.identity
//!     }
//! }
//!
//! impl FromParams for StandardScaler {
//!     fn from_params(identity: Identity, _params: &Value) -> anyhow::Result<Self> {
//!         Ok(Self { identity })
//!     }
//! }
//!
//! impl Scaler for StandardScaler {}
//!
//! let registry = Registry::new();
//! registry
//!     .register_category("preprocessing.scaling", BaseContract::of::<dyn Scaler>())
//!     .unwrap();
//!
//! let class = PluginClass::of::<StandardScaler>()
//!     .extends::<dyn Scaler>(|p| p)
//!     .build();
//! let registered = registry
//!     .register("standard_scaler", "preprocessing.scaling", class)
//!     .unwrap();
//!
//! assert_eq!(registered.fqn(), "preprocessing.scaling.standard_scaler");
//! assert_eq!(registry.len(), 1);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{RackError, Result};

use super::types::{BaseContract, Identity, PluginClass};

/// Anything a module loader needs to keep alive while the module's classes
/// are registered (for example an open dynamic library).
pub type ModuleHandle = Box<dyn Any + Send + Sync>;

/// A module recorded in the module cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    /// Module identifier derived from the file path.
    pub name: String,

    /// File the module was loaded from.
    pub path: PathBuf,

    /// Hex-encoded SHA-256 of the file contents at load time.
    pub digest: String,

    /// When the module finished loading.
    pub loaded_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    /// Category name to expected base, in registration order.
    categories: Vec<(String, BaseContract)>,

    /// Registered classes, in registration order.
    plugins: Vec<Arc<PluginClass>>,

    /// Fully-qualified name to index into `plugins`.
    by_fqn: HashMap<String, usize>,

    /// Module identifier to its latest load record.
    modules: HashMap<String, ModuleRecord>,

    /// Loader handle per module identifier. Declared last so they are
    /// dropped after `plugins`, whose constructors may live in the code these
    /// handles keep loaded.
    handles: HashMap<String, ModuleHandle>,
}

impl RegistryState {
    fn category(&self, category: &str) -> Option<BaseContract> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, base)| *base)
    }

    fn insert_category(&mut self, category: &str, expected: BaseContract) -> Result<()> {
        if category.split('.').any(str::is_empty) {
            return Err(RackError::InvalidCategory(category.to_string()));
        }
        if self.category(category).is_some() {
            return Err(RackError::DuplicateCategory(category.to_string()));
        }
        if !expected.extends_plugin() {
            return Err(RackError::InvalidBase {
                category: category.to_string(),
                base: expected.type_name().to_string(),
            });
        }
        self.categories.push((category.to_string(), expected));
        Ok(())
    }

    /// Keep the first handle held for a module. A module loaded again only
    /// re-registers classes that already point into the first load.
    fn retain_handle(&mut self, module: &str, handle: ModuleHandle) {
        if self.handles.contains_key(module) {
            debug!(module = %module, "Module handle already held, releasing the new one");
            return;
        }
        self.handles.insert(module.to_string(), handle);
    }
}

/// Shared registry of plugin categories, plugin classes and loaded modules.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a category together with the base contract its plugins must
    /// satisfy.
    ///
    /// # Errors
    /// - `RackError::InvalidCategory` if the name is empty or has an empty
    ///   dot segment (`"a."`, `".a"`, `"a..b"`)
    /// - `RackError::DuplicateCategory` if the category already exists
    /// - `RackError::InvalidBase` if `expected` does not extend `Plugin`
    pub fn register_category(&self, category: &str, expected: BaseContract) -> Result<()> {
        debug!(category = %category, base = expected.type_name(), "Registering plugin category");
        self.write().insert_category(category, expected)
    }

    /// Register a category unless it already exists with the same base.
    ///
    /// The lookup and the insert happen under one write lock, so modules
    /// loading concurrently can all ensure the same category.
    ///
    /// # Errors
    /// - `RackError::DuplicateCategory` if the category exists with another base
    /// - the errors of [`Self::register_category`] otherwise
    pub fn ensure_category(&self, category: &str, expected: BaseContract) -> Result<()> {
        let mut state = self.write();
        match state.category(category) {
            Some(existing) if existing == expected => Ok(()),
            Some(_) => Err(RackError::DuplicateCategory(category.to_string())),
            None => {
                debug!(category = %category, base = expected.type_name(), "Registering plugin category");
                state.insert_category(category, expected)
            }
        }
    }

    /// Register a plugin class under `category.name`.
    ///
    /// The whole validation runs under the write lock, so two concurrent
    /// registrations cannot both pass the duplicate checks. The class is only
    /// stored when every check passes.
    ///
    /// # Returns
    /// The class with its identity assigned. When the same class is already
    /// registered under this fully-qualified name, the registry is left
    /// untouched and the class is still returned.
    ///
    /// # Errors
    /// - `RackError::CategoryNotRegistered` if the category is unknown
    /// - `RackError::NotACapability` if the class did not declare `Plugin`
    /// - `RackError::WrongBase` if the class did not declare the category base
    /// - `RackError::DuplicateFqn` if another class owns the fully-qualified name
    /// - `RackError::DuplicateName` if another class owns the bare name
    pub fn register(
        &self,
        name: &str,
        category: &str,
        class: PluginClass,
    ) -> Result<Arc<PluginClass>> {
        debug!(class = class.type_path(), "Registering plugin of class");
        let class = Arc::new(class.with_identity(Identity::new(category, name)));
        let fqn = class.fqn();

        let mut state = self.write();

        let expected = state
            .category(category)
            .ok_or_else(|| RackError::CategoryNotRegistered {
                category: category.to_string(),
            })?;
        if !class.satisfies(&BaseContract::root()) {
            return Err(RackError::NotACapability {
                type_name: class.type_path().to_string(),
            });
        }
        if !class.satisfies(&expected) {
            return Err(RackError::WrongBase {
                type_name: class.type_path().to_string(),
                expected: expected.type_name().to_string(),
            });
        }

        if let Some(&idx) = state.by_fqn.get(&fqn) {
            let existing = &state.plugins[idx];
            if !class.is_same_class(existing) {
                return Err(RackError::DuplicateFqn {
                    fqn,
                    new: class.to_string(),
                    existing: existing.to_string(),
                });
            }
            debug!(fqn = %fqn, "Plugin class already registered, ignoring");
            return Ok(class);
        }

        // Bare names must be unique across categories as well.
        if let Some(existing) = state
            .plugins
            .iter()
            .find(|existing| existing.name() == name && !class.is_same_class(existing))
        {
            return Err(RackError::DuplicateName {
                name: name.to_string(),
                new: class.to_string(),
                existing: existing.to_string(),
            });
        }

        let idx = state.plugins.len();
        state.plugins.push(Arc::clone(&class));
        state.by_fqn.insert(fqn.clone(), idx);

        info!(plugin = %fqn, class = class.type_name(), module = class.module(), "Registered plugin");

        Ok(class)
    }

    /// Expected base contract of a category.
    pub fn category(&self, category: &str) -> Option<BaseContract> {
        self.read().category(category)
    }

    /// Whether the category has been registered.
    pub fn has_category(&self, category: &str) -> bool {
        self.category(category).is_some()
    }

    /// All categories and their expected bases, in registration order.
    pub fn categories(&self) -> Vec<(String, BaseContract)> {
        self.read().categories.clone()
    }

    /// Look up a class by fully-qualified name.
    pub fn get(&self, fqn: &str) -> Option<Arc<PluginClass>> {
        let state = self.read();
        state
            .by_fqn
            .get(fqn)
            .map(|&idx| Arc::clone(&state.plugins[idx]))
    }

    /// Whether a class is registered under the fully-qualified name.
    pub fn contains(&self, fqn: &str) -> bool {
        self.read().by_fqn.contains_key(fqn)
    }

    /// All registered classes, in registration order.
    pub fn plugins(&self) -> Vec<Arc<PluginClass>> {
        self.read().plugins.clone()
    }

    /// All fully-qualified names, in registration order.
    pub fn fqns(&self) -> Vec<String> {
        self.read().plugins.iter().map(|class| class.fqn()).collect()
    }

    /// Number of registered plugin classes.
    pub fn len(&self) -> usize {
        self.read().plugins.len()
    }

    /// Returns true if no plugin classes are registered.
    pub fn is_empty(&self) -> bool {
        self.read().plugins.is_empty()
    }

    /// Record a loaded module, keeping its handle alive for the lifetime of
    /// the registry.
    ///
    /// At most one handle is held per module: when the module was loaded
    /// before, the new handle is dropped and the first one kept.
    pub fn record_module(&self, record: ModuleRecord, handle: Option<ModuleHandle>) {
        let mut state = self.write();
        if let Some(handle) = handle {
            state.retain_handle(&record.name, handle);
        }
        state.modules.insert(record.name.clone(), record);
    }

    /// Keep `handle` alive for `module` without recording a successful load.
    ///
    /// Used when a module fails after registering some classes: those
    /// classes stay registered, so the code they point into must stay loaded.
    pub fn retain_handle(&self, module: &str, handle: ModuleHandle) {
        self.write().retain_handle(module, handle);
    }

    /// Number of module handles held.
    pub fn handle_count(&self) -> usize {
        self.read().handles.len()
    }

    /// Load record for a module identifier.
    pub fn module(&self, name: &str) -> Option<ModuleRecord> {
        self.read().modules.get(name).cloned()
    }

    /// All module records, sorted by module identifier.
    pub fn modules(&self) -> Vec<ModuleRecord> {
        let mut modules: Vec<ModuleRecord> = self.read().modules.values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Registry")
            .field("categories", &state.categories.len())
            .field("plugins", &state.plugins.len())
            .field("modules", &state.modules.len())
            .field("handles", &state.handles.len())
            .finish()
    }
}
