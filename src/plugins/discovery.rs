//! Plugin module discovery for Plugrack
//!
//! A plugin package is a directory holding `plugin_*` module files. Each
//! module, once loaded, registers its plugin classes with the shared
//! [`Registry`]. How a file becomes an executable module is up to a
//! [`ModuleLoader`]: declarative JSON manifests ([`ManifestLoader`]) and
//! dynamic libraries (`DylibLoader`, behind the `dylib` feature) are
//! provided.
//!
//! Module identifiers are derived from the file path, starting at the last
//! directory named after the root package:
//!
//! ```text
//! /opt/app/plugins/imputation/plugin_mean.json  ->  plugins.imputation.plugin_mean
//! ```
//!
//! [`ManifestLoader`]: super::manifest::ManifestLoader

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{RackError, Result};

use super::registry::{ModuleHandle, ModuleRecord, Registry};
use super::types::{BaseContract, PluginClass};

/// File name prefix marking a plugin module.
pub const PLUGIN_FILENAME_PREFIX: &str = "plugin_";

/// A plugin module file and the identifier it is loaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub path: PathBuf,
}

/// Turns a plugin module file into registrations.
pub trait ModuleLoader: Send + Sync {
    /// File extension (without the dot) of the modules this loader handles.
    fn extension(&self) -> &str;

    /// Execute the module, registering its plugins through `registrar`.
    ///
    /// Returns a handle that must stay alive as long as the registered
    /// classes do, if the loader needs one.
    ///
    /// # Errors
    /// `RackError::Load` if the file cannot be turned into a module.
    /// Registration errors are returned unchanged.
    fn load(&self, spec: &ModuleSpec, registrar: &ModuleRegistrar) -> Result<Option<ModuleHandle>>;
}

/// Registration entry point handed to a module while it loads.
///
/// Classes registered through it are attributed to the module being
/// loaded, which is what lets a module loaded twice re-register its classes
/// without conflicts.
#[derive(Debug, Clone)]
pub struct ModuleRegistrar {
    registry: Registry,
    module: String,
}

impl ModuleRegistrar {
    pub(crate) fn new(registry: Registry, module: impl Into<String>) -> Self {
        Self {
            registry,
            module: module.into(),
        }
    }

    /// Identifier of the module being loaded.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.registry.has_category(category)
    }

    /// Register a category unless it is already present.
    ///
    /// Modules may be loaded more than once, so an existing category with
    /// the same base is accepted. A different base is still a duplicate.
    pub fn register_category(&self, category: &str, expected: BaseContract) -> Result<()> {
        self.registry.ensure_category(category, expected)
    }

    /// Keep `handle` alive with the registry even though the module has not
    /// finished loading.
    ///
    /// A loader whose module fails after registering classes hands its
    /// handle over here before returning the error.
    pub fn retain(&self, handle: ModuleHandle) {
        self.registry.retain_handle(&self.module, handle);
    }

    /// Register `class` as `category.name`, attributed to this module.
    pub fn register(&self, name: &str, category: &str, class: PluginClass) -> Result<Arc<PluginClass>> {
        self.registry
            .register(name, category, class.with_module(self.module.as_str()))
    }
}

/// Scans plugin packages and loads their modules.
pub struct ModuleDiscovery {
    registry: Registry,
    config: DiscoveryConfig,
    loaders: Vec<Box<dyn ModuleLoader>>,
}

impl ModuleDiscovery {
    /// Discovery without any loader; add them with [`Self::with_loader`].
    pub fn new(registry: Registry, root_package: impl Into<String>) -> Self {
        let config = DiscoveryConfig {
            root_package: root_package.into(),
            ..DiscoveryConfig::default()
        };
        Self::from_config(registry, &config)
    }

    /// Discovery using the root package and module filters of `config`.
    pub fn from_config(registry: Registry, config: &DiscoveryConfig) -> Self {
        Self {
            registry,
            config: config.clone(),
            loaders: Vec::new(),
        }
    }

    /// Add a loader. A later loader for the same extension replaces the
    /// earlier one.
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        let ext = loader.extension().to_string();
        self.loaders.retain(|l| l.extension() != ext);
        self.loaders.push(Box::new(loader));
        self
    }

    pub fn root_package(&self) -> &str {
        &self.config.root_package
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Module identifiers of the plugin modules next to `marker`, without
    /// loading them.
    pub fn list_plugin_module_names(&self, marker: &Path) -> Result<Vec<String>> {
        Ok(self
            .module_specs(marker)?
            .into_iter()
            .map(|spec| spec.name)
            .collect())
    }

    /// Load every permitted plugin module next to `marker`.
    ///
    /// `marker` is a file inside the package directory or the directory
    /// itself. Loading runs each module's registrations once; a module
    /// already loaded earlier is loaded again, and registering the same
    /// classes again leaves the registry unchanged.
    ///
    /// # Returns
    /// Identifiers of the modules loaded, in file name order.
    ///
    /// # Errors
    /// - `RackError::Load` if a module cannot be loaded
    /// - any registration error raised by a module
    pub fn discover_plugin_modules(&self, marker: &Path) -> Result<Vec<String>> {
        let mut loaded = Vec::new();

        for spec in self.module_specs(marker)? {
            if !self.config.is_module_permitted(&spec.name) {
                warn!(module = %spec.name, "Plugin module not permitted by config, skipping");
                continue;
            }
            self.load_module(&spec)?;
            loaded.push(spec.name);
        }

        info!(
            package = %package_dir(marker).display(),
            modules = loaded.len(),
            plugins = self.registry.len(),
            "Discovered plugin modules"
        );
        Ok(loaded)
    }

    /// Run discovery over several package directories (for example
    /// [`DiscoveryConfig::resolved_plugin_dirs`]). Missing directories are
    /// skipped.
    pub fn discover_dirs(&self, dirs: &[PathBuf]) -> Result<Vec<String>> {
        let mut loaded = Vec::new();
        for dir in dirs {
            if !dir.exists() {
                info!(dir = %dir.display(), "Plugin directory does not exist, skipping");
                continue;
            }
            loaded.extend(self.discover_plugin_modules(dir)?);
        }
        Ok(loaded)
    }

    fn load_module(&self, spec: &ModuleSpec) -> Result<()> {
        let loader = self
            .loader_for(&spec.path)
            .ok_or_else(|| RackError::load(&spec.name, "no loader for file type"))?;

        debug!(module = %spec.name, path = %spec.path.display(), "Importing plugin module");

        let bytes = fs::read(&spec.path).map_err(|e| RackError::load(&spec.name, e))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let registrar = ModuleRegistrar::new(self.registry.clone(), spec.name.clone());
        let handle = loader.load(spec, &registrar)?;

        self.registry.record_module(
            ModuleRecord {
                name: spec.name.clone(),
                path: spec.path.clone(),
                digest,
                loaded_at: Utc::now(),
            },
            handle,
        );
        Ok(())
    }

    fn loader_for(&self, path: &Path) -> Option<&dyn ModuleLoader> {
        let ext = path.extension()?.to_str()?;
        self.loaders
            .iter()
            .find(|l| l.extension() == ext)
            .map(|l| l.as_ref())
    }

    fn module_specs(&self, marker: &Path) -> Result<Vec<ModuleSpec>> {
        let dir = package_dir(marker);
        if !dir.is_dir() {
            info!(dir = %dir.display(), "Plugin package directory does not exist, skipping");
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && is_plugin_file(&path) && self.loader_for(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| ModuleSpec {
                name: module_name_from_path(&path, &self.config.root_package),
                path,
            })
            .collect())
    }
}

/// Directory scanned for `marker`: the marker itself when it is a
/// directory, otherwise its parent.
pub fn package_dir(marker: &Path) -> PathBuf {
    if marker.is_dir() {
        return marker.to_path_buf();
    }
    match marker.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_plugin_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PLUGIN_FILENAME_PREFIX))
}

/// Dotted module identifier for `path`, starting at the last directory
/// named `root_package`. Falls back to the file stem.
pub fn module_name_from_path(path: &Path, root_package: &str) -> String {
    let mut parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let Some(file) = parts.pop() else {
        return String::new();
    };
    let stem = Path::new(&file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(file);

    match parts.iter().rposition(|p| p == root_package) {
        Some(start) => {
            let mut module = parts.split_off(start);
            module.push(stem);
            module.join(".")
        }
        None => stem,
    }
}
