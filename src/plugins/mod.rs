//! Plugin system for Plugrack
//!
//! This module provides a typed plugin catalog. Plugin authors implement the
//! [`Plugin`] capability plus the base trait of a category (an imputer, a
//! classifier, ...), describe the implementation with a [`PluginClass`] and
//! register it under `category.name`. Applications then look plugins up and
//! construct them by that fully-qualified name.
//!
//! # Architecture
//!
//! - **types**: Capability trait, identities and class descriptors
//!   (`Plugin`, `Identity`, `FromParams`, `BaseContract`, `PluginClass`)
//! - **registry**: Category and plugin registration with conflict detection,
//!   plus the cache of loaded modules
//! - **discovery**: Scanning plugin packages for `plugin_*` modules
//! - **manifest**: JSON manifest modules resolved against a class catalog
//! - **dylib**: Dynamic-library modules (feature `dylib`)
//! - **loader**: Listing and instantiation by fully-qualified name
//! - **tree**: Category-nested views used by the loader
//!
//! # Plugin Package Structure
//!
//! ```text
//! plugins/
//! ├── classification/
//! │   ├── plugin_logistic.json
//! │   └── plugin_boosting.so
//! └── preprocessing/
//!     └── imputation/
//!         ├── plugin_static_imputation.json
//!         └── helpers.json        (ignored, no plugin_ prefix)
//! ```
//!
//! Each directory is discovered on its own; discovery does not recurse.

pub mod discovery;
#[cfg(feature = "dylib")]
pub mod dylib;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod tree;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use discovery::{
    module_name_from_path, package_dir, ModuleDiscovery, ModuleLoader, ModuleRegistrar,
    ModuleSpec, PLUGIN_FILENAME_PREFIX,
};
#[cfg(feature = "dylib")]
pub use dylib::{DylibLoader, PLUGRACK_ABI_VERSION};
pub use loader::PluginLoader;
pub use manifest::{validate_manifest, ClassCatalog, ManifestLoader, ModuleManifest, PluginDecl};
pub use registry::{ModuleHandle, ModuleRecord, Registry};
pub use tree::CategoryTree;
pub use types::{
    fully_qualified_name, BaseContract, ContractKey, FromParams, Identity, Plugin, PluginClass,
    PluginClassBuilder, NOT_SET,
};
