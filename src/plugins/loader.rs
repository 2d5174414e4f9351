//! Plugin loader for Plugrack
//!
//! `PluginLoader` is the query and instantiation facade over a [`Registry`].
//! It keeps per-category views of the catalog (names and classes nested by
//! the dot segments of their category) and rebuilds them from the live
//! registry before answering each query, so plugins registered after the
//! loader was created are always visible.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{RackError, Result};

use super::registry::Registry;
use super::tree::CategoryTree;
use super::types::{BaseContract, Plugin, PluginClass};

/// Lists and instantiates registered plugins by fully-qualified name.
#[derive(Debug)]
pub struct PluginLoader {
    registry: Registry,
    names_by_category: CategoryTree<String>,
    classes_by_category: CategoryTree<Arc<PluginClass>>,
    fqns: Vec<String>,
}

impl PluginLoader {
    pub fn new(registry: Registry) -> Self {
        let mut loader = Self {
            registry,
            names_by_category: CategoryTree::new(),
            classes_by_category: CategoryTree::new(),
            fqns: Vec::new(),
        };
        loader.refresh();
        loader
    }

    /// Registered plugin names nested by category.
    pub fn list(&mut self) -> &CategoryTree<String> {
        self.refresh();
        &self.names_by_category
    }

    /// Fully-qualified names of all plugins, in registration order.
    pub fn list_fqns(&mut self) -> Vec<String> {
        self.refresh();
        self.fqns.clone()
    }

    /// Registered plugin classes nested by category.
    pub fn list_classes(&mut self) -> &CategoryTree<Arc<PluginClass>> {
        self.refresh();
        &self.classes_by_category
    }

    /// Every registered category and the base its plugins must satisfy.
    pub fn list_categories(&self) -> Vec<(String, BaseContract)> {
        self.registry.categories()
    }

    /// Construct the plugin registered under the fully-qualified `name`.
    ///
    /// `params` is forwarded to the plugin constructor unchanged. Errors
    /// raised by the constructor are returned as they are.
    ///
    /// # Errors
    /// - `RackError::PluginNotFound` if no plugin has that name
    /// - `RackError::Construction` if the constructor fails
    pub fn get(&mut self, name: &str, params: &Value) -> Result<Box<dyn Plugin>> {
        let class = self.get_class(name)?;
        debug!(plugin = %name, "Constructing plugin");
        class.instantiate(params)
    }

    /// Construct a plugin through one of the contracts its class declared,
    /// e.g. `loader.get_as::<dyn Imputer>("preprocessing.imputation.static.mean", &json!({}))`.
    pub fn get_as<B: ?Sized + 'static>(&mut self, name: &str, params: &Value) -> Result<Box<B>> {
        let class = self.get_class(name)?;
        debug!(plugin = %name, "Constructing plugin");
        class.instantiate_as::<B>(params)
    }

    /// The class registered under the fully-qualified `name`.
    pub fn get_class(&mut self, name: &str) -> Result<Arc<PluginClass>> {
        self.refresh();
        self.registry
            .get(name)
            .ok_or_else(|| RackError::PluginNotFound(name.to_string()))
    }

    fn refresh(&mut self) {
        let plugins = self.registry.plugins();

        let mut names = CategoryTree::new();
        let mut classes = CategoryTree::new();
        for class in &plugins {
            names.insert(class.category(), class.name().to_string());
            classes.insert(class.category(), Arc::clone(class));
        }

        self.fqns = plugins.iter().map(|class| class.fqn()).collect();
        self.names_by_category = names;
        self.classes_by_category = classes;
    }
}
