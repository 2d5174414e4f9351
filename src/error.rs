//! Error types for Plugrack
//!
//! This module defines all error types raised by the registry, module
//! discovery and the plugin loader. Uses `thiserror` for ergonomic error
//! handling with automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// The primary error type for Plugrack operations.
#[derive(Error, Debug)]
pub enum RackError {
    /// A plugin class was instantiated before its identity was assigned.
    #[error("Plugin {type_name} `{attribute}` was not set, register the plugin before constructing it")]
    IdentityNotSet {
        type_name: String,
        attribute: &'static str,
    },

    /// The category was already registered.
    #[error("Plugin category {0} already registered")]
    DuplicateCategory(String),

    /// The category name is empty or has an empty dot segment.
    #[error("Plugin category name `{0}` is invalid: segments must not be empty")]
    InvalidCategory(String),

    /// The expected base of a category does not extend the plugin capability.
    #[error("Plugin expected base for category {category} should extend Plugin but was {base}")]
    InvalidBase { category: String, base: String },

    /// A plugin references a category that was never registered.
    #[error("Found plugin category {category} which has not been registered")]
    CategoryNotRegistered { category: String },

    /// The plugin class does not declare the plugin capability.
    #[error("Expected plugin class {type_name} to extend Plugin")]
    NotACapability { type_name: String },

    /// The plugin class does not declare the base expected by its category.
    #[error("Expected plugin class {type_name} to extend {expected}")]
    WrongBase { type_name: String, expected: String },

    /// Another class is already registered under the fully-qualified name.
    #[error("Plugin with fully-qualified name {fqn} already registered (as class {existing}), cannot register {new}")]
    DuplicateFqn {
        fqn: String,
        new: String,
        existing: String,
    },

    /// Another class is already registered under the bare name.
    #[error("Plugin with name {name} already registered (as class {existing}), cannot register {new}")]
    DuplicateName {
        name: String,
        new: String,
        existing: String,
    },

    /// No plugin is registered under the requested name.
    #[error("Plugin {0} does not exist.")]
    PluginNotFound(String),

    /// A plugin module could not be turned into an executable module.
    #[error("Import failed for {module}: {reason}")]
    Load { module: String, reason: String },

    /// Error raised by a plugin's own constructor, passed through as-is.
    #[error(transparent)]
    Construction(anyhow::Error),

    /// Configuration-related errors (invalid config file, bad overrides, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RackError {
    /// Helper to construct module load errors.
    pub fn load(module: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RackError::Load {
            module: module.into(),
            reason: reason.to_string(),
        }
    }
}

/// A specialized `Result` type for Plugrack operations.
pub type Result<T> = std::result::Result<T, RackError>;
