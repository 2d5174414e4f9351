//! Plugin types for Plugrack
//!
//! This module defines the capability contract every plugin implements, the
//! identity (`category` + `name`) a plugin receives when it is registered,
//! and `PluginClass`, the runtime descriptor the registry stores for each
//! concrete implementation.
//!
//! A class declares the contracts it satisfies with
//! [`PluginClassBuilder::extends`]. The upcast passed there is checked by the
//! compiler, so a class can only claim a base trait it really implements:
//!
//! ```rust
//! use plugrack::plugins::{FromParams, Identity, Plugin, PluginClass};
//! use serde_json::Value;
//!
//! trait Scaler: Plugin {
//!     fn scale(&self, x: f64) -> f64;
//! }
//!
//! #[derive(Debug)]
//! struct MinMaxScaler {
//!     identity: Identity,
//! }
//!
//! impl Plugin for MinMaxScaler {
//!     fn identity(&self) -> &Identity {
//!         &self.identity
//!     }
//! }
//!
//! impl FromParams for MinMaxScaler {
//!     fn from_params(identity: Identity, _params: &Value) -> anyhow::Result<Self> {
//!         Ok(Self { identity })
//!     }
//! }
//!
//! impl Scaler for MinMaxScaler {
//!     fn scale(&self, x: f64) -> f64 {
//!         x.clamp(0.0, 1.0)
//!     }
//! }
//!
//! let class = PluginClass::of::<MinMaxScaler>()
//!     .extends::<dyn Scaler>(|p| p)
//!     .build();
//! assert_eq!(class.type_name(), "MinMaxScaler");
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{RackError, Result};

/// Sentinel held by `name` and `category` until a class is registered.
pub const NOT_SET: &str = "NOT_SET";

/// The registered identity of a plugin.
///
/// Identities are only handed out by the registry, so every instance built
/// through a [`PluginClass`] carries the name and category it was registered
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    category: String,
    name: String,
}

impl Identity {
    pub(crate) fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    pub(crate) fn unset() -> Self {
        Self::new(NOT_SET, NOT_SET)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully-qualified name: `category.name`.
    pub fn fqn(&self) -> String {
        format!("{}.{}", self.category, self.name)
    }

    /// Whether both attributes have been assigned.
    pub fn is_set(&self) -> bool {
        self.name != NOT_SET && self.category != NOT_SET
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.name)
    }
}

/// The capability every registrable plugin implements.
///
/// Category base traits (imputers, classifiers, scalers, ...) extend this
/// trait, which is what lets [`BaseContract::of`] accept them.
pub trait Plugin: Any + Send + Sync + fmt::Debug {
    /// The identity this instance was constructed with.
    fn identity(&self) -> &Identity;

    fn name(&self) -> &str {
        self.identity().name()
    }

    fn category(&self) -> &str {
        self.identity().category()
    }

    fn fqn(&self) -> String {
        self.identity().fqn()
    }
}

/// Returns `category.name` for a plugin instance.
pub fn fully_qualified_name(plugin: &dyn Plugin) -> String {
    plugin.fqn()
}

/// Construction from keyword-style JSON parameters.
///
/// The loader forwards the caller's parameters unchanged; errors are
/// surfaced to the caller as-is.
pub trait FromParams: Sized {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self>;
}

/// Version tag mixed into every [`ContractKey`].
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifies a contract type by name.
///
/// `TypeId` values differ between a host and a plugin library built
/// separately, so contracts are matched by the type's path plus the plugrack
/// version both sides were built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractKey {
    type_name: &'static str,
    version: &'static str,
}

impl ContractKey {
    pub fn of<B: ?Sized + 'static>() -> Self {
        Self {
            type_name: type_name::<B>(),
            version: CONTRACT_VERSION,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn version(&self) -> &'static str {
        self.version
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.type_name, self.version)
    }
}

/// The base contract a category expects its plugins to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseContract {
    key: ContractKey,
    extends_plugin: bool,
}

impl BaseContract {
    /// Contract for a plugin base trait, e.g. `BaseContract::of::<dyn Imputer>()`.
    pub fn of<B: ?Sized + Plugin + 'static>() -> Self {
        Self {
            key: ContractKey::of::<B>(),
            extends_plugin: true,
        }
    }

    /// The generic plugin capability itself.
    pub fn root() -> Self {
        Self::of::<dyn Plugin>()
    }

    /// Contract for a type that is not known to extend [`Plugin`].
    ///
    /// Categories refuse such contracts at registration time.
    pub fn foreign<B: ?Sized + 'static>() -> Self {
        let key = ContractKey::of::<B>();
        Self {
            key,
            extends_plugin: key == ContractKey::of::<dyn Plugin>(),
        }
    }

    pub fn key(&self) -> ContractKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.type_name
    }

    pub fn extends_plugin(&self) -> bool {
        self.extends_plugin
    }
}

impl Serialize for BaseContract {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key.type_name)
    }
}

type Constructor<B> = Arc<dyn Fn(Identity, &Value) -> anyhow::Result<Box<B>> + Send + Sync>;

/// A contract declared by a class, with the constructor producing `Box<B>`.
#[derive(Clone)]
struct Contract {
    key: ContractKey,
    // Holds a `Constructor<B>` for the contract's `B`.
    constructor: Arc<dyn Any + Send + Sync>,
}

/// Runtime descriptor of a concrete plugin implementation.
///
/// Stores the type's simple name and defining module (used by the
/// re-registration sameness check), its identity, and one constructor per
/// declared contract.
#[derive(Clone)]
pub struct PluginClass {
    type_path: &'static str,
    type_name: String,
    module: String,
    identity: Identity,
    contracts: Vec<Contract>,
}

impl PluginClass {
    /// Start describing a plugin type. The generic capability is declared
    /// automatically.
    pub fn of<T: Plugin + FromParams>() -> PluginClassBuilder<T> {
        Self::builder::<T>().extends::<dyn Plugin>(upcast_plugin::<T>)
    }

    /// Start describing a type without declaring any contract.
    ///
    /// Useful when the contract set is assembled from data; registering such
    /// a class without [`PluginClassBuilder::extends`]`::<dyn Plugin>` fails.
    pub fn builder<T: FromParams + 'static>() -> PluginClassBuilder<T> {
        let type_path = type_name::<T>();
        let (module, _) = split_type_path(type_path);
        PluginClassBuilder {
            type_path,
            module: module.to_string(),
            contracts: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Full Rust path of the implementing type.
    pub fn type_path(&self) -> &str {
        self.type_path
    }

    /// Simple name of the implementing type, without path or generics.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Identifier of the module that defined (or loaded) this class.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn category(&self) -> &str {
        self.identity.category()
    }

    pub fn fqn(&self) -> String {
        self.identity.fqn()
    }

    /// Whether this class declared the given contract.
    pub fn satisfies(&self, contract: &BaseContract) -> bool {
        self.contracts.iter().any(|c| c.key == contract.key)
    }

    /// Names of the declared contracts, in declaration order.
    pub fn contracts(&self) -> Vec<&'static str> {
        self.contracts.iter().map(|c| c.key.type_name).collect()
    }

    /// Build a new instance as a generic plugin.
    pub fn instantiate(&self, params: &Value) -> Result<Box<dyn Plugin>> {
        self.instantiate_as::<dyn Plugin>(params)
    }

    /// Build a new instance through one of the declared contracts.
    pub fn instantiate_as<B: ?Sized + 'static>(&self, params: &Value) -> Result<Box<B>> {
        self.check_identity()?;
        let constructor = self.constructor::<B>().ok_or_else(|| {
            if ContractKey::of::<B>() == ContractKey::of::<dyn Plugin>() {
                RackError::NotACapability {
                    type_name: self.type_path.to_string(),
                }
            } else {
                RackError::WrongBase {
                    type_name: self.type_path.to_string(),
                    expected: type_name::<B>().to_string(),
                }
            }
        })?;
        constructor(self.identity.clone(), params).map_err(RackError::Construction)
    }

    /// Heuristic used to tolerate a class being registered again after its
    /// module was loaded a second time, possibly under another module path.
    ///
    /// Two classes are "the same" when their simple type names match and the
    /// last segments of their module identifiers match. This can accept two
    /// unrelated types that happen to share both.
    pub fn is_same_class(&self, other: &PluginClass) -> bool {
        self.type_name == other.type_name
            && last_module_segment(&self.module) == last_module_segment(&other.module)
    }

    pub(crate) fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub(crate) fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    fn check_identity(&self) -> Result<()> {
        if self.identity.name == NOT_SET {
            return Err(RackError::IdentityNotSet {
                type_name: self.type_name.clone(),
                attribute: "name",
            });
        }
        if self.identity.category == NOT_SET {
            return Err(RackError::IdentityNotSet {
                type_name: self.type_name.clone(),
                attribute: "category",
            });
        }
        Ok(())
    }

    fn constructor<B: ?Sized + 'static>(&self) -> Option<&Constructor<B>> {
        let key = ContractKey::of::<B>();
        let contract = self.contracts.iter().find(|c| c.key == key)?;
        if let Some(constructor) = contract.constructor.downcast_ref::<Constructor<B>>() {
            return Some(constructor);
        }
        // The class was built in another artifact (a plugin library), so the
        // `TypeId` check fails although the key names the same type.
        //
        // SAFETY: `extends::<B>` is the only writer of `constructor` and it
        // always stores a `Constructor<B>` for the `B` named by `key`. Equal
        // keys mean the same type path from the same plugrack version, and
        // plugin libraries must be built by the host's compiler, so both
        // sides agree on the layout of `Constructor<B>`.
        Some(unsafe { &*(Arc::as_ptr(&contract.constructor) as *const Constructor<B>) })
    }
}

impl fmt::Debug for PluginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginClass")
            .field("type_path", &self.type_path)
            .field("module", &self.module)
            .field("identity", &self.identity)
            .field("contracts", &self.contracts())
            .finish()
    }
}

impl fmt::Display for PluginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (module {})", self.type_name, self.module)
    }
}

impl Serialize for PluginClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PluginClass", 4)?;
        state.serialize_field("type", &self.type_name)?;
        state.serialize_field("module", &self.module)?;
        state.serialize_field("category", self.category())?;
        state.serialize_field("name", self.name())?;
        state.end()
    }
}

/// Builder returned by [`PluginClass::of`] and [`PluginClass::builder`].
pub struct PluginClassBuilder<T> {
    type_path: &'static str,
    module: String,
    contracts: Vec<Contract>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromParams + 'static> PluginClassBuilder<T> {
    /// Declare that `T` satisfies the contract `B`.
    ///
    /// `upcast` is normally `|p| p`; it only compiles when `T` implements `B`.
    pub fn extends<B: ?Sized + 'static>(mut self, upcast: fn(Box<T>) -> Box<B>) -> Self {
        let constructor: Constructor<B> = Arc::new(move |identity: Identity, params: &Value| {
            T::from_params(identity, params).map(|instance| upcast(Box::new(instance)))
        });
        let key = ContractKey::of::<B>();
        self.contracts.retain(|c| c.key != key);
        self.contracts.push(Contract {
            key,
            constructor: Arc::new(constructor),
        });
        self
    }

    /// Override the module identifier used by the sameness check.
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn build(self) -> PluginClass {
        let (_, simple) = split_type_path(self.type_path);
        PluginClass {
            type_path: self.type_path,
            type_name: simple.to_string(),
            module: self.module,
            identity: Identity::unset(),
            contracts: self.contracts,
        }
    }
}

fn upcast_plugin<T: Plugin>(plugin: Box<T>) -> Box<dyn Plugin> {
    plugin
}

/// Split `a::b::Type<c::D>` into (`a::b`, `Type`).
fn split_type_path(path: &str) -> (&str, &str) {
    let base = path.split('<').next().unwrap_or(path);
    match base.rfind("::") {
        Some(idx) => (&base[..idx], &base[idx + 2..]),
        None => ("", base),
    }
}

/// Final segment of a `::`- or `.`-separated module identifier.
fn last_module_segment(module: &str) -> &str {
    module
        .rsplit(|c| c == '.' || c == ':')
        .next()
        .unwrap_or(module)
}
