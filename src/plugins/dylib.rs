//! Dynamic-library plugin modules for Plugrack
//!
//! A dynamic-library module is a `plugin_*` shared library (`.so`, `.dylib`
//! or `.dll`) exporting an init function that registers its classes. The
//! library is kept open by the registry for as long as the registry lives,
//! including when init fails after registering some classes.
//!
//! Plugin crates are built as `cdylib` against the same `plugrack` version
//! and compiler as the host. Contracts are matched by [`ContractKey`], so a
//! library can register into categories the host declared, and the host can
//! construct library classes through its own base traits. Entry points are
//! exported with
//! [`plugin_module!`](crate::plugin_module):
//!
//! ```ignore
//! use plugrack::plugins::{ModuleRegistrar, PluginClass};
//!
//! fn init(registrar: &ModuleRegistrar) -> plugrack::Result<()> {
//!     registrar.register(
//!         "mean",
//!         "preprocessing.imputation.static",
//!         PluginClass::of::<MeanImputer>().extends::<dyn Imputer>(|p| p).build(),
//!     )?;
//!     Ok(())
//! }
//!
//! plugrack::plugin_module!(init);
//! ```
//!
//! [`ContractKey`]: super::types::ContractKey

use libloading::Library;

use crate::error::{RackError, Result};

use super::discovery::{ModuleLoader, ModuleRegistrar, ModuleSpec};
use super::registry::ModuleHandle;

/// Version of the module entry point contract. Bumped whenever the
/// registrar's layout or the init signature changes.
pub const PLUGRACK_ABI_VERSION: u32 = 1;

const INIT_SYMBOL: &[u8] = b"plugrack_module_init\0";
const ABI_SYMBOL: &[u8] = b"plugrack_abi_version\0";

#[allow(improper_ctypes_definitions)]
pub type ModuleInitFn = unsafe extern "C" fn(&ModuleRegistrar) -> Result<()>;

pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Export `$init` (a `fn(&ModuleRegistrar) -> plugrack::Result<()>`) as the
/// entry point of a dynamic-library plugin module.
#[macro_export]
macro_rules! plugin_module {
    ($init:path) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn plugrack_module_init(
            registrar: &$crate::plugins::ModuleRegistrar,
        ) -> $crate::Result<()> {
            $init(registrar)
        }

        #[no_mangle]
        pub extern "C" fn plugrack_abi_version() -> u32 {
            $crate::plugins::PLUGRACK_ABI_VERSION
        }
    };
}

/// Loads `plugin_*` dynamic libraries for the current platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DylibLoader {
    fn extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }

    fn load(&self, spec: &ModuleSpec, registrar: &ModuleRegistrar) -> Result<Option<ModuleHandle>> {
        // SAFETY: plugin libraries are trusted code built against this crate;
        // running their initializers and calling their exports is the contract.
        unsafe {
            let library = Library::new(&spec.path)
                .map_err(|err| RackError::load(&spec.name, format!("failed to open library: {err}")))?;

            let abi: AbiVersionFn = *library.get::<AbiVersionFn>(ABI_SYMBOL).map_err(|err| {
                RackError::load(&spec.name, format!("missing symbol 'plugrack_abi_version': {err}"))
            })?;
            let version = abi();
            if version != PLUGRACK_ABI_VERSION {
                return Err(RackError::load(
                    &spec.name,
                    format!("built for module ABI {version}, expected {PLUGRACK_ABI_VERSION}"),
                ));
            }

            let init: ModuleInitFn = *library.get::<ModuleInitFn>(INIT_SYMBOL).map_err(|err| {
                RackError::load(&spec.name, format!("missing symbol 'plugrack_module_init': {err}"))
            })?;
            if let Err(err) = init(registrar) {
                // Classes registered before the failure point into the library.
                registrar.retain(Box::new(library));
                return Err(err);
            }

            Ok(Some(Box::new(library)))
        }
    }
}
