//! A plugin module registering one class into a category it declares
//! itself, then one into `fixture.models`, which the host must declare.
//! Without that host category the module fails after its first
//! registration.

use plugrack::plugins::{BaseContract, FromParams, Identity, ModuleRegistrar, Plugin, PluginClass};
use serde_json::Value;

pub const LIBRARY_CATEGORY: &str = "fixture.library";
pub const HOST_CATEGORY: &str = "fixture.models";

#[derive(Debug)]
pub struct Echo {
    identity: Identity,
    pub message: String,
}

impl Plugin for Echo {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for Echo {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("hello")
            .to_string();
        Ok(Self { identity, message })
    }
}

#[derive(Debug)]
pub struct ConstantModel {
    identity: Identity,
    pub value: f64,
}

impl Plugin for ConstantModel {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for ConstantModel {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self> {
        let value = params.get("value").and_then(Value::as_f64).unwrap_or(0.0);
        if value < 0.0 {
            anyhow::bail!("value must be non-negative, got {value}");
        }
        Ok(Self { identity, value })
    }
}

fn init(registrar: &ModuleRegistrar) -> plugrack::Result<()> {
    registrar.register_category(LIBRARY_CATEGORY, BaseContract::root())?;
    registrar.register("echo", LIBRARY_CATEGORY, PluginClass::of::<Echo>().build())?;
    registrar.register(
        "constant_model",
        HOST_CATEGORY,
        PluginClass::of::<ConstantModel>().build(),
    )?;
    Ok(())
}

plugrack::plugin_module!(init);
