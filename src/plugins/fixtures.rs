//! Small plugin families shared by the unit tests.

use anyhow::{bail, Context};
use serde_json::Value;

use super::types::{BaseContract, FromParams, Identity, Plugin, PluginClass};
use super::registry::Registry;

pub(crate) const IMPUTATION: &str = "preprocessing.imputation.static";
pub(crate) const CLASSIFICATION: &str = "classification";

pub(crate) trait Imputer: Plugin {
    fn impute(&self, values: &mut [Option<f64>]);
}

pub(crate) trait Classifier: Plugin {
    fn epochs(&self) -> u64;
}

#[derive(Debug)]
pub(crate) struct MeanImputer {
    identity: Identity,
}

impl Plugin for MeanImputer {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for MeanImputer {
    fn from_params(identity: Identity, _params: &Value) -> anyhow::Result<Self> {
        Ok(Self { identity })
    }
}

impl Imputer for MeanImputer {
    fn impute(&self, values: &mut [Option<f64>]) {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(mean);
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConstantImputer {
    identity: Identity,
    fill: f64,
}

impl Plugin for ConstantImputer {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for ConstantImputer {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self> {
        let fill = match params.get("fill") {
            Some(value) => value.as_f64().context("`fill` must be a number")?,
            None => 0.0,
        };
        Ok(Self { identity, fill })
    }
}

impl Imputer for ConstantImputer {
    fn impute(&self, values: &mut [Option<f64>]) {
        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(self.fill);
        }
    }
}

#[derive(Debug)]
pub(crate) struct LogisticClassifier {
    identity: Identity,
    epochs: u64,
}

impl Plugin for LogisticClassifier {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for LogisticClassifier {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self> {
        let epochs = params.get("epochs").and_then(Value::as_u64).unwrap_or(100);
        if epochs == 0 {
            bail!("epochs must be positive");
        }
        Ok(Self { identity, epochs })
    }
}

impl Classifier for LogisticClassifier {
    fn epochs(&self) -> u64 {
        self.epochs
    }
}

pub(crate) fn mean_imputer() -> PluginClass {
    PluginClass::of::<MeanImputer>()
        .extends::<dyn Imputer>(|p| p)
        .build()
}

pub(crate) fn constant_imputer() -> PluginClass {
    PluginClass::of::<ConstantImputer>()
        .extends::<dyn Imputer>(|p| p)
        .build()
}

pub(crate) fn logistic_classifier() -> PluginClass {
    PluginClass::of::<LogisticClassifier>()
        .extends::<dyn Classifier>(|p| p)
        .build()
}

/// Registry with the imputation and classification categories in place.
pub(crate) fn registry_with_categories() -> Registry {
    let registry = Registry::new();
    registry
        .register_category(IMPUTATION, BaseContract::of::<dyn Imputer>())
        .unwrap();
    registry
        .register_category(CLASSIFICATION, BaseContract::of::<dyn Classifier>())
        .unwrap();
    registry
}
