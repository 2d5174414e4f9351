//! End-to-end plugin lifecycle: category registration, manifest module
//! discovery, listing and construction through the loader.

use std::fs;
use std::path::Path;

use plugrack::plugins::{
    BaseContract, ClassCatalog, FromParams, Identity, ManifestLoader, ModuleDiscovery, Plugin,
    PluginClass,
};
use plugrack::{DiscoveryConfig, PluginLoader, RackError, Registry};
use serde_json::{json, Value};
use tempfile::TempDir;

const SURVIVAL: &str = "time_to_event";
const SCALING: &str = "preprocessing.scaling.temporal";

trait SurvivalAnalyzer: Plugin {
    fn horizons(&self) -> Vec<f64>;
}

trait Scaler: Plugin {
    fn scale(&self, values: &[f64]) -> Vec<f64>;
}

#[derive(Debug)]
struct CoxPh {
    identity: Identity,
    penalizer: f64,
}

impl Plugin for CoxPh {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for CoxPh {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self> {
        let penalizer = params.get("penalizer").and_then(Value::as_f64).unwrap_or(0.0);
        if penalizer < 0.0 {
            anyhow::bail!("penalizer must be non-negative, got {penalizer}");
        }
        Ok(Self {
            identity,
            penalizer,
        })
    }
}

impl SurvivalAnalyzer for CoxPh {
    fn horizons(&self) -> Vec<f64> {
        [1.0, 2.0, 3.0]
            .iter()
            .map(|h| h * (1.0 + self.penalizer))
            .collect()
    }
}

#[derive(Debug)]
struct StandardScaler {
    identity: Identity,
}

impl Plugin for StandardScaler {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for StandardScaler {
    fn from_params(identity: Identity, _params: &Value) -> anyhow::Result<Self> {
        Ok(Self { identity })
    }
}

impl Scaler for StandardScaler {
    fn scale(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        values.iter().map(|v| (v - mean) / std).collect()
    }
}

fn catalog() -> ClassCatalog {
    ClassCatalog::new()
        .with("coxph", || {
            PluginClass::of::<CoxPh>()
                .extends::<dyn SurvivalAnalyzer>(|p| p)
                .build()
        })
        .with("standard_scaler", || {
            PluginClass::of::<StandardScaler>()
                .extends::<dyn Scaler>(|p| p)
                .build()
        })
}

fn registry() -> Registry {
    let registry = Registry::new();
    registry
        .register_category(SURVIVAL, BaseContract::of::<dyn SurvivalAnalyzer>())
        .unwrap();
    registry
        .register_category(SCALING, BaseContract::of::<dyn Scaler>())
        .unwrap();
    registry
}

/// `plugins/` holding `plugin_a.json`, `plugin_b.json`, `helper.json` and a
/// package marker.
fn package(root: &Path) -> std::path::PathBuf {
    let pkg = root.join("plugins");
    fs::create_dir_all(&pkg).unwrap();
    fs::write(pkg.join("package.json"), "{}").unwrap();
    fs::write(
        pkg.join("plugin_a.json"),
        json!({
            "description": "Survival models",
            "plugins": [{"name": "coxph", "category": SURVIVAL, "class": "coxph"}]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        pkg.join("plugin_b.json"),
        json!({
            "plugins": [{"name": "ts_standard_scaler", "category": SCALING, "class": "standard_scaler"}]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        pkg.join("helper.json"),
        json!({
            "plugins": [{"name": "helper_scaler", "category": SCALING, "class": "standard_scaler"}]
        })
        .to_string(),
    )
    .unwrap();
    pkg
}

fn discovery(registry: &Registry) -> ModuleDiscovery {
    ModuleDiscovery::new(registry.clone(), "plugins").with_loader(ManifestLoader::new(catalog()))
}

#[test]
fn discovery_lists_and_loads_only_plugin_modules() {
    let tmp = TempDir::new().unwrap();
    let marker = package(tmp.path()).join("package.json");
    let registry = registry();
    let discovery = discovery(&registry);

    assert_eq!(
        discovery.list_plugin_module_names(&marker).unwrap(),
        vec!["plugins.plugin_a", "plugins.plugin_b"]
    );

    let loaded = discovery.discover_plugin_modules(&marker).unwrap();
    assert_eq!(loaded, vec!["plugins.plugin_a", "plugins.plugin_b"]);

    let mut loader = PluginLoader::new(registry.clone());
    assert_eq!(
        loader.list_fqns(),
        vec![
            "time_to_event.coxph",
            "preprocessing.scaling.temporal.ts_standard_scaler",
        ]
    );
    assert!(!registry.contains("preprocessing.scaling.temporal.helper_scaler"));
    assert_eq!(
        serde_json::to_value(loader.list()).unwrap(),
        json!({
            "time_to_event": ["coxph"],
            "preprocessing": {"scaling": {"temporal": ["ts_standard_scaler"]}},
        })
    );
}

#[test]
fn discovering_twice_leaves_registry_unchanged() {
    let tmp = TempDir::new().unwrap();
    let pkg = package(tmp.path());
    let registry = registry();
    let discovery = discovery(&registry);

    discovery.discover_plugin_modules(&pkg).unwrap();
    let before = registry.len();
    discovery.discover_plugin_modules(&pkg).unwrap();

    assert_eq!(registry.len(), before);
    assert_eq!(registry.modules().len(), 2);
}

#[test]
fn discovered_plugins_construct_through_their_base() {
    let tmp = TempDir::new().unwrap();
    let pkg = package(tmp.path());
    let registry = registry();
    discovery(&registry).discover_plugin_modules(&pkg).unwrap();

    let mut loader = PluginLoader::new(registry);
    let model = loader
        .get_as::<dyn SurvivalAnalyzer>("time_to_event.coxph", &json!({"penalizer": 0.1}))
        .unwrap();
    assert_eq!(model.fqn(), "time_to_event.coxph");
    assert_eq!(model.horizons().len(), 3);

    let scaler = loader
        .get_as::<dyn Scaler>(
            "preprocessing.scaling.temporal.ts_standard_scaler",
            &json!({}),
        )
        .unwrap();
    assert_eq!(scaler.scale(&[1.0, 3.0]), vec![-1.0, 1.0]);

    let err = loader
        .get("time_to_event.coxph", &json!({"penalizer": -1.0}))
        .unwrap_err();
    assert_eq!(err.to_string(), "penalizer must be non-negative, got -1");
}

#[test]
fn unknown_plugin_is_reported() {
    let mut loader = PluginLoader::new(registry());
    let err = loader.get("nonexistent.fqn", &json!({})).unwrap_err();
    assert!(matches!(err, RackError::PluginNotFound(_)));
}

#[test]
fn module_name_clash_across_categories_fails_discovery() {
    let tmp = TempDir::new().unwrap();
    let pkg = package(tmp.path());
    let registry = registry();
    registry
        .register(
            "coxph",
            SCALING,
            PluginClass::of::<StandardScaler>()
                .extends::<dyn Scaler>(|p| p)
                .build(),
        )
        .unwrap();

    let err = discovery(&registry).discover_plugin_modules(&pkg).unwrap_err();
    assert!(matches!(err, RackError::DuplicateName { ref name, .. } if name == "coxph"));
    assert!(!registry.contains("time_to_event.coxph"));
}

#[test]
fn config_blocklist_skips_modules() {
    let tmp = TempDir::new().unwrap();
    let pkg = package(tmp.path());
    let registry = registry();
    let config = DiscoveryConfig {
        blocked_modules: vec!["plugins.plugin_a".to_string()],
        ..DiscoveryConfig::default()
    };
    let discovery = ModuleDiscovery::from_config(registry.clone(), &config)
        .with_loader(ManifestLoader::new(catalog()));

    let loaded = discovery.discover_dirs(&[pkg]).unwrap();
    assert_eq!(loaded, vec!["plugins.plugin_b"]);
    assert_eq!(registry.len(), 1);
}
