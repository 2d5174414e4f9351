//! Registry Benchmarks
//!
//! Run with: cargo bench --bench registry

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use plugrack::plugins::{BaseContract, FromParams, Identity, Plugin, PluginClass};
use plugrack::{PluginLoader, Registry};
use serde_json::{json, Value};

const CATEGORY: &str = "preprocessing.scaling.static";

trait Scaler: Plugin {
    fn scale(&self, x: f64) -> f64;
}

#[derive(Debug)]
struct MinMaxScaler {
    identity: Identity,
    max: f64,
}

impl Plugin for MinMaxScaler {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl FromParams for MinMaxScaler {
    fn from_params(identity: Identity, params: &Value) -> anyhow::Result<Self> {
        let max = params.get("max").and_then(Value::as_f64).unwrap_or(1.0);
        Ok(Self { identity, max })
    }
}

impl Scaler for MinMaxScaler {
    fn scale(&self, x: f64) -> f64 {
        x.clamp(0.0, self.max)
    }
}

fn scaler_class() -> PluginClass {
    PluginClass::of::<MinMaxScaler>()
        .extends::<dyn Scaler>(|p| p)
        .build()
}

fn populated_registry(n: usize) -> Registry {
    let registry = Registry::new();
    registry
        .register_category(CATEGORY, BaseContract::of::<dyn Scaler>())
        .unwrap();
    for i in 0..n {
        registry
            .register(&format!("scaler_{}", i), CATEGORY, scaler_class())
            .unwrap();
    }
    registry
}

fn benchmark_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for n in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(format!("register_{}_plugins", n), n, |b, &n| {
            b.iter(|| black_box(populated_registry(n)));
        });
    }

    group.bench_function("reregister_same_class", |b| {
        let registry = populated_registry(100);
        b.iter(|| {
            registry
                .register(black_box("scaler_50"), CATEGORY, scaler_class())
                .unwrap()
        });
    });

    group.finish();
}

fn benchmark_loader(c: &mut Criterion) {
    let registry = populated_registry(100);
    let mut loader = PluginLoader::new(registry);

    let mut group = c.benchmark_group("loader");

    group.bench_function("list", |b| {
        b.iter(|| black_box(loader.list().len()));
    });

    group.bench_function("get_as", |b| {
        let params = json!({"max": 2.0});
        b.iter(|| {
            let scaler = loader
                .get_as::<dyn Scaler>(black_box("preprocessing.scaling.static.scaler_42"), &params)
                .unwrap();
            black_box(scaler.scale(3.0))
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_register, benchmark_loader);
criterion_main!(benches);
