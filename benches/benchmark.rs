use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dnr_pso::power_flow::solve_configuration;
use dnr_pso::{
    ieee33, CachedOracle, Configuration, DistributedGeneration, GlobalBestUpdate,
    NetworkOracle, PSOSettings, PowerFlowSettings, Reconfigurer,
};
use std::num::NonZeroUsize;
use std::sync::Arc;

pub fn benchmark(c: &mut Criterion) {
    let dg = [
        DistributedGeneration {
            bus: 7,
            p_mw: 0.2,
            q_mvar: 0.0,
        },
        DistributedGeneration {
            bus: 22,
            p_mw: 0.2,
            q_mvar: 0.0,
        },
    ];
    let network = Arc::new(ieee33(&dg).unwrap());
    let pf_settings = PowerFlowSettings::default();
    let radial = Configuration::open(5);
    let meshed = Configuration::single(5, 2);

    c.bench_function("power flow radial", |b| {
        b.iter(|| solve_configuration(&network, black_box(&radial), &pf_settings).unwrap())
    });
    c.bench_function("power flow one loop", |b| {
        b.iter(|| solve_configuration(&network, black_box(&meshed), &pf_settings).unwrap())
    });

    let settings = PSOSettings {
        num_particles: 30,
        max_iters: 50,
        log_every: 0,
        ..Default::default()
    };
    c.bench_function("swarm uncached", |b| {
        let oracle = NetworkOracle::new(network.clone(), pf_settings);
        let reconfigurer = Reconfigurer::new(oracle, settings.clone());
        b.iter(|| reconfigurer.fit(black_box(Some(42)), None, false).unwrap())
    });
    c.bench_function("swarm cached", |b| {
        let oracle = CachedOracle::new(
            NetworkOracle::new(network.clone(), pf_settings),
            NonZeroUsize::new(64).unwrap(),
        );
        let reconfigurer = Reconfigurer::new(oracle, settings.clone());
        b.iter(|| reconfigurer.fit(black_box(Some(42)), None, false).unwrap())
    });
    c.bench_function("swarm deferred parallel", |b| {
        let oracle = NetworkOracle::new(network.clone(), pf_settings);
        let settings = PSOSettings {
            update: GlobalBestUpdate::Deferred,
            parallelize: true,
            ..settings.clone()
        };
        let reconfigurer = Reconfigurer::new(oracle, settings);
        b.iter(|| reconfigurer.fit(black_box(Some(42)), None, false).unwrap())
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
