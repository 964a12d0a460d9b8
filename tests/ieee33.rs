use dnr_pso::power_flow::solve_configuration;
use dnr_pso::settings::GridSettings;
use dnr_pso::{
    ieee33, CachedOracle, Configuration, FitnessOracle, NetworkOracle, PSOSettings,
    PowerFlowSettings, RadialityValidator, ReconfigurationReport, Reconfigurer,
    ValidatedOracle, DEFAULT_PENALTY_KW,
};
use std::num::NonZeroUsize;
use std::sync::Arc;

fn network() -> Arc<dnr_pso::Network> {
    Arc::new(ieee33(&GridSettings::default().dg).unwrap())
}

fn settings() -> PSOSettings {
    PSOSettings {
        num_particles: 10,
        max_iters: 10,
        ..Default::default()
    }
}

/// Loss of every single-tie configuration, by exhaustive power flow.
fn exhaustive(network: &dnr_pso::Network) -> Vec<f64> {
    (0..5)
        .map(|i| {
            solve_configuration(
                network,
                &Configuration::single(5, i),
                &PowerFlowSettings::default(),
            )
            .unwrap()
            .total_loss_kw()
        })
        .collect()
}

#[test]
fn swarm_finds_the_best_single_tie() {
    let network = network();
    let losses = exhaustive(&network);
    let best = losses.iter().copied().fold(f64::INFINITY, f64::min);

    let oracle = NetworkOracle::new(network.clone(), PowerFlowSettings::default());
    let result = Reconfigurer::new(oracle, settings())
        .fit(Some(42), None, false)
        .unwrap();
    assert_eq!(result.best_configuration.closed_count(), 1);
    assert!((result.best_loss_kw - best).abs() < 1e-9);
    assert!(result.best_loss_kw < DEFAULT_PENALTY_KW);
    assert_eq!(result.iteration_record.len(), 11);
}

#[test]
fn cache_does_not_change_the_result() {
    let network = network();
    let plain = Reconfigurer::new(
        NetworkOracle::new(network.clone(), PowerFlowSettings::default()),
        settings(),
    )
    .fit(Some(8), None, false)
    .unwrap();

    let cached = CachedOracle::new(
        NetworkOracle::new(network, PowerFlowSettings::default()),
        NonZeroUsize::new(16).unwrap(),
    );
    let reconfigurer = Reconfigurer::new(&cached, settings());
    let result = reconfigurer.fit(Some(8), None, false).unwrap();
    assert_eq!(result.best_configuration, plain.best_configuration);
    assert_eq!(result.iteration_record, plain.iteration_record);

    let (hits, misses) = cached.stats();
    assert!(misses <= 5);
    assert_eq!(hits + misses, 10 * 11);
}

#[test]
fn report_shows_a_loss_reduction() {
    let network = network();
    let oracle = NetworkOracle::new(network.clone(), PowerFlowSettings::default());
    let reconfigurer = Reconfigurer::new(oracle, settings());
    let result = reconfigurer.fit(Some(1), None, false).unwrap();
    let initial = reconfigurer.loss(&Configuration::open(5));
    assert!(initial > result.best_loss_kw);

    let report =
        ReconfigurationReport::new(&network, &PowerFlowSettings::default(), &result, initial)
            .unwrap();
    assert!(report.loss_reduction_percent > 0.0);
    assert_eq!(report.operations().len(), 1);
    assert_eq!(report.voltage_profile_pu.len(), 33);
    assert!(report.voltage_profile_pu.iter().all(|&vm| vm > 0.8 && vm <= 1.05));
}

#[test]
fn radiality_check_penalizes_every_closed_tie() {
    let network = network();
    let oracle = ValidatedOracle::new(
        NetworkOracle::new(network.clone(), PowerFlowSettings::default()),
        RadialityValidator::new(network),
    );
    assert_eq!(oracle.switch_count(), 5);
    let result = Reconfigurer::new(oracle, settings())
        .fit(Some(3), None, false)
        .unwrap();
    assert_eq!(result.best_loss_kw, DEFAULT_PENALTY_KW);
    assert_eq!(result.best_configuration.closed_count(), 1);
}

#[test]
fn restarts_pick_the_lowest_loss() {
    let network = network();
    let oracle = NetworkOracle::new(network, PowerFlowSettings::default());
    let reconfigurer = Reconfigurer::new(oracle, settings());
    let results = reconfigurer.fit_restarts(&[10, 11, 12, 13]).unwrap();
    assert_eq!(results.len(), 4);
    let min = results
        .iter()
        .map(|r| r.best_loss_kw)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(dnr_pso::best_of(results).unwrap().best_loss_kw, min);
}
