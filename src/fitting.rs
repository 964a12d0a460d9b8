use crate::bounds::{FeasibilityRepair, SingleTieRepair};
use crate::encoding::Configuration;
use crate::error::{ReconfError, ReconfResult};
use crate::oracle::{evaluate, FitnessOracle, DEFAULT_PENALTY_KW};
use crate::particleswarm::{self, GlobalBestUpdate, SwarmState};
use crate::record::ConvergenceRecord;
use anyhow::{anyhow, Context, Result};
use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{Executor, State, KV};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Cost function used in the PSO: network loss with failures replaced by the penalty
struct LossCost<'a, O: FitnessOracle + ?Sized> {
    oracle: &'a O,
    penalty_kw: f64,
    parallelize: bool,
}

impl<'a, O: FitnessOracle + ?Sized> argmin::core::CostFunction for LossCost<'a, O> {
    type Param = Configuration;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output> {
        Ok(evaluate(self.oracle, param, self.penalty_kw))
    }

    fn parallelize(&self) -> bool {
        self.parallelize
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PSOSettings {
    pub num_particles: usize,
    /// Number of generations after initialization
    pub max_iters: u64,
    pub inertia_init: f64,
    pub inertia_final: f64,
    pub cognitive_factor: f64,
    pub social_factor: f64,
    /// Fitness of configurations the oracle fails to evaluate
    pub penalty_kw: f64,
    pub update: GlobalBestUpdate,
    /// Evaluate a generation on the rayon pool. Only has an effect with deferred updates.
    pub parallelize: bool,
    /// Log the global best every this many generations, 0 to disable
    pub log_every: u64,
}

impl Default for PSOSettings {
    fn default() -> Self {
        Self {
            num_particles: 30,
            max_iters: 50,
            inertia_init: 0.9,
            inertia_final: 0.4,
            cognitive_factor: 2.0,
            social_factor: 2.0,
            penalty_kw: DEFAULT_PENALTY_KW,
            update: GlobalBestUpdate::Immediate,
            parallelize: false,
            log_every: 10,
        }
    }
}

impl PSOSettings {
    pub fn validate(&self) -> ReconfResult<()> {
        if self.num_particles == 0 {
            return Err(ReconfError::EmptySwarm);
        }
        if !self.inertia_init.is_finite() || !self.inertia_final.is_finite() {
            return Err(ReconfError::InvalidParameter {
                name: "inertia",
                reason: "inertia weights must be finite".to_string(),
            });
        }
        for (name, value) in [
            ("cognitive_factor", self.cognitive_factor),
            ("social_factor", self.social_factor),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ReconfError::InvalidParameter {
                    name,
                    reason: format!("must be finite and >= 0, got {}", value),
                });
            }
        }
        if !(self.penalty_kw.is_finite() && self.penalty_kw > 0.0) {
            return Err(ReconfError::InvalidParameter {
                name: "penalty_kw",
                reason: format!("must be finite and > 0, got {}", self.penalty_kw),
            });
        }
        Ok(())
    }
}

fn setup_pso<B: FeasibilityRepair>(
    repair: B,
    switch_count: usize,
    settings: &PSOSettings,
    seed: Option<u64>,
) -> Result<particleswarm::BinaryParticleSwarm<B>> {
    let solver =
        particleswarm::BinaryParticleSwarm::new(repair, settings.num_particles, switch_count)
            .with_inertia_factors(settings.inertia_init, settings.inertia_final)?
            .with_cognitive_factor(settings.cognitive_factor)?
            .with_social_factor(settings.social_factor)?
            .with_update(settings.update);
    Ok(match seed {
        Some(seed) => solver.with_seed(seed),
        None => solver,
    })
}

/// Writes every particle of every generation to `<dir>/<prefix>_<generation>.json`
struct TraceObserver {
    dir: PathBuf,
    file_prefix: String,
    generation: u64,
}

impl TraceObserver {
    fn new(directory: &Path, file_prefix: &str) -> Self {
        Self {
            dir: directory.to_path_buf(),
            file_prefix: file_prefix.to_string(),
            generation: 0,
        }
    }

    fn write(&self, state: &SwarmState) -> Result<()> {
        let particles = state
            .get_population()
            .ok_or(argmin::core::Error::msg("No particles"))?;
        let trace = GenerationTrace {
            generation: self.generation,
            global_best_kw: state.get_cost(),
            particles: particles.iter().map(ParticleInfo::from).collect(),
        };
        let filename = self
            .dir
            .join(format!("{}_{}.json", self.file_prefix, self.generation));
        let f = BufWriter::new(File::create(filename)?);
        serde_json::to_writer(f, &trace)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct GenerationTrace<'a> {
    generation: u64,
    global_best_kw: f64,
    particles: Vec<ParticleInfo<'a>>,
}

#[derive(Serialize)]
struct ParticleInfo<'a> {
    position: &'a Configuration,
    cost: f64,
    best_position: &'a Configuration,
    best_cost: f64,
}

impl<'a> From<&'a particleswarm::Particle> for ParticleInfo<'a> {
    fn from(p: &'a particleswarm::Particle) -> Self {
        Self {
            position: &p.position,
            cost: p.cost,
            best_position: &p.best_position,
            best_cost: p.best_cost,
        }
    }
}

impl Observe<SwarmState> for TraceObserver {
    fn observe_init(&mut self, _name: &str, state: &SwarmState, _kv: &KV) -> Result<()> {
        self.generation = 0;
        self.write(state)
    }

    fn observe_iter(&mut self, state: &SwarmState, _kv: &KV) -> Result<()> {
        self.generation += 1;
        self.write(state)
    }
}

/// Progress bar over the generations, with a periodic log of the global best
struct ProgressObserver {
    bar: ProgressBar,
    log_every: u64,
    generation: u64,
}

impl ProgressObserver {
    fn new(max_iters: u64, log_every: u64, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(max_iters)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40} {pos}/{len} generations, best {msg} kW")
        {
            bar.set_style(style);
        }
        Self {
            bar,
            log_every,
            generation: 0,
        }
    }
}

impl Observe<SwarmState> for ProgressObserver {
    fn observe_init(&mut self, _name: &str, state: &SwarmState, _kv: &KV) -> Result<()> {
        self.generation = 0;
        self.bar.set_message(format!("{:.2}", state.get_cost()));
        info!(best_kw = state.get_cost(), "initial swarm evaluated");
        Ok(())
    }

    fn observe_iter(&mut self, state: &SwarmState, _kv: &KV) -> Result<()> {
        self.generation += 1;
        self.bar.inc(1);
        self.bar.set_message(format!("{:.2}", state.get_cost()));
        if self.log_every > 0 && self.generation % self.log_every == 0 {
            info!(
                generation = self.generation,
                best_kw = state.get_cost(),
                "swarm progress"
            );
        }
        if self.generation >= state.get_max_iters() {
            self.bar.finish();
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReconfigurationResult {
    pub best_configuration: Configuration,
    pub best_loss_kw: f64,
    /// Global best after initialization and after every generation
    pub iteration_record: ConvergenceRecord,
    pub seed: Option<u64>,
    pub iters: u64,
    pub time: f64,
}

/// Drives the binary swarm against a loss oracle
pub struct Reconfigurer<O: FitnessOracle, B: FeasibilityRepair = SingleTieRepair> {
    oracle: O,
    repair: B,
    settings: PSOSettings,
}

impl<O: FitnessOracle> Reconfigurer<O, SingleTieRepair> {
    pub fn new(oracle: O, settings: PSOSettings) -> Self {
        Self::with_repair(oracle, SingleTieRepair, settings)
    }
}

impl<O: FitnessOracle, B: FeasibilityRepair> Reconfigurer<O, B> {
    pub fn with_repair(oracle: O, repair: B, settings: PSOSettings) -> Self {
        Self {
            oracle,
            repair,
            settings,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Reject settings that would make the run meaningless. No oracle call is made.
    pub fn check(&self) -> ReconfResult<()> {
        self.settings.validate()?;
        if self.oracle.switch_count() == 0 {
            return Err(ReconfError::EmptyConfiguration);
        }
        Ok(())
    }

    /// The oracle must drive exactly `tie_switches` switches, e.g. those of the network a
    /// report is built for. No oracle call is made.
    pub fn check_switch_count(&self, tie_switches: usize) -> ReconfResult<()> {
        let found = self.oracle().switch_count();
        if found != tie_switches {
            return Err(ReconfError::LengthMismatch {
                expected: tie_switches,
                found,
            });
        }
        Ok(())
    }

    /// Run one swarm. With a seed the result is reproducible for a deterministic oracle.
    pub fn fit(
        &self,
        seed: Option<u64>,
        trace_directory: Option<&Path>,
        progress: bool,
    ) -> Result<ReconfigurationResult> {
        self.check()?;
        let cost_function = LossCost {
            oracle: &self.oracle,
            penalty_kw: self.settings.penalty_kw,
            parallelize: self.settings.parallelize,
        };
        let solver = setup_pso(
            self.repair.clone(),
            self.oracle.switch_count(),
            &self.settings,
            seed,
        )?;
        let observer = ProgressObserver::new(
            self.settings.max_iters,
            self.settings.log_every,
            progress,
        );
        let fitter = Executor::new(cost_function, solver)
            .configure(|state| state.max_iters(self.settings.max_iters))
            .add_observer(observer, ObserverMode::Always);
        let result = if let Some(dir) = trace_directory {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Error creating trace directory {}", dir.display()))?;
            let observer = TraceObserver::new(dir, "generation");
            fitter.add_observer(observer, ObserverMode::Always).run()?
        } else {
            fitter.run()?
        };

        let best = result
            .state
            .best_individual
            .ok_or(anyhow!("No best configuration found"))?;
        let time = match result.state.time {
            Some(t) => t.as_secs_f64(),
            None => 0.0,
        };
        info!(
            configuration = %best.position,
            loss_kw = result.state.best_cost,
            time,
            "reconfiguration finished"
        );
        Ok(ReconfigurationResult {
            best_configuration: best.position,
            best_loss_kw: result.state.best_cost,
            iteration_record: result.solver.into_record(),
            seed,
            iters: result.state.iter,
            time,
        })
    }

    /// Independent runs in parallel, one per seed, in seed order.
    pub fn fit_restarts(&self, seeds: &[u64]) -> Result<Vec<ReconfigurationResult>> {
        self.check()?;
        seeds
            .par_iter()
            .map(|&seed| self.fit(Some(seed), None, false))
            .collect()
    }

    /// Fitness of a single configuration, penalty included.
    pub fn loss(&self, code: &Configuration) -> f64 {
        evaluate(&self.oracle, code, self.settings.penalty_kw)
    }
}

/// The run with the lowest loss; the earliest wins ties.
pub fn best_of(results: Vec<ReconfigurationResult>) -> Option<ReconfigurationResult> {
    results.into_iter().fold(None, |best, r| match best {
        Some(b) if b.best_loss_kw <= r.best_loss_kw => Some(b),
        _ => Some(r),
    })
}

/// Run the swarm with the given settings and seed against `oracle`.
pub fn optimize<O: FitnessOracle>(
    oracle: O,
    settings: PSOSettings,
    seed: Option<u64>,
) -> Result<ReconfigurationResult> {
    Reconfigurer::new(oracle, settings).fit(seed, None, false)
}
