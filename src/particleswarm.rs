// Copyright 2018-2024 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Binary Particle Swarm Optimization
//!
//! Discrete PSO over tie-switch configurations. Positions are bit vectors; the velocity
//! of every bit is a real number that is squashed with the logistic function and
//! thresholded at 0.5 to give the next bit. After every move the position is projected
//! back onto the feasible set by a [`FeasibilityRepair`].
//!
//! The inertia weight decreases linearly from `inertia_init` in the first generation
//! towards `inertia_final`.
//!
//! For details see [`BinaryParticleSwarm`].
//!
//! ## References
//!
//! \[0\] Kennedy, J. and Eberhart, R. C. (1997): A discrete binary version of the particle
//! swarm algorithm. IEEE International Conference on Systems, Man, and Cybernetics.
//! <https://doi.org/10.1109/ICSMC.1997.637339>

use crate::bounds::FeasibilityRepair;
use crate::encoding::Configuration;
use crate::record::ConvergenceRecord;
use argmin::{
    argmin_error, argmin_error_closure,
    core::{CostFunction, Error, PopulationState, Problem, Solver, State, SyncAlias, KV},
};
use itertools::Itertools;
use nalgebra as na;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// When a better particle replaces the global best.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalBestUpdate {
    /// Right after the particle is evaluated. Particles later in the same generation
    /// are attracted to the new best, so the result depends on particle order.
    #[default]
    Immediate,
    /// Every particle of a generation moves towards the best known at the start of the
    /// generation. The moved particles are evaluated as one batch, in parallel if the
    /// cost function allows it.
    Deferred,
}

pub type SwarmState = PopulationState<Particle, f64>;

pub struct BinaryParticleSwarm<B: FeasibilityRepair> {
    /// Inertia weight of the first generation
    inertia_init: f64,
    /// Inertia weight the schedule approaches in the last generation
    inertia_final: f64,
    /// Cognitive acceleration coefficient
    weight_cognitive: f64,
    /// Social acceleration coefficient
    weight_social: f64,
    /// Projection onto feasible configurations
    repair: B,
    num_particles: usize,
    switch_count: usize,
    update: GlobalBestUpdate,
    /// Generation budget, taken from the state in `init`
    max_iters: u64,
    record: ConvergenceRecord,
    /// Random number generator
    rng_generator: StdRng,
}

impl<B: FeasibilityRepair> BinaryParticleSwarm<B> {
    pub fn new(repair: B, num_particles: usize, switch_count: usize) -> Self {
        BinaryParticleSwarm {
            inertia_init: 0.9,
            inertia_final: 0.4,
            weight_cognitive: 2.0,
            weight_social: 2.0,
            repair,
            num_particles,
            switch_count,
            update: GlobalBestUpdate::Immediate,
            max_iters: 0,
            record: ConvergenceRecord::default(),
            rng_generator: StdRng::from_entropy(),
        }
    }

    pub fn with_inertia_factors(mut self, initial: f64, last: f64) -> Result<Self, Error> {
        if !initial.is_finite() || !last.is_finite() {
            return Err(argmin_error!(
                InvalidParameter,
                "`BinaryParticleSwarm`: inertia factors must be finite."
            ));
        }
        self.inertia_init = initial;
        self.inertia_final = last;
        Ok(self)
    }

    pub fn with_cognitive_factor(mut self, factor: f64) -> Result<Self, Error> {
        if !(factor.is_finite() && factor >= 0.0) {
            return Err(argmin_error!(
                InvalidParameter,
                "`BinaryParticleSwarm`: cognitive factor must be >=0."
            ));
        }
        self.weight_cognitive = factor;
        Ok(self)
    }

    pub fn with_social_factor(mut self, factor: f64) -> Result<Self, Error> {
        if !(factor.is_finite() && factor >= 0.0) {
            return Err(argmin_error!(
                InvalidParameter,
                "`BinaryParticleSwarm`: social factor must be >=0."
            ));
        }
        self.weight_social = factor;
        Ok(self)
    }

    pub fn with_update(mut self, update: GlobalBestUpdate) -> Self {
        self.update = update;
        self
    }

    /// Make the run reproducible. Without a seed the generator is seeded from entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_generator = StdRng::seed_from_u64(seed);
        self
    }

    /// Global best after initialization and after every finished generation.
    pub fn record(&self) -> &ConvergenceRecord {
        &self.record
    }

    pub fn into_record(self) -> ConvergenceRecord {
        self.record
    }

    /// `w(t) = w_init - (w_init - w_final) * t / max_iters`
    fn inertia_weight(&self, generation: u64) -> f64 {
        if self.max_iters == 0 {
            return self.inertia_final;
        }
        let progress = (generation as f64 / self.max_iters as f64).min(1.0);
        self.inertia_init - (self.inertia_init - self.inertia_final) * progress
    }

    /// Compute the velocity of `particle`, return its repaired next position.
    fn move_particle(
        &mut self,
        particle: &mut Particle,
        global_best: &Configuration,
        inertia: f64,
    ) -> Configuration {
        let n = self.switch_count;
        let position = particle.position.as_vector();

        let r1 = random_vector(&mut self.rng_generator, n);
        let r2 = random_vector(&mut self.rng_generator, n);
        let momentum = random_vector(&mut self.rng_generator, n) * inertia;
        let pull_to_optimum = r1.component_mul(&(particle.best_position.as_vector() - &position))
            * self.weight_cognitive;
        let pull_to_global_optimum =
            r2.component_mul(&(global_best.as_vector() - &position)) * self.weight_social;
        let velocity = momentum + pull_to_optimum + pull_to_global_optimum;

        let moved: Vec<bool> = velocity.iter().map(|&v| sigmoid(v) > 0.5).collect();
        particle.velocity = velocity.iter().copied().collect();
        self.repair
            .repair(Configuration::from(moved), &mut self.rng_generator)
    }
}

fn random_vector(rng: &mut impl Rng, n: usize) -> na::DVector<f64> {
    na::DVector::from_fn(n, |_, _| rng.gen::<f64>())
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Index of the lowest cost; the first one wins ties.
fn first_minimum(particles: &[Particle]) -> Option<usize> {
    particles
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, p)| match best {
            Some((_, cost)) if cost <= p.cost => best,
            _ => Some((i, p.cost)),
        })
        .map(|(i, _)| i)
}

impl<B, O> Solver<O, SwarmState> for BinaryParticleSwarm<B>
where
    B: FeasibilityRepair,
    O: CostFunction<Param = Configuration, Output = f64> + SyncAlias,
{
    const NAME: &'static str = "BinaryParticleSwarm";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: SwarmState,
    ) -> Result<(SwarmState, Option<KV>), Error> {
        if self.switch_count == 0 {
            return Err(argmin_error!(
                InvalidParameter,
                "`BinaryParticleSwarm`: invalid configuration length 0."
            ));
        }
        self.max_iters = state.get_max_iters();

        let positions = self.repair.generate_random_feasible(
            &mut self.rng_generator,
            self.switch_count,
            self.num_particles,
        );
        let costs = problem.bulk_cost(&positions)?;
        let particles: Vec<Particle> = positions
            .into_iter()
            .zip(costs)
            .map(|(position, cost)| Particle::new(position, cost, self.switch_count))
            .collect();

        let best = first_minimum(&particles).ok_or_else(argmin_error_closure!(
            InvalidParameter,
            "`BinaryParticleSwarm`: the swarm has no particles."
        ))?;
        let best_particle = particles[best].clone();

        self.record = ConvergenceRecord::with_capacity(
            usize::try_from(self.max_iters).unwrap_or(usize::MAX),
        );
        self.record.push(best_particle.cost);

        Ok((
            state
                .cost(best_particle.cost)
                .individual(best_particle)
                .population(particles),
            None,
        ))
    }

    /// Perform one generation
    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        mut state: SwarmState,
    ) -> Result<(SwarmState, Option<KV>), Error> {
        let mut best_particle = state.take_individual().ok_or_else(argmin_error_closure!(
            PotentialBug,
            "`BinaryParticleSwarm`: No current best individual in state."
        ))?;
        let mut particles = state.take_population().ok_or_else(argmin_error_closure!(
            PotentialBug,
            "`BinaryParticleSwarm`: No population in state."
        ))?;
        let inertia = self.inertia_weight(state.get_iter());

        match self.update {
            GlobalBestUpdate::Immediate => {
                for particle in particles.iter_mut() {
                    let position = self.move_particle(particle, &best_particle.position, inertia);
                    let cost = problem.cost(&position)?;
                    particle.update(position, cost);
                    if cost < best_particle.cost {
                        best_particle = particle.clone();
                    }
                }
            }
            GlobalBestUpdate::Deferred => {
                let global_best = best_particle.position.clone();
                let positions: Vec<Configuration> = particles
                    .iter_mut()
                    .map(|particle| self.move_particle(particle, &global_best, inertia))
                    .collect();
                let costs = problem.bulk_cost(&positions)?;
                for (particle, (position, cost)) in particles
                    .iter_mut()
                    .zip_eq(positions.into_iter().zip(costs))
                {
                    particle.update(position, cost);
                    if cost < best_particle.cost {
                        best_particle = particle.clone();
                    }
                }
            }
        }

        self.record.push(best_particle.cost);
        Ok((
            state
                .cost(best_particle.cost)
                .individual(best_particle)
                .population(particles),
            None,
        ))
    }
}

/// A single particle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Current switch configuration
    pub position: Configuration,
    /// Real-valued velocity of the last move
    pub velocity: Vec<f64>,
    /// Loss of the current position
    pub cost: f64,
    /// Best position of particle so far
    pub best_position: Configuration,
    /// Best cost of particle so far
    pub best_cost: f64,
}

impl Particle {
    pub fn new(position: Configuration, cost: f64, switch_count: usize) -> Particle {
        Particle {
            best_position: position.clone(),
            position,
            velocity: vec![0.0; switch_count],
            cost,
            best_cost: cost,
        }
    }

    /// Move to `position` and keep it as personal best if strictly better.
    fn update(&mut self, position: Configuration, cost: f64) {
        if cost < self.best_cost {
            self.best_position = position.clone();
            self.best_cost = cost;
        }
        self.position = position;
        self.cost = cost;
    }
}
