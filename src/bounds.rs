use crate::encoding::Configuration;
use rand::Rng;

/// Projection of arbitrary switch vectors onto the feasible part of the search space.
pub trait FeasibilityRepair: Clone + Send + Sync {
    fn is_feasible(&self, code: &Configuration) -> bool;

    /// Return a feasible configuration. Must leave feasible input untouched.
    fn repair(&self, code: Configuration, rng: &mut impl Rng) -> Configuration;

    /// Draw `num_particles` random vectors, then repair each of them.
    fn generate_random_feasible(
        &self,
        rng: &mut impl Rng,
        len: usize,
        num_particles: usize,
    ) -> Vec<Configuration> {
        let drawn: Vec<Configuration> = (0..num_particles)
            .map(|_| Configuration::random(rng, len))
            .collect();
        drawn.into_iter().map(|code| self.repair(code, rng)).collect()
    }
}

/// Exactly one tie switch closed.
///
/// Closing a single tie is taken as the structural stand-in for "radial and without
/// islands". It is not a graph property; see [`crate::topology::RadialityValidator`]
/// for the real check.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleTieRepair;

impl FeasibilityRepair for SingleTieRepair {
    fn is_feasible(&self, code: &Configuration) -> bool {
        code.closed_count() == 1
    }

    fn repair(&self, mut code: Configuration, rng: &mut impl Rng) -> Configuration {
        if code.is_empty() {
            return code;
        }
        match code.closed_count() {
            1 => code,
            0 => {
                code.set(rng.gen_range(0..code.len()), true);
                code
            }
            _ => {
                // Every closed switch is dropped, not just the surplus ones.
                code.clear();
                code.set(rng.gen_range(0..code.len()), true);
                code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn all_vectors(len: usize) -> impl Iterator<Item = Configuration> {
        (0..(1u32 << len)).map(move |mask| {
            Configuration::from((0..len).map(|i| mask & (1 << i) != 0).collect::<Vec<_>>())
        })
    }

    #[test]
    fn feasible_codes_are_unchanged() {
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..5 {
            let code = Configuration::single(5, i);
            assert_eq!(SingleTieRepair.repair(code.clone(), &mut rng), code);
        }
    }

    #[test]
    fn every_vector_repairs_to_one_closed_switch() {
        let mut rng = StdRng::seed_from_u64(7);
        for code in all_vectors(5) {
            let repaired = SingleTieRepair.repair(code, &mut rng);
            assert_eq!(repaired.len(), 5);
            assert_eq!(repaired.closed_count(), 1);
            assert!(SingleTieRepair.is_feasible(&repaired));
        }
    }

    #[test]
    fn repair_of_all_closed_can_pick_any_switch() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let repaired = SingleTieRepair.repair(Configuration::from(vec![true; 4]), &mut rng);
            seen[repaired.closed_indices().next().unwrap()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn empty_code_is_left_alone() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(SingleTieRepair
            .repair(Configuration::open(0), &mut rng)
            .is_empty());
    }

    #[test]
    fn random_population_is_feasible() {
        let mut rng = StdRng::seed_from_u64(11);
        let population = SingleTieRepair.generate_random_feasible(&mut rng, 5, 40);
        assert_eq!(population.len(), 40);
        assert!(population.iter().all(|c| SingleTieRepair.is_feasible(c)));
    }
}
