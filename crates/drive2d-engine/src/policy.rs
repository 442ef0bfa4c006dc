//! Seeded uniform random policy.

use drive2d_core::policy::Policy;
use drive2d_types::{Action, ActionSpace, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Samples every action component uniformly from the action space.
#[derive(Debug)]
pub struct RandomPolicy {
    space: ActionSpace,
    rng: StdRng,
}

impl RandomPolicy {
    /// Create a policy over `space` seeded with `seed`.
    pub fn new(space: ActionSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _agent_index: usize, _observation: &Observation) -> Action {
        let (low, high) = (self.space.low, self.space.high);
        if !(low.is_finite() && high.is_finite()) || low >= high {
            return Action::zeros(self.space.dim);
        }
        let values = (0..self.space.dim)
            .map(|_| self.rng.random_range(low..=high))
            .collect::<Vec<f64>>();
        Action::from(values)
    }
}

#[cfg(test)]
mod tests {
    use drive2d_types::BoxSpace;

    use super::*;

    #[test]
    fn samples_stay_in_bounds() {
        let space = BoxSpace::normalized_actions(3);
        let mut policy = RandomPolicy::new(space, 7);
        for _ in 0..100 {
            let action = policy.act(0, &Observation::blank(1));
            assert_eq!(action.dim(), 3);
            assert!(space.contains(action.as_slice()));
        }
    }

    #[test]
    fn same_seed_same_actions() {
        let space = BoxSpace::physical_actions(2);
        let mut a = RandomPolicy::new(space, 3);
        let mut b = RandomPolicy::new(space, 3);
        assert_eq!(a.act(0, &Observation::blank(1)), b.act(1, &Observation::blank(1)));
    }

    #[test]
    fn unbounded_space_falls_back_to_zeros() {
        let mut policy = RandomPolicy::new(BoxSpace::unbounded(2), 0);
        assert_eq!(policy.act(0, &Observation::blank(1)), Action::zeros(2));
    }
}
