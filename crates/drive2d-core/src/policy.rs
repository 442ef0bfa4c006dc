//! Policy trait and stub implementation.
//!
//! A [`Policy`] chooses the action for the agent whose turn it is, given the
//! observation the environment last reported for that agent. Learned
//! controllers live outside this crate; [`ZeroPolicy`] lets the stepping
//! loop run end to end without one.

use drive2d_types::{Action, Observation};

/// A source of actions.
pub trait Policy {
    /// Choose the action for `agent_index` given its latest observation.
    fn act(&mut self, agent_index: usize, observation: &Observation) -> Action;
}

/// A policy that always returns an all-zero action.
#[derive(Debug, Clone, Copy)]
pub struct ZeroPolicy {
    dim: usize,
}

impl ZeroPolicy {
    /// Create a policy producing `dim`-dimensional zero actions.
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Policy for ZeroPolicy {
    fn act(&mut self, _agent_index: usize, _observation: &Observation) -> Action {
        Action::zeros(self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_policy_matches_dimension() {
        let mut policy = ZeroPolicy::new(3);
        let action = policy.act(1, &Observation::blank(5));
        assert_eq!(action.as_slice(), &[0.0, 0.0, 0.0]);
    }
}
