//! Agent slot: the boundary toward the vehicle dynamics collaborator.
//!
//! The engine does not integrate vehicle physics itself. Each controllable
//! vehicle is an [`AgentSlot`] supplied by the caller; the engine resets it,
//! steps it with an action, a simulated time delta and the collision verdict
//! for the tick, and stores the `(observation, reward, done, info)` tuple it
//! returns.

use drive2d_types::{Action, CollisionStatus, Footprint, Observation, StepOutcome};

use crate::config::{EnvConfig, RuntimeFlags};

/// Errors raised by an agent slot while computing a step.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The dynamics integration produced an unusable state.
    #[error("dynamics failure for agent {agent_index}: {message}")]
    Dynamics {
        /// The agent whose step failed.
        agent_index: usize,
        /// Description of the failure.
        message: String,
    },

    /// The agent rejected the action it was given.
    #[error("agent {agent_index} rejected action: {message}")]
    InvalidAction {
        /// The agent that rejected the action.
        agent_index: usize,
        /// Description of what is wrong with the action.
        message: String,
    },
}

/// Reward-shaping and map options forwarded to every agent when it is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentOptions {
    /// Actions arrive normalized to `[-1, 1]`.
    pub expect_normalized_actions: bool,
    /// Reward reaching the goal first.
    pub incent_win: bool,
    /// Turn off the g-force penalty.
    pub disable_gforce_penalty: bool,
    /// Disallow negative acceleration.
    pub forbid_deceleration: bool,
    /// Ignore the brake action dimension.
    pub ignore_brake: bool,
    /// Discount factor for reward shaping.
    pub gamma: f64,
    /// Physics steps per emitted observation.
    pub physics_steps_per_observation: u32,
    /// Single-waypoint map is active.
    pub one_waypoint_map: bool,
    /// Two-agent intersection map is active.
    pub intersection_map: bool,
    /// Place a static obstacle.
    pub static_obstacle: bool,
}

impl AgentOptions {
    /// Derive agent options from the environment configuration and flags.
    pub const fn from_config(config: &EnvConfig, flags: &RuntimeFlags) -> Self {
        Self {
            expect_normalized_actions: config.expect_normalized_actions,
            incent_win: config.incent_win,
            disable_gforce_penalty: config.disable_gforce_penalty,
            forbid_deceleration: config.forbid_deceleration,
            ignore_brake: config.ignore_brake,
            gamma: config.gamma,
            physics_steps_per_observation: config.physics_steps_per_observation,
            one_waypoint_map: config.one_waypoint_map(flags),
            intersection_map: config.is_intersection_map,
            static_obstacle: config.add_static_obstacle,
        }
    }
}

/// One controllable vehicle, as seen by the stepping engine.
///
/// Implementations own the dynamics and reward computation. The engine
/// guarantees that `step` is only ever called for the agent whose turn it
/// is, and never concurrently.
pub trait AgentSlot {
    /// Start a new episode for this agent and return its first observation.
    fn reset(&mut self) -> Observation;

    /// Advance this agent by one observation step.
    ///
    /// `dt` is the simulated time delta in seconds for the tick and
    /// `collision` is the verdict of the collision gate for this tick.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the step cannot be computed. The engine
    /// contains the failure unless it runs in debug mode.
    fn step(
        &mut self,
        action: &Action,
        dt: f64,
        collision: &CollisionStatus,
    ) -> Result<StepOutcome, AgentError>;

    /// An all-zero observation with the same dimension as a real one.
    fn blank_observation(&self) -> Observation;

    /// Number of action dimensions this agent expects.
    fn num_actions(&self) -> usize;

    /// Current footprint of the vehicle, used by the collision gate.
    fn footprint(&self) -> Footprint;

    /// Footprint of the static obstacle this agent is checked against, if
    /// the map has one.
    fn static_obstacle(&self) -> Option<Footprint> {
        None
    }

    /// Reseed any stochastic element owned by the agent (e.g. map or
    /// obstacle placement).
    fn reseed(&mut self, _seed: u64) {}
}

/// An agent slot together with the last tuple it emitted.
#[derive(Debug)]
pub struct AgentRecord<A> {
    /// The collaborator.
    pub slot: A,
    /// The last `(observation, reward, done, info)` emitted for this agent.
    pub last: StepOutcome,
}

impl<A: AgentSlot> AgentRecord<A> {
    /// Wrap a slot with a blank stored tuple.
    pub fn new(slot: A) -> Self {
        let blank = slot.blank_observation();
        Self {
            slot,
            last: StepOutcome::fresh(blank),
        }
    }

    /// Reset the slot and store a fresh tuple carrying its new observation.
    /// Returns that observation.
    pub fn reset(&mut self) -> Observation {
        let observation = self.slot.reset();
        self.last = StepOutcome::fresh(observation.clone());
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingAgent {
        resets: u32,
    }

    impl AgentSlot for CountingAgent {
        fn reset(&mut self) -> Observation {
            self.resets = self.resets.saturating_add(1);
            Observation::from(vec![f64::from(self.resets), 0.0])
        }

        fn step(
            &mut self,
            _action: &Action,
            _dt: f64,
            _collision: &CollisionStatus,
        ) -> Result<StepOutcome, AgentError> {
            Ok(StepOutcome::fresh(self.blank_observation()))
        }

        fn blank_observation(&self) -> Observation {
            Observation::blank(2)
        }

        fn num_actions(&self) -> usize {
            2
        }

        fn footprint(&self) -> Footprint {
            Footprint::from_pose(0.0, 0.0, 0.0, 4.0, 2.0)
        }
    }

    #[test]
    fn record_starts_blank() {
        let record = AgentRecord::new(CountingAgent { resets: 0 });
        assert!(record.last.observation.is_blank());
        assert!(!record.last.done);
        assert_eq!(record.slot.resets, 0);
    }

    #[test]
    fn record_reset_stores_fresh_tuple() {
        let mut record = AgentRecord::new(CountingAgent { resets: 0 });
        record.last.done = true;
        let obs = record.reset();
        assert_eq!(obs.as_slice(), &[1.0, 0.0]);
        assert_eq!(record.last.observation, obs);
        assert!(!record.last.done);
    }

    #[test]
    fn options_follow_config_and_flags() {
        let config = EnvConfig {
            is_intersection_map: true,
            incent_win: true,
            ..EnvConfig::default()
        };
        let flags = RuntimeFlags {
            one_waypoint_map: true,
            ..RuntimeFlags::default()
        };
        let options = AgentOptions::from_config(&config, &flags);
        assert!(options.intersection_map);
        assert!(options.incent_win);
        assert!(options.one_waypoint_map);
        assert!(options.forbid_deceleration);
        assert_eq!(options.physics_steps_per_observation, 6);
    }
}
