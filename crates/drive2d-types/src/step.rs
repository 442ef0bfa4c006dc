//! The result of one environment step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::space::Observation;

/// Auxiliary per-step information, keyed by name.
///
/// Collaborators use it to report episode diagnostics (e.g. why an episode
/// ended, distance to the waypoint, g-force) without widening the
/// observation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepInfo(pub BTreeMap<String, serde_json::Value>);

impl StepInfo {
    /// An empty info map.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a value, returning the previous value under that key.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// `(observation, reward, done, info)` produced for one agent by one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Observation for the agent this outcome is reported for.
    pub observation: Observation,
    /// Scalar reward.
    pub reward: f64,
    /// Whether the agent's episode ended.
    pub done: bool,
    /// Auxiliary information.
    pub info: StepInfo,
}

impl StepOutcome {
    /// Build an outcome from its parts.
    pub const fn new(observation: Observation, reward: f64, done: bool, info: StepInfo) -> Self {
        Self {
            observation,
            reward,
            done,
            info,
        }
    }

    /// A fresh, non-terminal outcome carrying `observation` with zero reward
    /// and empty info. Stored for an agent when it is reset.
    pub const fn fresh(observation: Observation) -> Self {
        Self::new(observation, 0.0, false, StepInfo::new())
    }

    /// The outcome reported when a tick fails: blank observation of `dim`
    /// components, `done = true`, the given reward and empty info.
    pub fn terminal(dim: usize, reward: f64) -> Self {
        Self::new(Observation::blank(dim), reward, true, StepInfo::new())
    }
}
