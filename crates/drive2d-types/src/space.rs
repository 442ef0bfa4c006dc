//! Observation and action vectors and the box spaces that bound them.
//!
//! Observations have a fixed dimensionality for the lifetime of an
//! environment. A *blank* observation is the all-zero vector of that
//! dimension; it stands in for real state before the first step and after a
//! contained fault.

use serde::{Deserialize, Serialize};

/// Per-dimension bound for actions when the environment expects normalized
/// input.
pub const NORMALIZED_ACTION_LIMIT: f64 = 1.0;

/// Per-dimension bound for actions expressed in physical units
/// (acceleration in m/s^2, steering in radians).
pub const PHYSICAL_ACTION_LIMIT: f64 = 10.2;

/// A fixed-dimension observation vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Observation(pub Vec<f64>);

impl Observation {
    /// Create an all-zero observation of the given dimension.
    pub fn blank(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Whether every component is exactly zero.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for Observation {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// One action, one value per action dimension.
///
/// For the reference vehicle the dimensions are steer, accel and brake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Action(pub Vec<f64>);

impl Action {
    /// Create an all-zero action of the given arity.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Number of action dimensions.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Component at `index`, if present.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }
}

impl From<Vec<f64>> for Action {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// A box-shaped space: `dim` components, each within `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    /// Lower bound shared by every component.
    pub low: f64,
    /// Upper bound shared by every component.
    pub high: f64,
    /// Number of components.
    pub dim: usize,
}

/// The space of valid actions.
pub type ActionSpace = BoxSpace;

/// The space of observations.
pub type ObservationSpace = BoxSpace;

impl BoxSpace {
    /// Actions bounded to `[-1, 1]` per dimension.
    pub const fn normalized_actions(dim: usize) -> Self {
        Self {
            low: -NORMALIZED_ACTION_LIMIT,
            high: NORMALIZED_ACTION_LIMIT,
            dim,
        }
    }

    /// Actions bounded to the physical accel/steer range.
    pub const fn physical_actions(dim: usize) -> Self {
        Self {
            low: -PHYSICAL_ACTION_LIMIT,
            high: PHYSICAL_ACTION_LIMIT,
            dim,
        }
    }

    /// An unbounded space, used for observations.
    pub const fn unbounded(dim: usize) -> Self {
        Self {
            low: f64::NEG_INFINITY,
            high: f64::INFINITY,
            dim,
        }
    }

    /// Whether `values` has the right dimension and lies within bounds.
    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.dim && values.iter().all(|v| *v >= self.low && *v <= self.high)
    }

    /// Clamp each component of `values` into bounds.
    pub fn clamp(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| v.clamp(self.low, self.high)).collect()
    }
}
