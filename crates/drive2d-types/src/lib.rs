//! Shared type definitions for the drive2d stepping engine.
//!
//! This crate holds the values that cross the boundary between the stepping
//! engine and its collaborators (vehicle dynamics, collision geometry,
//! visualization) and the training loop that drives it.
//!
//! # Modules
//!
//! - [`ids`] -- Run identifier
//! - [`space`] -- Observations, actions, and their bounding boxes
//! - [`step`] -- The `(observation, reward, done, info)` step outcome
//! - [`collision`] -- Vehicle footprints and collision verdicts

pub mod collision;
pub mod ids;
pub mod space;
pub mod step;

pub use collision::{Bounds, CollisionStatus, Footprint};
pub use ids::RunId;
pub use space::{Action, ActionSpace, BoxSpace, Observation, ObservationSpace};
pub use step::{StepInfo, StepOutcome};
