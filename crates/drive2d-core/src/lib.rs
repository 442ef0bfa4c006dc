//! Turn scheduling, timing, collision gating and episode control for the
//! drive2d stepping engine.
//!
//! This crate advances a multi-agent 2D vehicle simulation one tick at a
//! time. Control passes between agents in strict round-robin order, each
//! step is handed a simulated time delta and a collision verdict, and any
//! failure inside a tick ends the episode instead of the run.
//!
//! # Modules
//!
//! - [`agent`] -- [`AgentSlot`] trait toward the vehicle dynamics, and the
//!   per-agent stored tuple.
//! - [`collision`] -- Collision gate and the [`CollisionDetector`] trait.
//! - [`config`] -- Configuration loading from `drive2d-config.yaml` and
//!   runtime flags.
//! - [`episode`] -- [`Environment`]: reset, step, fault containment.
//! - [`policy`] -- [`Policy`] trait and [`ZeroPolicy`].
//! - [`runner`] -- Episode loop over an environment and a policy.
//! - [`sink`] -- [`FrameSink`] trait toward a visualization front-end.
//! - [`timing`] -- Time deltas, real-time pacing, and clocks.
//! - [`turn`] -- Round-robin turn cursor.
//!
//! [`AgentSlot`]: agent::AgentSlot
//! [`CollisionDetector`]: collision::CollisionDetector
//! [`Environment`]: episode::Environment
//! [`Policy`]: policy::Policy
//! [`ZeroPolicy`]: policy::ZeroPolicy
//! [`FrameSink`]: sink::FrameSink

pub mod agent;
pub mod collision;
pub mod config;
pub mod episode;
pub mod policy;
pub mod runner;
pub mod sink;
pub mod timing;
pub mod turn;
