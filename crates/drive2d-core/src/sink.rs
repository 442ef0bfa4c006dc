//! Frame-paced output sink: the boundary toward any visualization front-end.
//!
//! The engine never draws. While rendering is active it hands a [`Frame`]
//! snapshot to the attached [`FrameSink`] after each step and then paces the
//! step in real time. Without a sink the scheduling and timing logic runs
//! headless.

use drive2d_types::Footprint;

/// Errors raised by a frame sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The front-end could not present the frame.
    #[error("frame presentation failed: {message}")]
    Present {
        /// Description of the failure.
        message: String,
    },
}

/// What one agent looks like in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFrame {
    /// Vehicle footprint.
    pub footprint: Footprint,
    /// Static obstacle footprint, if any.
    pub obstacle: Option<Footprint>,
    /// Reward in the agent's last stored tuple.
    pub reward: f64,
    /// Whether the agent's last stored tuple is terminal.
    pub done: bool,
}

/// Snapshot of the environment after a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Steps taken since the environment was built.
    pub total_steps: u64,
    /// Steps taken in the current episode.
    pub episode_steps: u64,
    /// Agent due to act next.
    pub agent_index: usize,
    /// One entry per agent, in index order.
    pub agents: Vec<AgentFrame>,
}

/// A visualization front-end.
pub trait FrameSink {
    /// Show one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the frame cannot be presented. During a
    /// step the failure is contained like any other tick fault.
    fn present(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Release front-end resources.
    fn close(&mut self) {}
}
