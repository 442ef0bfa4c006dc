//! Frame sink that writes frames to the log instead of a window.
//!
//! Lets a headless host run with rendering and real-time pacing switched on,
//! for example to watch a run at wall-clock speed over SSH.

use drive2d_core::sink::{Frame, FrameSink, SinkError};
use tracing::{debug, info};

/// Logs a frame summary at `info` every `every` frames and at `debug`
/// otherwise.
#[derive(Debug)]
pub struct LogSink {
    every: u64,
    presented: u64,
}

impl LogSink {
    /// Create a sink that logs one in `every` frames at `info` level.
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
            presented: 0,
        }
    }

    /// Number of frames presented so far.
    pub const fn presented(&self) -> u64 {
        self.presented
    }
}

impl FrameSink for LogSink {
    fn present(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let due = self.presented.checked_rem(self.every) == Some(0);
        self.presented = self.presented.saturating_add(1);

        let positions: Vec<[f64; 2]> = frame
            .agents
            .iter()
            .map(|agent| {
                let bounds = agent.footprint.bounds();
                [
                    f64::midpoint(bounds.min_x, bounds.max_x),
                    f64::midpoint(bounds.min_y, bounds.max_y),
                ]
            })
            .collect();
        let rewards: Vec<f64> = frame.agents.iter().map(|agent| agent.reward).collect();

        if due {
            info!(
                total_steps = frame.total_steps,
                agent_index = frame.agent_index,
                ?positions,
                ?rewards,
                "Frame"
            );
        } else {
            debug!(
                total_steps = frame.total_steps,
                agent_index = frame.agent_index,
                ?positions,
                "Frame"
            );
        }
        Ok(())
    }

    fn close(&mut self) {
        info!(presented = self.presented, "Frame sink closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use drive2d_core::sink::AgentFrame;
    use drive2d_types::Footprint;

    use super::*;

    #[test]
    fn counts_presented_frames() {
        let mut sink = LogSink::new(0);
        let frame = Frame {
            total_steps: 1,
            episode_steps: 1,
            agent_index: 0,
            agents: vec![AgentFrame {
                footprint: Footprint::from_pose(1.0, 2.0, 0.0, 4.0, 2.0),
                obstacle: None,
                reward: 0.5,
                done: false,
            }],
        };
        sink.present(&frame).unwrap();
        sink.present(&frame).unwrap();
        sink.close();
        assert_eq!(sink.presented(), 2);
    }
}
