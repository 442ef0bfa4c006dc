//! Turn scheduler: round-robin over agents with a one-tick reporting lag.
//!
//! The cursor names the agent that receives the next action. After every
//! step it becomes `total_steps % agent_count`, and the tuple returned to
//! the caller is the one stored for the agent now under the cursor, which
//! is not the agent that was just stepped (unless there is only one).
//!
//! With two agents:
//!
//! ```text
//! reset()             -> blank            cursor 0
//! step(a0) steps 0    -> tuple of agent 1 cursor 1  (agent 1's fresh reset tuple)
//! step(a1) steps 1    -> tuple of agent 0 cursor 0  (computed from a0)
//! step(a2) steps 0    -> tuple of agent 1 cursor 1  (computed from a1)
//! ```
//!
//! Each agent's observation -> inference -> action loop therefore lines up:
//! the caller always feeds the model the observation of the agent it is
//! about to act for. With one agent this is the ordinary feedback loop.

/// The turn cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnScheduler {
    cursor: usize,
    agent_count: usize,
}

impl TurnScheduler {
    /// Create a scheduler for `agent_count` agents with the cursor at 0.
    pub const fn new(agent_count: usize) -> Self {
        Self {
            cursor: 0,
            agent_count: if agent_count == 0 { 1 } else { agent_count },
        }
    }

    /// Index of the agent due to act.
    pub const fn current(&self) -> usize {
        self.cursor
    }

    /// Number of agents in the rotation.
    pub const fn agent_count(&self) -> usize {
        self.agent_count
    }

    /// Move the cursor to `total_steps % agent_count` and return it.
    pub const fn advance(&mut self, total_steps: u64) -> usize {
        self.cursor = rotation_index(total_steps, self.agent_count);
        self.cursor
    }

    /// Put the cursor back on agent 0.
    pub const fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// `total_steps % agent_count` computed without lossy casts.
const fn rotation_index(total_steps: u64, agent_count: usize) -> usize {
    // usize is at most 64 bits on supported targets, so the count fits.
    let count = agent_count as u64;
    match total_steps.checked_rem(count) {
        // index < count <= usize::MAX
        Some(index) => index as usize,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_agent_stays_on_zero() {
        let mut turns = TurnScheduler::new(1);
        for total in 1..10 {
            assert_eq!(turns.advance(total), 0);
        }
    }

    #[test]
    fn two_agents_alternate() {
        let mut turns = TurnScheduler::new(2);
        assert_eq!(turns.current(), 0);
        let seen: Vec<usize> = (1..=6).map(|total| turns.advance(total)).collect();
        assert_eq!(seen, vec![1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn cursor_is_total_steps_mod_n() {
        for n in 1..=4 {
            let mut turns = TurnScheduler::new(n);
            for total in 0..40_u64 {
                let cursor = turns.advance(total);
                assert_eq!(cursor as u64, total % n as u64);
                assert!(cursor < n);
            }
        }
    }

    #[test]
    fn rewind_returns_to_first_agent() {
        let mut turns = TurnScheduler::new(2);
        let _ = turns.advance(3);
        assert_eq!(turns.current(), 1);
        turns.rewind();
        assert_eq!(turns.current(), 0);
    }

    #[test]
    fn zero_agents_treated_as_one() {
        let turns = TurnScheduler::new(0);
        assert_eq!(turns.agent_count(), 1);
    }
}
