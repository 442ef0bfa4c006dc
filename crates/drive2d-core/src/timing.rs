//! Timing regulator: simulated time deltas and real-time pacing.
//!
//! The regulator has two independent duties:
//!
//! - **Delta** -- the simulated seconds an agent integrates over in one tick.
//!   With decoupled time every tick uses the fixed target duration
//!   (`1 / fps`), so physics is reproducible regardless of host jitter.
//!   Otherwise the delta is the wall-clock time since the previous request,
//!   and the first request falls back to the target duration.
//! - **Pacing** -- only while a visualization sink is active. After a step
//!   the calling thread sleeps so one tick takes roughly
//!   `target / agent_count` of wall time (all agents share one visual frame).
//!   The first paced call sleeps the full budget; later calls sleep
//!   `max(0, budget - elapsed)`. Drift beyond one step is not corrected.
//!
//! Time is read through the [`Clock`] trait so both duties can be tested
//! against a [`ManualClock`] without real sleeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Errors that can occur while computing deltas or pacing.
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    /// The clock reported a time earlier than a previous reading.
    #[error("clock went backwards: previous {previous:?}, now {now:?}")]
    ClockWentBackwards {
        /// The earlier reading.
        previous: Duration,
        /// The later, smaller reading.
        now: Duration,
    },

    /// The pacing budget could not be represented as a duration.
    #[error("invalid pacing budget: {seconds} s")]
    InvalidBudget {
        /// The offending budget in seconds.
        seconds: f64,
    },
}

/// A monotonic time source that can block the calling thread.
pub trait Clock {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Create a clock whose zero is now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Deterministic virtual time.
///
/// Clones share the same timeline, so a test can keep a handle while the
/// environment owns another. `sleep` advances virtual time instantly and
/// is recorded.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_nanos: Arc<AtomicU64>,
    slept_nanos: Arc<AtomicU64>,
    last_sleep_nanos: Arc<AtomicU64>,
    sleep_calls: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward.
    pub fn advance(&self, duration: Duration) {
        self.now_nanos
            .fetch_add(duration_to_nanos(duration), Ordering::SeqCst);
    }

    /// Total time spent in `sleep`.
    pub fn total_slept(&self) -> Duration {
        Duration::from_nanos(self.slept_nanos.load(Ordering::SeqCst))
    }

    /// Duration passed to the most recent `sleep`.
    pub fn last_sleep(&self) -> Duration {
        Duration::from_nanos(self.last_sleep_nanos.load(Ordering::SeqCst))
    }

    /// Number of `sleep` calls.
    pub fn sleep_calls(&self) -> u64 {
        self.sleep_calls.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        let nanos = duration_to_nanos(duration);
        self.now_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.slept_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.last_sleep_nanos.store(nanos, Ordering::SeqCst);
        self.sleep_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Per-environment timing state.
#[derive(Debug, Clone)]
pub struct TimingRegulator {
    /// Target tick duration in seconds, fixed at construction.
    target_dt: f64,
    /// Use `target_dt` as the delta regardless of wall time.
    decouple: bool,
    /// Agents sharing one visual frame.
    agent_count: u32,
    /// Clock reading at the previous delta request.
    last_step_at: Option<Duration>,
    /// Clock reading when the current step began.
    step_started_at: Option<Duration>,
    /// Wall-clock seconds between the last two delta requests.
    wall_dt: Option<f64>,
    /// Duration of the previous pacing sleep.
    last_sleep: Option<Duration>,
}

impl TimingRegulator {
    /// Create a regulator for `fps` ticks per second shared by
    /// `agent_count` agents.
    pub fn new(fps: u32, decouple: bool, agent_count: usize) -> Self {
        Self {
            target_dt: 1.0 / f64::from(fps.max(1)),
            decouple,
            agent_count: u32::try_from(agent_count.max(1)).unwrap_or(u32::MAX),
            last_step_at: None,
            step_started_at: None,
            wall_dt: None,
            last_sleep: None,
        }
    }

    /// Target tick duration in seconds.
    pub const fn target_dt(&self) -> f64 {
        self.target_dt
    }

    /// Whether simulated time is decoupled from the wall clock.
    pub const fn is_decoupled(&self) -> bool {
        self.decouple
    }

    /// Wall-clock seconds measured by the most recent delta request.
    pub const fn wall_dt(&self) -> Option<f64> {
        self.wall_dt
    }

    /// Duration of the most recent pacing sleep.
    pub const fn last_sleep(&self) -> Option<Duration> {
        self.last_sleep
    }

    /// Wall-time budget for one tick while pacing: target / agent count.
    pub fn pace_budget_seconds(&self) -> f64 {
        self.target_dt / f64::from(self.agent_count)
    }

    /// Record the start of a step.
    pub fn begin_step(&mut self, clock: &dyn Clock) {
        self.step_started_at = Some(clock.now());
    }

    /// Simulated delta for this tick, in seconds.
    ///
    /// Always refreshes the wall delta. Returns the target duration when
    /// decoupled, the wall delta otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::ClockWentBackwards`] if the clock reading is
    /// earlier than the previous one.
    pub fn delta(&mut self, clock: &dyn Clock) -> Result<f64, TimingError> {
        let now = clock.now();
        let wall_dt = match self.last_step_at {
            Some(previous) => now
                .checked_sub(previous)
                .ok_or(TimingError::ClockWentBackwards { previous, now })?
                .as_secs_f64(),
            None => self.target_dt,
        };
        self.wall_dt = Some(wall_dt);
        self.last_step_at = Some(now);
        Ok(if self.decouple { self.target_dt } else { wall_dt })
    }

    /// Sleep so the step that began at [`begin_step`] lasts about one
    /// budget. Returns the duration slept.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::InvalidBudget`] if the budget cannot be
    /// expressed as a [`Duration`].
    ///
    /// [`begin_step`]: TimingRegulator::begin_step
    pub fn pace(&mut self, clock: &dyn Clock) -> Result<Duration, TimingError> {
        let seconds = self.pace_budget_seconds();
        let budget = Duration::try_from_secs_f64(seconds)
            .map_err(|_err| TimingError::InvalidBudget { seconds })?;

        let sleep = if self.last_sleep.is_none() {
            budget
        } else {
            let elapsed = self
                .step_started_at
                .map_or(Duration::ZERO, |started| clock.now().saturating_sub(started));
            budget.saturating_sub(elapsed)
        };

        clock.sleep(sleep);
        self.last_sleep = Some(sleep);
        Ok(sleep)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn decoupled_delta_ignores_wall_time() {
        let clock = ManualClock::new();
        let mut timing = TimingRegulator::new(60, true, 1);

        for delay_ms in [0_u64, 500, 3, 1_000] {
            clock.advance(Duration::from_millis(delay_ms));
            let dt = timing.delta(&clock).unwrap();
            assert!(close(dt, 1.0 / 60.0));
        }
        // The wall delta is still tracked.
        assert!(close(timing.wall_dt().unwrap(), 1.0));
    }

    #[test]
    fn coupled_delta_follows_wall_time() {
        let clock = ManualClock::new();
        let mut timing = TimingRegulator::new(60, false, 1);

        let first = timing.delta(&clock).unwrap();
        assert!(close(first, 1.0 / 60.0));

        clock.advance(Duration::from_millis(25));
        let second = timing.delta(&clock).unwrap();
        assert!(close(second, 0.025));

        clock.advance(Duration::from_millis(40));
        let third = timing.delta(&clock).unwrap();
        assert!(close(third, 0.040));
    }

    #[test]
    fn coupled_delta_with_system_clock() {
        let clock = SystemClock::new();
        let mut timing = TimingRegulator::new(60, false, 1);
        let _ = timing.delta(&clock).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let dt = timing.delta(&clock).unwrap();
        assert!(dt >= 0.020);
        assert!(dt < 0.5);
    }

    #[test]
    fn first_pace_sleeps_full_budget() {
        let clock = ManualClock::new();
        let mut timing = TimingRegulator::new(50, true, 1);
        timing.begin_step(&clock);
        clock.advance(Duration::from_millis(5));
        let slept = timing.pace(&clock).unwrap();
        assert_eq!(slept, Duration::from_millis(20));
        assert_eq!(clock.sleep_calls(), 1);
    }

    #[test]
    fn later_paces_subtract_step_time() {
        let clock = ManualClock::new();
        let mut timing = TimingRegulator::new(50, true, 1);

        timing.begin_step(&clock);
        let _ = timing.pace(&clock).unwrap();

        timing.begin_step(&clock);
        clock.advance(Duration::from_millis(5));
        let slept = timing.pace(&clock).unwrap();
        assert_eq!(slept, Duration::from_millis(15));

        timing.begin_step(&clock);
        clock.advance(Duration::from_millis(30));
        let slept = timing.pace(&clock).unwrap();
        assert_eq!(slept, Duration::ZERO);
        assert_eq!(timing.last_sleep(), Some(Duration::ZERO));
    }

    #[test]
    fn pace_budget_is_shared_between_agents() {
        let clock = ManualClock::new();
        let mut timing = TimingRegulator::new(50, true, 2);
        assert!(close(timing.pace_budget_seconds(), 0.01));
        timing.begin_step(&clock);
        let slept = timing.pace(&clock).unwrap();
        assert_eq!(slept, Duration::from_millis(10));
    }

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        clock.sleep(Duration::from_millis(7));
        assert_eq!(handle.now(), Duration::from_millis(7));
        assert_eq!(handle.total_slept(), Duration::from_millis(7));
        assert_eq!(handle.last_sleep(), Duration::from_millis(7));
    }
}
