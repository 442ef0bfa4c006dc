//! Episode loop runner.
//!
//! [`run_episodes`] drives an [`Environment`] the way a training harness
//! would: reset, ask the [`Policy`] for the due agent's action, step, and
//! start a new episode for the due agent when its reported tuple is
//! terminal or the episode ran out of steps.
//!
//! The step budget is counted here, per episode, like a time-limit wrapper
//! around the environment. The environment's own `episode_steps` only
//! restarts at a full reset.

use chrono::{DateTime, Utc};
use drive2d_types::{RunId, StepOutcome};
use serde::Serialize;
use tracing::info;

use crate::agent::AgentSlot;
use crate::episode::{EpisodeCounters, Environment, StepError};
use crate::policy::Policy;

/// Errors that can occur during a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A step failed. Only possible in debug mode.
    #[error("step error: {source}")]
    Step {
        /// The underlying step error.
        #[from]
        source: StepError,
    },
}

/// How one episode ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    /// Zero-based episode number within the run.
    pub episode: u64,
    /// Agent whose terminal tuple (or budget) ended the episode.
    pub agent_index: usize,
    /// Steps taken in the episode.
    pub steps: u64,
    /// Sum of the rewards reported during the episode.
    pub total_reward: f64,
    /// Whether the step budget, rather than a terminal tuple, ended it.
    pub timed_out: bool,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Identifier of the run.
    pub run_id: RunId,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Episodes completed.
    pub episodes: u64,
    /// Steps taken during the run.
    pub total_steps: u64,
    /// Contained tick failures during the run.
    pub faults: u64,
    /// Mean of every reward reported during the run.
    pub mean_reward: f64,
}

/// Callback invoked as the run progresses.
pub trait EpisodeCallback {
    /// Called after every step with the reported tuple, the agent it
    /// belongs to and the environment counters.
    fn on_tick(&mut self, agent_index: usize, outcome: &StepOutcome, counters: &EpisodeCounters);

    /// Called when an episode ends.
    fn on_episode_end(&mut self, _summary: &EpisodeSummary) {}
}

/// A no-op callback.
pub struct NoOpCallback;

impl EpisodeCallback for NoOpCallback {
    fn on_tick(&mut self, _agent_index: usize, _outcome: &StepOutcome, _counters: &EpisodeCounters) {}
}

/// Run `max_episodes` episodes (0 runs forever).
///
/// # Errors
///
/// Returns [`RunnerError`] if a step fails while the environment runs in
/// debug mode.
pub fn run_episodes<A: AgentSlot>(
    env: &mut Environment<A>,
    policy: &mut dyn Policy,
    max_episodes: u64,
    callback: &mut dyn EpisodeCallback,
) -> Result<RunSummary, RunnerError> {
    let run_id = RunId::new();
    let started_at = Utc::now();
    let start_counters = *env.counters();

    info!(
        %run_id,
        max_episodes,
        agent_count = env.agent_count(),
        max_episode_steps = env.max_episode_steps(),
        "Run starting"
    );

    let mut observation = env.reset();
    let mut episodes: u64 = 0;
    let mut episode_steps: u64 = 0;
    let mut episode_reward = 0.0;
    let mut reward_sum = 0.0;
    let mut reward_samples = 0.0;

    while max_episodes == 0 || episodes < max_episodes {
        let acting = env.agent_index();
        let action = policy.act(acting, &observation);
        let outcome = env.step(&action)?;

        let reporting = env.agent_index();
        episode_steps = episode_steps.saturating_add(1);
        episode_reward += outcome.reward;
        reward_sum += outcome.reward;
        reward_samples += 1.0;
        callback.on_tick(reporting, &outcome, env.counters());

        let timed_out = !outcome.done && episode_steps >= env.max_episode_steps();
        if outcome.done || timed_out {
            let summary = EpisodeSummary {
                episode: episodes,
                agent_index: reporting,
                steps: episode_steps,
                total_reward: episode_reward,
                timed_out,
            };
            info!(
                episode = summary.episode,
                agent_index = summary.agent_index,
                steps = summary.steps,
                total_reward = summary.total_reward,
                timed_out,
                "Episode ended"
            );
            callback.on_episode_end(&summary);

            episodes = episodes.saturating_add(1);
            episode_steps = 0;
            episode_reward = 0.0;
            observation = env.reset();
        } else {
            observation = outcome.observation;
        }
    }

    let end_counters = *env.counters();
    let summary = RunSummary {
        run_id,
        started_at,
        ended_at: Utc::now(),
        episodes,
        total_steps: end_counters
            .total_steps
            .saturating_sub(start_counters.total_steps),
        faults: end_counters.faults.saturating_sub(start_counters.faults),
        mean_reward: if reward_samples > 0.0 {
            reward_sum / reward_samples
        } else {
            0.0
        },
    };

    info!(
        %run_id,
        episodes = summary.episodes,
        total_steps = summary.total_steps,
        faults = summary.faults,
        mean_reward = summary.mean_reward,
        "Run complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use drive2d_types::{Action, CollisionStatus, Footprint, Observation};

    use super::*;
    use crate::agent::AgentError;
    use crate::collision::BoundingBoxDetector;
    use crate::config::{EnvConfig, RuntimeFlags};
    use crate::policy::ZeroPolicy;
    use crate::timing::ManualClock;

    /// Finishes after a fixed number of its own steps.
    struct CountdownAgent {
        remaining: u32,
        length: u32,
        fail: bool,
    }

    impl AgentSlot for CountdownAgent {
        fn reset(&mut self) -> Observation {
            self.remaining = self.length;
            Observation::blank(1)
        }

        fn step(
            &mut self,
            _action: &Action,
            _dt: f64,
            _collision: &CollisionStatus,
        ) -> Result<StepOutcome, AgentError> {
            if self.fail {
                return Err(AgentError::Dynamics {
                    agent_index: 0,
                    message: "always fails".to_owned(),
                });
            }
            self.remaining = self.remaining.saturating_sub(1);
            Ok(StepOutcome::new(
                Observation::from(vec![f64::from(self.remaining)]),
                1.0,
                self.remaining == 0,
                drive2d_types::StepInfo::new(),
            ))
        }

        fn blank_observation(&self) -> Observation {
            Observation::blank(1)
        }

        fn num_actions(&self) -> usize {
            1
        }

        fn footprint(&self) -> Footprint {
            Footprint::from_pose(0.0, 0.0, 0.0, 4.0, 2.0)
        }
    }

    struct Recorder {
        ticks: u64,
        ended: Vec<EpisodeSummary>,
    }

    impl EpisodeCallback for Recorder {
        fn on_tick(&mut self, _agent_index: usize, _outcome: &StepOutcome, _counters: &EpisodeCounters) {
            self.ticks = self.ticks.saturating_add(1);
        }

        fn on_episode_end(&mut self, summary: &EpisodeSummary) {
            self.ended.push(summary.clone());
        }
    }

    fn env_with(config: EnvConfig, flags: RuntimeFlags, length: u32, fail: bool) -> Environment<CountdownAgent> {
        Environment::build(
            config,
            flags,
            |_, _| CountdownAgent {
                remaining: length,
                length,
                fail,
            },
            Box::new(BoundingBoxDetector::new()),
            Box::new(ManualClock::new()),
        )
        .unwrap()
    }

    #[test]
    fn runs_requested_episodes() {
        let mut env = env_with(EnvConfig::default(), RuntimeFlags::default(), 3, false);
        let mut recorder = Recorder {
            ticks: 0,
            ended: Vec::new(),
        };
        let summary =
            run_episodes(&mut env, &mut ZeroPolicy::new(1), 4, &mut recorder).unwrap();

        assert_eq!(summary.episodes, 4);
        assert_eq!(summary.total_steps, 12);
        assert_eq!(summary.faults, 0);
        assert!((summary.mean_reward - 1.0).abs() < 1e-12);
        assert_eq!(recorder.ticks, 12);
        assert_eq!(recorder.ended.len(), 4);
        assert!(recorder.ended.iter().all(|e| e.steps == 3 && !e.timed_out));
        assert!(summary.ended_at >= summary.started_at);
    }

    #[test]
    fn budget_ends_long_episodes() {
        // 1 s * 6 fps / 6 = 1 step per episode.
        let config = EnvConfig {
            fps: 6,
            budget: crate::config::EpisodeBudgetConfig {
                default_seconds: 1,
                ..crate::config::EpisodeBudgetConfig::default()
            },
            ..EnvConfig::default()
        };
        let mut env = env_with(config, RuntimeFlags::default(), 100, false);
        let mut recorder = Recorder {
            ticks: 0,
            ended: Vec::new(),
        };
        let summary =
            run_episodes(&mut env, &mut ZeroPolicy::new(1), 2, &mut recorder).unwrap();
        assert_eq!(summary.total_steps, 2);
        assert!(recorder.ended.iter().all(|e| e.timed_out && e.steps == 1));
    }

    #[test]
    fn contained_faults_end_episodes() {
        let mut env = env_with(EnvConfig::default(), RuntimeFlags::default(), 3, true);
        let summary =
            run_episodes(&mut env, &mut ZeroPolicy::new(1), 3, &mut NoOpCallback).unwrap();
        assert_eq!(summary.episodes, 3);
        assert_eq!(summary.faults, 3);
        assert_eq!(summary.total_steps, 0);
    }

    #[test]
    fn debug_faults_abort_the_run() {
        let flags = RuntimeFlags {
            debug: true,
            ..RuntimeFlags::default()
        };
        let mut env = env_with(EnvConfig::default(), flags, 3, true);
        let result = run_episodes(&mut env, &mut ZeroPolicy::new(1), 3, &mut NoOpCallback);
        assert!(matches!(result, Err(RunnerError::Step { .. })));
    }
}
