//! Episode controller: the environment's `reset` / `step` entry points.
//!
//! [`Environment`] owns every piece of mutable engine state: the agent
//! records, the episode counters, the turn cursor and the timing state. One
//! call to [`Environment::step`] runs one tick:
//!
//! 1. Record the step start time.
//! 2. Ask the [`TimingRegulator`] for the simulated delta.
//! 3. Run the collision gate.
//! 4. Step the agent under the turn cursor and store its tuple.
//! 5. Update the counters and advance the turn cursor.
//! 6. Read the tuple stored for the agent now under the cursor.
//! 7. While rendering: present a frame and pace the step.
//!
//! Any failure in that sequence, including a panic inside a collaborator,
//! ends the episode with a terminal tuple instead of escaping, unless the
//! debug flag is set. A failure before step 5 leaves the counters and the
//! cursor where they were.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use drive2d_types::{Action, ActionSpace, BoxSpace, Observation, ObservationSpace, StepOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{AgentError, AgentOptions, AgentRecord, AgentSlot};
use crate::collision::{self, CollisionDetector, CollisionError, CollisionMode};
use crate::config::{ConfigError, EnvConfig, RuntimeFlags};
use crate::sink::{AgentFrame, Frame, FrameSink, SinkError};
use crate::timing::{Clock, TimingError, TimingRegulator};
use crate::turn::TurnScheduler;

/// Errors that can occur during a single tick.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The acting agent failed.
    #[error("agent step failed: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: AgentError,
    },

    /// The collision check failed.
    #[error("collision check failed: {source}")]
    Collision {
        /// The underlying collision error.
        #[from]
        source: CollisionError,
    },

    /// Delta computation or pacing failed.
    #[error("timing failed: {source}")]
    Timing {
        /// The underlying timing error.
        #[from]
        source: TimingError,
    },

    /// The frame sink failed.
    #[error("frame sink failed: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: SinkError,
    },

    /// The action has the wrong number of dimensions.
    #[error("action has {got} dimensions, expected {expected}")]
    ActionShape {
        /// Action arity of the agents.
        expected: usize,
        /// Length of the action received.
        got: usize,
    },

    /// No agent exists at the index under the turn cursor.
    #[error("no agent at index {agent_index}")]
    UnknownAgent {
        /// The missing index.
        agent_index: usize,
    },

    /// A collaborator panicked during the tick.
    #[error("collaborator panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// A step counter would overflow.
    #[error("step counter overflow")]
    CounterOverflow,
}

/// Episode and run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EpisodeCounters {
    /// Steps since the last full reset.
    pub episode_steps: u64,
    /// Steps since the environment was built. Never decreases.
    pub total_steps: u64,
    /// Terminal signals seen since the last full reset.
    pub num_episodes: u64,
    /// Step budget of one episode.
    pub max_episode_steps: u64,
    /// Contained tick failures. Never decreases.
    pub faults: u64,
}

impl EpisodeCounters {
    /// Whether `episode_steps` has reached the step budget.
    pub const fn budget_exhausted(&self) -> bool {
        self.episode_steps >= self.max_episode_steps
    }
}

/// A multi-agent stepping environment.
pub struct Environment<A> {
    config: EnvConfig,
    flags: RuntimeFlags,
    agents: Vec<AgentRecord<A>>,
    counters: EpisodeCounters,
    turns: TurnScheduler,
    timing: TimingRegulator,
    collision_mode: CollisionMode,
    detector: Box<dyn CollisionDetector>,
    clock: Box<dyn Clock>,
    sink: Option<Box<dyn FrameSink>>,
    render_active: bool,
    rng: StdRng,
    num_actions: usize,
    observation_dim: usize,
}

impl<A: AgentSlot> Environment<A> {
    /// Build an environment.
    ///
    /// `factory` is called once per agent with the agent index and the
    /// options derived from `config` and `flags`. Every agent is then
    /// reseeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration is invalid or
    /// the agents disagree on their action arity or observation dimension.
    pub fn build<F>(
        config: EnvConfig,
        flags: RuntimeFlags,
        mut factory: F,
        detector: Box<dyn CollisionDetector>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut(usize, &AgentOptions) -> A,
    {
        let agent_count = config.validate()?;
        let max_episode_steps = config.max_episode_steps(&flags)?;
        let options = AgentOptions::from_config(&config, &flags);

        let agents: Vec<AgentRecord<A>> = (0..agent_count)
            .map(|index| AgentRecord::new(factory(index, &options)))
            .collect();

        let Some(first) = agents.first() else {
            return Err(ConfigError::Invalid {
                reason: "environment needs at least one agent".to_owned(),
            });
        };
        let num_actions = first.slot.num_actions();
        let observation_dim = first.slot.blank_observation().dim();
        for (index, record) in agents.iter().enumerate() {
            if record.slot.num_actions() != num_actions
                || record.slot.blank_observation().dim() != observation_dim
            {
                return Err(ConfigError::Invalid {
                    reason: format!("agent {index} disagrees with agent 0 on its spaces"),
                });
            }
        }

        let collision_mode = CollisionMode::resolve(&config, &flags);
        let timing = TimingRegulator::new(config.fps, config.decouple_step_time, agent_count);

        info!(
            agent_count,
            fps = config.fps,
            decouple = config.decouple_step_time,
            max_episode_steps,
            ?collision_mode,
            ?flags,
            "Environment built"
        );

        let mut env = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            flags,
            agents,
            counters: EpisodeCounters {
                max_episode_steps,
                ..EpisodeCounters::default()
            },
            turns: TurnScheduler::new(agent_count),
            timing,
            collision_mode,
            detector,
            clock,
            sink: None,
            render_active: false,
            num_actions,
            observation_dim,
        };
        let _ = env.seed(None);
        Ok(env)
    }

    /// Attach a visualization sink. Pacing starts on the next [`render`].
    ///
    /// [`render`]: Environment::render
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start an episode.
    ///
    /// Before the first step this resets every agent, zeroes the episode
    /// counters, rewinds the turn cursor and returns a blank observation.
    /// Afterwards it resets only the agent under the cursor and returns that
    /// agent's fresh observation; counters and other agents are untouched.
    pub fn reset(&mut self) -> Observation {
        if self.counters.total_steps == 0 {
            self.counters.episode_steps = 0;
            self.counters.num_episodes = 0;
            self.turns.rewind();
            for record in &mut self.agents {
                let _ = record.reset();
            }
            info!(agent_count = self.agents.len(), "Environment reset");
            return Observation::blank(self.observation_dim);
        }

        let agent_index = self.turns.current();
        match self.agents.get_mut(agent_index) {
            Some(record) => {
                let observation = record.reset();
                info!(
                    agent_index,
                    total_steps = self.counters.total_steps,
                    "Agent reset"
                );
                observation
            }
            None => Observation::blank(self.observation_dim),
        }
    }

    /// Run one tick, returning the tuple for the agent due next.
    ///
    /// Outside debug mode every failure, including a collaborator panic, is
    /// logged and turned into a terminal tuple: blank observation, `done`,
    /// empty info, and a reward of zero or the game-over penalty when loss
    /// penalization is on. This never returns `Err` unless the debug flag
    /// is set.
    ///
    /// # Errors
    ///
    /// In debug mode, returns the [`StepError`] of the failing stage.
    pub fn step(&mut self, action: &Action) -> Result<StepOutcome, StepError> {
        if self.flags.debug {
            return self.try_step(action);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.try_step(action)))
            .unwrap_or_else(|payload| {
                Err(StepError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        Ok(match result {
            Ok(outcome) => outcome,
            Err(err) => self.contain(&err),
        })
    }

    /// Run one tick without fault containment.
    ///
    /// # Errors
    ///
    /// Returns the [`StepError`] of the first stage that fails.
    pub fn try_step(&mut self, action: &Action) -> Result<StepOutcome, StepError> {
        if action.dim() != self.num_actions {
            return Err(StepError::ActionShape {
                expected: self.num_actions,
                got: action.dim(),
            });
        }

        let agent_index = self.turns.current();
        self.timing.begin_step(self.clock.as_ref());
        let dt = self.timing.delta(self.clock.as_ref())?;
        let collision = collision::check(self.collision_mode, &self.agents, self.detector.as_ref())?;

        let record = self
            .agents
            .get_mut(agent_index)
            .ok_or(StepError::UnknownAgent { agent_index })?;
        let outcome = record.slot.step(action, dt, &collision)?;
        let done = outcome.done;

        let total_steps = self
            .counters
            .total_steps
            .checked_add(1)
            .ok_or(StepError::CounterOverflow)?;
        let episode_steps = self
            .counters
            .episode_steps
            .checked_add(1)
            .ok_or(StepError::CounterOverflow)?;
        let num_episodes = if done {
            self.counters
                .num_episodes
                .checked_add(1)
                .ok_or(StepError::CounterOverflow)?
        } else {
            self.counters.num_episodes
        };

        record.last = outcome;
        self.counters.total_steps = total_steps;
        self.counters.episode_steps = episode_steps;
        self.counters.num_episodes = num_episodes;

        let next_index = self.turns.advance(total_steps);
        debug!(
            agent_index,
            next_index,
            total_steps,
            dt,
            done,
            collision = collision.is_collision(),
            "Tick complete"
        );
        if done {
            info!(agent_index, total_steps, num_episodes, "Agent finished episode");
        }

        let reported = self
            .agents
            .get(next_index)
            .ok_or(StepError::UnknownAgent {
                agent_index: next_index,
            })?
            .last
            .clone();

        if self.render_active {
            self.present_frame()?;
            let _ = self.timing.pace(self.clock.as_ref())?;
        }

        Ok(reported)
    }

    /// Reseed the environment and every agent. `None` uses the configured
    /// seed. Returns the seed used.
    pub fn seed(&mut self, seed: Option<u64>) -> u64 {
        let seed = seed.unwrap_or(self.config.seed);
        self.rng = StdRng::seed_from_u64(seed);
        for record in &mut self.agents {
            record.slot.reseed(self.rng.random::<u64>());
        }
        debug!(seed, "Environment seeded");
        seed
    }

    /// Bounds of a valid action.
    pub const fn action_space(&self) -> ActionSpace {
        if self.config.expect_normalized_actions {
            BoxSpace::normalized_actions(self.num_actions)
        } else {
            BoxSpace::physical_actions(self.num_actions)
        }
    }

    /// Bounds of an observation.
    pub const fn observation_space(&self) -> ObservationSpace {
        BoxSpace::unbounded(self.observation_dim)
    }

    /// Present the current state to the attached sink and pace every
    /// following step. Without a sink this does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the sink cannot present the frame.
    pub fn render(&mut self) -> Result<(), SinkError> {
        if self.sink.is_none() {
            debug!("Render requested without a frame sink");
            return Ok(());
        }
        if !self.render_active {
            info!("Rendering activated");
        }
        self.render_active = true;
        self.present_frame()
    }

    /// Close the attached sink and stop pacing.
    pub fn close(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.close();
        }
        if self.render_active {
            info!("Rendering closed");
        }
        self.render_active = false;
    }

    /// Index of the agent due to act.
    pub const fn agent_index(&self) -> usize {
        self.turns.current()
    }

    /// Current counters.
    pub const fn counters(&self) -> &EpisodeCounters {
        &self.counters
    }

    /// Construction parameters.
    pub const fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Runtime flags read at construction.
    pub const fn flags(&self) -> &RuntimeFlags {
        &self.flags
    }

    /// Number of agents.
    pub const fn agent_count(&self) -> usize {
        self.turns.agent_count()
    }

    /// Step budget of one episode.
    pub const fn max_episode_steps(&self) -> u64 {
        self.counters.max_episode_steps
    }

    /// Whether the steps since the last full reset reached the budget.
    pub const fn episode_budget_exhausted(&self) -> bool {
        self.counters.budget_exhausted()
    }

    /// Whether steps are being paced for a sink.
    pub const fn is_rendering(&self) -> bool {
        self.render_active
    }

    /// The timing regulator.
    pub const fn timing(&self) -> &TimingRegulator {
        &self.timing
    }

    /// The agent records, in index order.
    pub fn agents(&self) -> &[AgentRecord<A>] {
        &self.agents
    }

    fn present_frame(&mut self) -> Result<(), SinkError> {
        let frame = Frame {
            total_steps: self.counters.total_steps,
            episode_steps: self.counters.episode_steps,
            agent_index: self.turns.current(),
            agents: self
                .agents
                .iter()
                .map(|record| AgentFrame {
                    footprint: record.slot.footprint(),
                    obstacle: record.slot.static_obstacle(),
                    reward: record.last.reward,
                    done: record.last.done,
                })
                .collect(),
        };
        match self.sink.as_mut() {
            Some(sink) => sink.present(&frame),
            None => Ok(()),
        }
    }

    fn contain(&mut self, err: &StepError) -> StepOutcome {
        self.counters.faults = self.counters.faults.saturating_add(1);
        let reward = if self.flags.penalize_loss {
            self.config.game_over_penalty
        } else {
            0.0
        };
        warn!(
            agent_index = self.turns.current(),
            total_steps = self.counters.total_steps,
            faults = self.counters.faults,
            reward,
            %err,
            "Tick failed, ending episode"
        );
        StepOutcome::terminal(self.observation_dim, reward)
    }
}

impl<A> std::fmt::Debug for Environment<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("agent_count", &self.agents.len())
            .field("counters", &self.counters)
            .field("turns", &self.turns)
            .field("collision_mode", &self.collision_mode)
            .field("render_active", &self.render_active)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
