//! Configuration loading and typed config structures for the drive2d engine.
//!
//! The canonical configuration lives in `drive2d-config.yaml`. Every field
//! has a default, so an empty file (or no file) yields a usable setup.
//!
//! Two layers feed an environment:
//!
//! - [`EnvConfig`] -- construction parameters, immutable once the
//!   environment is built.
//! - [`RuntimeFlags`] -- process-wide switches read once from the command
//!   line and environment variables (disable timeout, one-waypoint map,
//!   disable collision check, penalize loss, debug).

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible environment.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// A runtime flag carried a value that is not a boolean.
    #[error("invalid value {value:?} for flag {name}")]
    InvalidFlag {
        /// The flag (environment variable) name.
        name: String,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Environment variable whose mere presence disables collision checking.
pub const DISABLE_COLLISION_CHECK_VAR: &str = "DISABLE_COLLISION_CHECK";

/// Environment variable that disables the episode timeout.
pub const NO_TIMEOUT_VAR: &str = "DRIVE2D_NO_TIMEOUT";

/// Environment variable that enables the one-waypoint map.
pub const ONE_WAYPOINT_MAP_VAR: &str = "DRIVE2D_ONE_WAYPOINT_MAP";

/// Environment variable that substitutes the game-over penalty for a zero
/// reward when a tick fails.
pub const PENALIZE_LOSS_VAR: &str = "DRIVE2D_PENALIZE_LOSS";

/// Environment variable that lets tick failures propagate.
pub const DEBUG_VAR: &str = "DRIVE2D_DEBUG";

/// Top-level engine configuration.
///
/// Mirrors the structure of `drive2d-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Environment construction parameters.
    #[serde(default)]
    pub env: EnvConfig,

    /// Run-loop parameters for the engine binary.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}

/// Environment construction parameters.
///
/// All units are SI (meters, seconds, radians) unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvConfig {
    /// Simulation ticks per second. The target tick duration is `1 / fps`.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Physics steps taken by an agent per observation it emits.
    #[serde(default = "default_physics_steps_per_observation")]
    pub physics_steps_per_observation: u32,

    /// Whether actions arrive normalized to `[-1, 1]` rather than in
    /// physical units.
    #[serde(default = "default_true")]
    pub expect_normalized_actions: bool,

    /// Whether the simulated delta is fixed to the target tick duration
    /// instead of following the wall clock.
    #[serde(default = "default_true")]
    pub decouple_step_time: bool,

    /// Two-agent intersection map. Determines the agent count.
    #[serde(default)]
    pub is_intersection_map: bool,

    /// Single-waypoint map with its own time budget.
    #[serde(default)]
    pub is_one_waypoint_map: bool,

    /// Place a static obstacle and check agents against it.
    #[serde(default)]
    pub add_static_obstacle: bool,

    /// Reward agents for reaching their goal first.
    #[serde(default)]
    pub incent_win: bool,

    /// Turn off the g-force penalty in the reward.
    #[serde(default)]
    pub disable_gforce_penalty: bool,

    /// Disallow negative acceleration.
    #[serde(default = "default_true")]
    pub forbid_deceleration: bool,

    /// Ignore the brake action dimension.
    #[serde(default = "default_true")]
    pub ignore_brake: bool,

    /// Discount factor forwarded to agents for reward shaping.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Seed for every stochastic element.
    #[serde(default)]
    pub seed: u64,

    /// Reward reported for a failed tick when loss penalization is on.
    #[serde(default = "default_game_over_penalty")]
    pub game_over_penalty: f64,

    /// Explicit agent count. When set it must agree with the map mode.
    #[serde(default)]
    pub agent_count: Option<usize>,

    /// Episode length budgets in seconds.
    #[serde(default)]
    pub budget: EpisodeBudgetConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            physics_steps_per_observation: default_physics_steps_per_observation(),
            expect_normalized_actions: true,
            decouple_step_time: true,
            is_intersection_map: false,
            is_one_waypoint_map: false,
            add_static_obstacle: false,
            incent_win: false,
            disable_gforce_penalty: false,
            forbid_deceleration: true,
            ignore_brake: true,
            gamma: default_gamma(),
            seed: 0,
            game_over_penalty: default_game_over_penalty(),
            agent_count: None,
            budget: EpisodeBudgetConfig::default(),
        }
    }
}

impl EnvConfig {
    /// Number of agents implied by the map mode: 2 on the intersection map,
    /// 1 otherwise.
    pub const fn mode_agent_count(&self) -> usize {
        if self.is_intersection_map { 2 } else { 1 }
    }

    /// Check the configuration and return the agent count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero frame rate, a zero
    /// physics ratio, a non-finite penalty or gamma, or an explicit agent
    /// count that disagrees with the map mode.
    pub fn validate(&self) -> Result<usize, ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::Invalid {
                reason: "fps must be at least 1".to_owned(),
            });
        }
        if self.physics_steps_per_observation == 0 {
            return Err(ConfigError::Invalid {
                reason: "physics_steps_per_observation must be at least 1".to_owned(),
            });
        }
        if !self.game_over_penalty.is_finite() {
            return Err(ConfigError::Invalid {
                reason: "game_over_penalty must be finite".to_owned(),
            });
        }
        if !self.gamma.is_finite() {
            return Err(ConfigError::Invalid {
                reason: "gamma must be finite".to_owned(),
            });
        }
        let expected = self.mode_agent_count();
        match self.agent_count {
            Some(requested) if requested != expected => Err(ConfigError::Invalid {
                reason: format!(
                    "agent_count {requested} does not match map mode \
                     (intersection map: {}, expects {expected})",
                    self.is_intersection_map
                ),
            }),
            _ => Ok(expected),
        }
    }

    /// Target duration of one tick in seconds (`1 / fps`).
    pub fn target_dt(&self) -> f64 {
        1.0 / f64::from(self.fps.max(1))
    }

    /// Whether the one-waypoint map is active, from either the config or the
    /// runtime flag.
    pub const fn one_waypoint_map(&self, flags: &RuntimeFlags) -> bool {
        self.is_one_waypoint_map || flags.one_waypoint_map
    }

    /// Episode length in seconds under the active flags.
    ///
    /// Precedence: disabled timeout, then the one-waypoint map, then the
    /// intersection map, then the default map.
    pub const fn episode_seconds(&self, flags: &RuntimeFlags) -> u64 {
        if flags.no_timeout {
            self.budget.no_timeout_seconds
        } else if self.one_waypoint_map(flags) {
            self.budget.one_waypoint_seconds
        } else if self.is_intersection_map {
            self.budget.intersection_seconds
        } else {
            self.budget.default_seconds
        }
    }

    /// Step budget for one episode:
    /// `seconds * fps / physics_steps_per_observation`.
    ///
    /// The division floors when the product is not a multiple of the
    /// physics ratio.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the product overflows or the
    /// physics ratio is zero.
    pub fn max_episode_steps(&self, flags: &RuntimeFlags) -> Result<u64, ConfigError> {
        self.episode_seconds(flags)
            .checked_mul(u64::from(self.fps))
            .and_then(|ticks| ticks.checked_div(u64::from(self.physics_steps_per_observation)))
            .ok_or_else(|| ConfigError::Invalid {
                reason: "episode step budget overflows or physics ratio is zero".to_owned(),
            })
    }
}

/// Episode length budgets, in seconds of simulated time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EpisodeBudgetConfig {
    /// Budget on the default map.
    #[serde(default = "default_episode_seconds")]
    pub default_seconds: u64,

    /// Budget on the intersection map.
    #[serde(default = "default_episode_seconds")]
    pub intersection_seconds: u64,

    /// Budget on the one-waypoint map (waypoint distance multiplier 0.5
    /// times 200 seconds).
    #[serde(default = "default_one_waypoint_seconds")]
    pub one_waypoint_seconds: u64,

    /// Budget when the episode timeout is disabled.
    #[serde(default = "default_no_timeout_seconds")]
    pub no_timeout_seconds: u64,
}

impl Default for EpisodeBudgetConfig {
    fn default() -> Self {
        Self {
            default_seconds: default_episode_seconds(),
            intersection_seconds: default_episode_seconds(),
            one_waypoint_seconds: default_one_waypoint_seconds(),
            no_timeout_seconds: default_no_timeout_seconds(),
        }
    }
}

/// Which built-in policy the engine binary drives the environment with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// All-zero actions.
    Zero,
    /// Uniform random actions within the action space.
    #[default]
    Random,
}

/// Run-loop parameters for the engine binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Number of episodes to run before exiting (0 = unlimited).
    #[serde(default = "default_episodes")]
    pub episodes: u64,

    /// Policy used to choose actions.
    #[serde(default)]
    pub policy: PolicyKind,

    /// Attach the log-backed frame sink and pace steps in real time.
    #[serde(default)]
    pub render: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            episodes: default_episodes(),
            policy: PolicyKind::default(),
            render: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set (trace, debug, info, warn,
    /// error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Process-wide switches, read once when an environment is built.
///
/// These are boundary configuration rather than part of the stepping
/// algorithm; they are kept separate from [`EnvConfig`] so the file-based
/// configuration stays reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeFlags {
    /// Use the no-timeout episode budget.
    pub no_timeout: bool,
    /// Force the one-waypoint map and its budget.
    pub one_waypoint_map: bool,
    /// Skip collision checks entirely (headless performance runs).
    pub disable_collision_check: bool,
    /// Report the game-over penalty instead of zero for a failed tick.
    pub penalize_loss: bool,
    /// Let tick failures propagate instead of ending the episode.
    pub debug: bool,
}

impl RuntimeFlags {
    /// Read flags from this process's arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFlag`] if a boolean environment
    /// variable holds an unrecognized value.
    pub fn from_process() -> Result<Self, ConfigError> {
        Self::from_sources(std::env::args().skip(1), |name| std::env::var(name).ok())
    }

    /// Read flags from explicit argument and environment sources.
    ///
    /// Recognized switches: `--no-timeout`, `--one-waypoint-map`,
    /// `--penalize-loss`, `--debug`. Recognized variables:
    /// [`DISABLE_COLLISION_CHECK_VAR`] (presence), and the boolean
    /// [`NO_TIMEOUT_VAR`], [`ONE_WAYPOINT_MAP_VAR`], [`PENALIZE_LOSS_VAR`],
    /// [`DEBUG_VAR`]. A switch or a true variable turns a flag on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFlag`] if a boolean variable holds an
    /// unrecognized value.
    pub fn from_sources<I, S, F>(args: I, lookup: F) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut flags = Self::default();
        for arg in args {
            match arg.as_ref() {
                "--no-timeout" => flags.no_timeout = true,
                "--one-waypoint-map" | "--one_waypoint_map" => flags.one_waypoint_map = true,
                "--penalize-loss" => flags.penalize_loss = true,
                "--debug" => flags.debug = true,
                _ => {}
            }
        }

        flags.disable_collision_check = lookup(DISABLE_COLLISION_CHECK_VAR).is_some();
        flags.no_timeout |= bool_var(&lookup, NO_TIMEOUT_VAR)?;
        flags.one_waypoint_map |= bool_var(&lookup, ONE_WAYPOINT_MAP_VAR)?;
        flags.penalize_loss |= bool_var(&lookup, PENALIZE_LOSS_VAR)?;
        flags.debug |= bool_var(&lookup, DEBUG_VAR)?;
        Ok(flags)
    }
}

/// Parse an optional boolean environment variable; unset means `false`.
fn bool_var<F>(lookup: &F, name: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(false);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name: name.to_owned(),
            value: raw,
        }),
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_fps() -> u32 {
    60
}

const fn default_physics_steps_per_observation() -> u32 {
    6
}

const fn default_gamma() -> f64 {
    0.99
}

const fn default_game_over_penalty() -> f64 {
    -1.0
}

const fn default_episode_seconds() -> u64 {
    60
}

const fn default_one_waypoint_seconds() -> u64 {
    100
}

const fn default_no_timeout_seconds() -> u64 {
    100_000
}

const fn default_episodes() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
