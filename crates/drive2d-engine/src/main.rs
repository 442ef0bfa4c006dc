//! Engine binary for the drive2d stepping engine.
//!
//! Wires the stepping engine to the reference vehicle and a built-in
//! policy, runs the configured number of episodes and logs a summary.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `drive2d-config.yaml` (or the path given as
//!    the first non-switch argument)
//! 2. Initialize structured logging (tracing)
//! 3. Read runtime flags from the command line and environment
//! 4. Build the environment with reference agents and the bounding-box
//!    collision detector
//! 5. Attach the log sink and start pacing if rendering is on
//! 6. Run the episode loop
//! 7. Log the run summary

mod error;
mod log_sink;
mod policy;
mod reference_agent;

use std::path::{Path, PathBuf};

use drive2d_core::collision::BoundingBoxDetector;
use drive2d_core::config::{EngineConfig, PolicyKind, RuntimeFlags};
use drive2d_core::episode::Environment;
use drive2d_core::policy::{Policy, ZeroPolicy};
use drive2d_core::runner::{self, NoOpCallback, RunSummary};
use drive2d_core::timing::SystemClock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::log_sink::LogSink;
use crate::policy::RandomPolicy;
use crate::reference_agent::PointMassAgent;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "drive2d-config.yaml";

/// Frames between `info`-level frame logs while rendering.
const FRAME_LOG_INTERVAL: u64 = 60;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, flag parsing or the run fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = config_path(std::env::args().skip(1));
    let (config, found) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("drive2d-engine starting");
    if found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    // 3. Runtime flags.
    let flags = RuntimeFlags::from_process()?;
    info!(?flags, "Runtime flags resolved");

    // 4-7.
    let summary = run(&config, flags)?;
    info!(summary = %serde_json::to_string(&summary)?, "drive2d-engine finished");
    Ok(())
}

/// First argument that is not a `--switch`, or the default path.
fn config_path<I>(args: I) -> PathBuf
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .find(|arg| !arg.starts_with("--"))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the configuration, falling back to defaults when the file is
/// missing. The flag reports whether the file was found.
fn load_config(path: &Path) -> Result<(EngineConfig, bool), EngineError> {
    if path.exists() {
        Ok((EngineConfig::from_file(path)?, true))
    } else {
        Ok((EngineConfig::default(), false))
    }
}

/// Build the environment and run the configured episodes.
fn run(config: &EngineConfig, flags: RuntimeFlags) -> Result<RunSummary, EngineError> {
    let mut env = Environment::build(
        config.env.clone(),
        flags,
        |index, options| PointMassAgent::new(index, *options),
        Box::new(BoundingBoxDetector::new()),
        Box::new(SystemClock::new()),
    )?;

    if config.run.render {
        env = env.with_sink(Box::new(LogSink::new(FRAME_LOG_INTERVAL)));
        env.render()?;
    }

    let mut policy: Box<dyn Policy> = match config.run.policy {
        PolicyKind::Zero => Box::new(ZeroPolicy::new(env.action_space().dim)),
        PolicyKind::Random => Box::new(RandomPolicy::new(env.action_space(), config.env.seed)),
    };
    info!(
        policy = ?config.run.policy,
        episodes = config.run.episodes,
        render = config.run.render,
        "Starting episodes"
    );

    let result = runner::run_episodes(&mut env, policy.as_mut(), config.run.episodes, &mut NoOpCallback);
    env.close();
    Ok(result?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_path_skips_switches() {
        let path = config_path(vec!["--no-timeout".to_owned(), "custom.yaml".to_owned()]);
        assert_eq!(path, PathBuf::from("custom.yaml"));
        assert_eq!(config_path(Vec::new()), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn short_run_completes() {
        let config = EngineConfig::parse(
            "env:\n  fps: 6\n  budget:\n    default_seconds: 2\nrun:\n  episodes: 2\n  policy: zero\n",
        )
        .unwrap();
        let summary = run(&config, RuntimeFlags::default()).unwrap();
        assert_eq!(summary.episodes, 2);
        assert_eq!(summary.faults, 0);
    }
}
