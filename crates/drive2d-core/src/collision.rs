//! Collision gate: picks and runs the collision check for a tick.
//!
//! The gate holds no state. The [`CollisionMode`] is resolved once from the
//! configuration and runtime flags; each tick [`check`] dispatches on it and
//! hands the resulting [`CollisionStatus`] to the agent about to act.
//!
//! In [`CollisionMode::StaticObstacle`] the gate returns the verdict for the
//! first agent and never looks at the others, whatever the agent count.

use drive2d_types::{CollisionStatus, Footprint};
use tracing::debug;

use crate::agent::{AgentRecord, AgentSlot};
use crate::config::{EnvConfig, RuntimeFlags};

/// Errors raised by a collision detector.
#[derive(Debug, thiserror::Error)]
pub enum CollisionError {
    /// A footprint was degenerate or not finite.
    #[error("invalid footprint for agent {agent_index}: {reason}")]
    InvalidFootprint {
        /// The agent whose footprint is unusable.
        agent_index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The detector failed internally.
    #[error("collision detector failure: {message}")]
    Detector {
        /// Description of the failure.
        message: String,
    },
}

/// Which collision check runs each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionMode {
    /// Checking switched off by the runtime flag.
    Disabled,
    /// Each agent against its static obstacle, first agent's verdict wins.
    StaticObstacle,
    /// Every pair of agents against each other.
    Pairwise,
    /// No collision mode configured.
    Off,
}

impl CollisionMode {
    /// Resolve the mode. The disable flag wins, then the static obstacle,
    /// then the intersection map.
    pub const fn resolve(config: &EnvConfig, flags: &RuntimeFlags) -> Self {
        if flags.disable_collision_check {
            Self::Disabled
        } else if config.add_static_obstacle {
            Self::StaticObstacle
        } else if config.is_intersection_map {
            Self::Pairwise
        } else {
            Self::Off
        }
    }
}

/// Geometric collision routines.
pub trait CollisionDetector {
    /// Whether the ego vehicle touches the obstacle.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError`] if either footprint cannot be checked.
    fn ego_vs_obstacle(
        &self,
        agent_index: usize,
        ego: &Footprint,
        obstacle: &Footprint,
    ) -> Result<bool, CollisionError>;

    /// Index pairs `(i, j)` with `i < j` of footprints in contact.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError`] if any footprint cannot be checked.
    fn between(&self, footprints: &[Footprint]) -> Result<Vec<(usize, usize)>, CollisionError>;
}

/// Detector that compares axis-aligned bounds of the footprints.
///
/// Conservative: rotated vehicles may be reported in contact slightly
/// early.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxDetector;

impl BoundingBoxDetector {
    /// Create the detector.
    pub const fn new() -> Self {
        Self
    }
}

fn ensure_finite(agent_index: usize, footprint: &Footprint) -> Result<(), CollisionError> {
    if footprint.corners.iter().flatten().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CollisionError::InvalidFootprint {
            agent_index,
            reason: "corner coordinates must be finite".to_owned(),
        })
    }
}

impl CollisionDetector for BoundingBoxDetector {
    fn ego_vs_obstacle(
        &self,
        agent_index: usize,
        ego: &Footprint,
        obstacle: &Footprint,
    ) -> Result<bool, CollisionError> {
        ensure_finite(agent_index, ego)?;
        ensure_finite(agent_index, obstacle)?;
        Ok(ego.bounds().overlaps(&obstacle.bounds()))
    }

    fn between(&self, footprints: &[Footprint]) -> Result<Vec<(usize, usize)>, CollisionError> {
        let mut bounds = Vec::with_capacity(footprints.len());
        for (index, footprint) in footprints.iter().enumerate() {
            ensure_finite(index, footprint)?;
            bounds.push(footprint.bounds());
        }

        let mut pairs = Vec::new();
        for (i, a) in bounds.iter().enumerate() {
            for (offset, b) in bounds.iter().skip(i.saturating_add(1)).enumerate() {
                if a.overlaps(b) {
                    pairs.push((i, i.saturating_add(1).saturating_add(offset)));
                }
            }
        }
        Ok(pairs)
    }
}

/// Run the collision check selected by `mode` over `agents`.
///
/// # Errors
///
/// Returns [`CollisionError`] if the detector fails.
pub fn check<A: AgentSlot>(
    mode: CollisionMode,
    agents: &[AgentRecord<A>],
    detector: &dyn CollisionDetector,
) -> Result<CollisionStatus, CollisionError> {
    match mode {
        CollisionMode::Disabled | CollisionMode::Off => Ok(CollisionStatus::Unchecked),
        CollisionMode::StaticObstacle => check_static_obstacle(agents, detector),
        CollisionMode::Pairwise => check_pairwise(agents, detector),
    }
}

fn check_static_obstacle<A: AgentSlot>(
    agents: &[AgentRecord<A>],
    detector: &dyn CollisionDetector,
) -> Result<CollisionStatus, CollisionError> {
    // Only the first agent is checked, regardless of agent count.
    let Some(record) = agents.first() else {
        return Ok(CollisionStatus::Clear);
    };
    let Some(obstacle) = record.slot.static_obstacle() else {
        return Ok(CollisionStatus::Clear);
    };
    let hit = detector.ego_vs_obstacle(0, &record.slot.footprint(), &obstacle)?;
    debug!(agent_index = 0, hit, "Static obstacle check");
    Ok(if hit {
        CollisionStatus::Collision { agents: vec![0] }
    } else {
        CollisionStatus::Clear
    })
}

fn check_pairwise<A: AgentSlot>(
    agents: &[AgentRecord<A>],
    detector: &dyn CollisionDetector,
) -> Result<CollisionStatus, CollisionError> {
    let footprints: Vec<Footprint> = agents.iter().map(|r| r.slot.footprint()).collect();
    let pairs = detector.between(&footprints)?;
    if pairs.is_empty() {
        return Ok(CollisionStatus::Clear);
    }

    let mut involved: Vec<usize> = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
    involved.sort_unstable();
    involved.dedup();
    debug!(?involved, "Agents in contact");
    Ok(CollisionStatus::Collision { agents: involved })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use drive2d_types::{Action, Observation, StepOutcome};

    use super::*;
    use crate::agent::AgentError;

    struct ParkedAgent {
        x: f64,
        obstacle_x: Option<f64>,
    }

    impl AgentSlot for ParkedAgent {
        fn reset(&mut self) -> Observation {
            Observation::blank(1)
        }

        fn step(
            &mut self,
            _action: &Action,
            _dt: f64,
            _collision: &CollisionStatus,
        ) -> Result<StepOutcome, AgentError> {
            Ok(StepOutcome::fresh(Observation::blank(1)))
        }

        fn blank_observation(&self) -> Observation {
            Observation::blank(1)
        }

        fn num_actions(&self) -> usize {
            1
        }

        fn footprint(&self) -> Footprint {
            Footprint::from_pose(self.x, 0.0, 0.0, 4.0, 2.0)
        }

        fn static_obstacle(&self) -> Option<Footprint> {
            self.obstacle_x
                .map(|x| Footprint::from_pose(x, 0.0, 0.0, 1.0, 1.0))
        }
    }

    fn records(agents: Vec<ParkedAgent>) -> Vec<AgentRecord<ParkedAgent>> {
        agents.into_iter().map(AgentRecord::new).collect()
    }

    #[test]
    fn mode_resolution_precedence() {
        let both = EnvConfig {
            add_static_obstacle: true,
            is_intersection_map: true,
            ..EnvConfig::default()
        };
        let flags = RuntimeFlags::default();
        assert_eq!(CollisionMode::resolve(&both, &flags), CollisionMode::StaticObstacle);

        let disabled = RuntimeFlags {
            disable_collision_check: true,
            ..RuntimeFlags::default()
        };
        assert_eq!(CollisionMode::resolve(&both, &disabled), CollisionMode::Disabled);

        let intersection = EnvConfig {
            is_intersection_map: true,
            ..EnvConfig::default()
        };
        assert_eq!(
            CollisionMode::resolve(&intersection, &flags),
            CollisionMode::Pairwise
        );
        assert_eq!(
            CollisionMode::resolve(&EnvConfig::default(), &flags),
            CollisionMode::Off
        );
    }

    #[test]
    fn disabled_and_off_skip_the_detector() {
        let agents = records(vec![ParkedAgent { x: 0.0, obstacle_x: Some(0.0) }]);
        let detector = BoundingBoxDetector::new();
        for mode in [CollisionMode::Disabled, CollisionMode::Off] {
            let status = check(mode, &agents, &detector).unwrap();
            assert_eq!(status, CollisionStatus::Unchecked);
        }
    }

    #[test]
    fn static_obstacle_hit_and_miss() {
        let detector = BoundingBoxDetector::new();
        let hit = records(vec![ParkedAgent { x: 0.0, obstacle_x: Some(1.0) }]);
        assert_eq!(
            check(CollisionMode::StaticObstacle, &hit, &detector).unwrap(),
            CollisionStatus::Collision { agents: vec![0] }
        );

        let miss = records(vec![ParkedAgent { x: 0.0, obstacle_x: Some(20.0) }]);
        assert_eq!(
            check(CollisionMode::StaticObstacle, &miss, &detector).unwrap(),
            CollisionStatus::Clear
        );
    }

    #[test]
    fn static_obstacle_only_checks_first_agent() {
        let detector = BoundingBoxDetector::new();
        // Agent 1 sits on its obstacle, agent 0 is clear.
        let agents = records(vec![
            ParkedAgent { x: 0.0, obstacle_x: Some(50.0) },
            ParkedAgent { x: 10.0, obstacle_x: Some(10.0) },
        ]);
        let both = check(CollisionMode::StaticObstacle, &agents, &detector).unwrap();
        let first_only = check(CollisionMode::StaticObstacle, &agents[..1], &detector).unwrap();
        assert_eq!(both, first_only);
        assert_eq!(both, CollisionStatus::Clear);
    }

    #[test]
    fn pairwise_reports_involved_agents() {
        let detector = BoundingBoxDetector::new();
        let touching = records(vec![
            ParkedAgent { x: 0.0, obstacle_x: None },
            ParkedAgent { x: 3.0, obstacle_x: None },
        ]);
        assert_eq!(
            check(CollisionMode::Pairwise, &touching, &detector).unwrap(),
            CollisionStatus::Collision { agents: vec![0, 1] }
        );

        let apart = records(vec![
            ParkedAgent { x: 0.0, obstacle_x: None },
            ParkedAgent { x: 30.0, obstacle_x: None },
        ]);
        assert_eq!(
            check(CollisionMode::Pairwise, &apart, &detector).unwrap(),
            CollisionStatus::Clear
        );
    }

    #[test]
    fn between_lists_pairs_in_order() {
        let detector = BoundingBoxDetector::new();
        let footprints = [
            Footprint::from_pose(0.0, 0.0, 0.0, 4.0, 2.0),
            Footprint::from_pose(50.0, 0.0, 0.0, 4.0, 2.0),
            Footprint::from_pose(2.0, 0.0, 0.0, 4.0, 2.0),
        ];
        assert_eq!(detector.between(&footprints).unwrap(), vec![(0, 2)]);
    }

    #[test]
    fn non_finite_footprint_is_an_error() {
        let detector = BoundingBoxDetector::new();
        let agents = records(vec![
            ParkedAgent { x: f64::NAN, obstacle_x: None },
            ParkedAgent { x: 0.0, obstacle_x: None },
        ]);
        let result = check(CollisionMode::Pairwise, &agents, &detector);
        assert!(matches!(
            result,
            Err(CollisionError::InvalidFootprint { agent_index: 0, .. })
        ));
    }
}
