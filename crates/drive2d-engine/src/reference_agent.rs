//! Reference vehicle: a kinematic bicycle chasing a list of waypoints.
//!
//! Good enough to exercise the stepping engine end to end. It honors every
//! [`AgentOptions`] flag but makes no claim to physical accuracy.

use std::f64::consts::{FRAC_PI_2, PI};

use drive2d_core::agent::{AgentError, AgentOptions, AgentSlot};
use drive2d_types::space::PHYSICAL_ACTION_LIMIT;
use drive2d_types::{Action, CollisionStatus, Footprint, Observation, StepInfo, StepOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Steering, throttle, brake.
const ACTION_DIM: usize = 3;
const OBSERVATION_DIM: usize = 6;

const VEHICLE_LENGTH: f64 = 4.5;
const VEHICLE_WIDTH: f64 = 1.8;
const WHEELBASE: f64 = 2.7;
const MAX_STEER: f64 = 0.5;
const MAX_ACCEL: f64 = 4.0;
const MAX_BRAKE: f64 = 8.0;
const MAX_SPEED: f64 = 30.0;
const GRAVITY: f64 = 9.81;

const WAYPOINT_RADIUS: f64 = 2.0;
const WAYPOINT_COUNT: usize = 5;
const ONE_WAYPOINT_DISTANCE: f64 = 50.0;
const INTERSECTION_HALF_SPAN: f64 = 40.0;
const OBSTACLE_SIZE: f64 = 2.0;

const WAYPOINT_BONUS: f64 = 1.0;
const WIN_BONUS: f64 = 10.0;
const COLLISION_PENALTY: f64 = 1.0;
const GFORCE_THRESHOLD: f64 = 0.4;
const GFORCE_WEIGHT: f64 = 0.5;
const OBSERVATION_DISTANCE_SCALE: f64 = 100.0;

/// A point-mass vehicle with bicycle steering.
#[derive(Debug)]
pub struct PointMassAgent {
    index: usize,
    options: AgentOptions,
    rng: StdRng,
    x: f64,
    y: f64,
    heading: f64,
    speed: f64,
    waypoints: Vec<[f64; 2]>,
    reached: usize,
    obstacle: Option<[f64; 2]>,
}

impl PointMassAgent {
    /// Create agent `index` with the given options.
    pub fn new(index: usize, options: AgentOptions) -> Self {
        let mut agent = Self {
            index,
            options,
            rng: StdRng::seed_from_u64(u64::try_from(index).unwrap_or_default()),
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            speed: 0.0,
            waypoints: Vec::new(),
            reached: 0,
            obstacle: None,
        };
        agent.place();
        agent
    }

    /// Put the vehicle on its start pose and lay out a new route.
    fn place(&mut self) {
        self.speed = 0.0;
        self.reached = 0;

        if self.options.intersection_map {
            // Agent 0 drives west to east, agent 1 south to north.
            let (start, heading, goal) = if self.index == 0 {
                ([-INTERSECTION_HALF_SPAN, 0.0], 0.0, [INTERSECTION_HALF_SPAN, 0.0])
            } else {
                ([0.0, -INTERSECTION_HALF_SPAN], FRAC_PI_2, [0.0, INTERSECTION_HALF_SPAN])
            };
            self.x = start[0];
            self.y = start[1];
            self.heading = heading;
            self.waypoints = vec![goal];
        } else {
            self.x = 0.0;
            self.y = 0.0;
            self.heading = 0.0;
            self.waypoints = if self.options.one_waypoint_map {
                let angle = self.rng.random_range(-0.5..=0.5);
                vec![[
                    ONE_WAYPOINT_DISTANCE * f64::cos(angle),
                    ONE_WAYPOINT_DISTANCE * f64::sin(angle),
                ]]
            } else {
                self.random_route()
            };
        }

        self.obstacle = if self.options.static_obstacle {
            self.waypoints
                .first()
                .map(|goal| [(self.x + goal[0]) / 2.0, (self.y + goal[1]) / 2.0])
        } else {
            None
        };
    }

    fn random_route(&mut self) -> Vec<[f64; 2]> {
        let mut route = Vec::with_capacity(WAYPOINT_COUNT);
        let (mut x, mut y, mut heading) = (self.x, self.y, self.heading);
        for _ in 0..WAYPOINT_COUNT {
            heading += self.rng.random_range(-PI / 4.0..=PI / 4.0);
            let distance = self.rng.random_range(20.0..=40.0);
            x += distance * heading.cos();
            y += distance * heading.sin();
            route.push([x, y]);
        }
        route
    }

    fn target(&self) -> Option<[f64; 2]> {
        self.waypoints.get(self.reached).copied()
    }

    fn distance_to_target(&self) -> f64 {
        self.target()
            .map_or(0.0, |[tx, ty]| (tx - self.x).hypot(ty - self.y))
    }

    fn observe(&self) -> Observation {
        let (dx, dy) = self.target().map_or((0.0, 0.0), |[tx, ty]| {
            let (sin, cos) = self.heading.sin_cos();
            let (wx, wy) = (tx - self.x, ty - self.y);
            // Rotate into the vehicle frame.
            (wx * cos + wy * sin, -wx * sin + wy * cos)
        });
        let remaining = self.waypoints.len().saturating_sub(self.reached);
        let remaining_fraction = if self.waypoints.is_empty() {
            0.0
        } else {
            count_as_f64(remaining) / count_as_f64(self.waypoints.len())
        };
        Observation::from(vec![
            self.speed / MAX_SPEED,
            self.heading.sin(),
            self.heading.cos(),
            dx / OBSERVATION_DISTANCE_SCALE,
            dy / OBSERVATION_DISTANCE_SCALE,
            remaining_fraction,
        ])
    }

    /// Map an action onto unit steering, throttle and brake commands.
    fn controls(&self, action: &Action) -> Result<(f64, f64, f64), AgentError> {
        let mut unit = [0.0; ACTION_DIM];
        for (slot, value) in unit.iter_mut().zip(action.as_slice()) {
            if !value.is_finite() {
                return Err(AgentError::InvalidAction {
                    agent_index: self.index,
                    message: format!("non-finite action component {value}"),
                });
            }
            let scaled = if self.options.expect_normalized_actions {
                *value
            } else {
                value / PHYSICAL_ACTION_LIMIT
            };
            *slot = scaled.clamp(-1.0, 1.0);
        }
        let [steer, mut throttle, brake] = unit;
        if self.options.forbid_deceleration {
            throttle = throttle.max(0.0);
        }
        let brake = if self.options.ignore_brake {
            0.0
        } else {
            brake.max(0.0)
        };
        Ok((steer, throttle, brake))
    }
}

impl AgentSlot for PointMassAgent {
    fn reset(&mut self) -> Observation {
        self.place();
        self.observe()
    }

    fn step(
        &mut self,
        action: &Action,
        dt: f64,
        collision: &CollisionStatus,
    ) -> Result<StepOutcome, AgentError> {
        let (steer, throttle, brake) = self.controls(action)?;
        let before = self.distance_to_target();

        let substeps = self.options.physics_steps_per_observation.max(1);
        let sub_dt = dt / f64::from(substeps);
        let steer_angle = steer * MAX_STEER;
        let accel = throttle.mul_add(MAX_ACCEL, -brake * MAX_BRAKE);
        let mut peak_g: f64 = 0.0;
        for _ in 0..substeps {
            self.speed = accel.mul_add(sub_dt, self.speed).clamp(0.0, MAX_SPEED);
            let yaw_rate = self.speed * steer_angle.tan() / WHEELBASE;
            self.heading += yaw_rate * sub_dt;
            self.x += self.speed * self.heading.cos() * sub_dt;
            self.y += self.speed * self.heading.sin() * sub_dt;
            let g = (self.speed * yaw_rate).hypot(accel) / GRAVITY;
            peak_g = peak_g.max(g);
        }

        if !(self.x.is_finite() && self.y.is_finite() && self.heading.is_finite()) {
            return Err(AgentError::Dynamics {
                agent_index: self.index,
                message: "vehicle state is no longer finite".to_owned(),
            });
        }

        let after = self.distance_to_target();
        // Potential-based progress shaping.
        let mut reward = self.options.gamma.mul_add(-after, before);
        if !self.options.disable_gforce_penalty {
            reward -= GFORCE_WEIGHT * (peak_g - GFORCE_THRESHOLD).max(0.0);
        }

        let mut done = false;
        if after < WAYPOINT_RADIUS && self.target().is_some() {
            reward += WAYPOINT_BONUS;
            self.reached = self.reached.saturating_add(1);
            if self.reached >= self.waypoints.len() {
                done = true;
                if self.options.incent_win {
                    reward += WIN_BONUS;
                }
            }
        }

        let collided = collision.involves(self.index);
        if collided {
            reward -= COLLISION_PENALTY;
            done = true;
        }

        let mut info = StepInfo::new();
        info.insert("waypoints_reached", self.reached);
        info.insert("collided", collided);
        info.insert("peak_g", peak_g);

        Ok(StepOutcome::new(self.observe(), reward, done, info))
    }

    fn blank_observation(&self) -> Observation {
        Observation::blank(OBSERVATION_DIM)
    }

    fn num_actions(&self) -> usize {
        ACTION_DIM
    }

    fn footprint(&self) -> Footprint {
        Footprint::from_pose(self.x, self.y, self.heading, VEHICLE_LENGTH, VEHICLE_WIDTH)
    }

    fn static_obstacle(&self) -> Option<Footprint> {
        self.obstacle
            .map(|[x, y]| Footprint::from_pose(x, y, 0.0, OBSTACLE_SIZE, OBSTACLE_SIZE))
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

/// Small counts as floats; anything past `u32::MAX` saturates.
fn count_as_f64(count: usize) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use drive2d_core::config::{EnvConfig, RuntimeFlags};

    use super::*;

    fn options(config: &EnvConfig) -> AgentOptions {
        AgentOptions::from_config(config, &RuntimeFlags::default())
    }

    #[test]
    fn throttle_moves_forward() {
        let mut agent = PointMassAgent::new(0, options(&EnvConfig::default()));
        let _ = agent.reset();
        for _ in 0..30 {
            let _ = agent
                .step(&Action::from(vec![0.0, 1.0, 0.0]), 0.1, &CollisionStatus::Unchecked)
                .unwrap();
        }
        assert!(agent.x > 1.0);
        assert!(agent.speed > 0.0);
    }

    #[test]
    fn forbidden_deceleration_keeps_speed() {
        let mut agent = PointMassAgent::new(0, options(&EnvConfig::default()));
        let _ = agent.reset();
        let _ = agent
            .step(&Action::from(vec![0.0, 1.0, 0.0]), 0.5, &CollisionStatus::Unchecked)
            .unwrap();
        let speed = agent.speed;
        let _ = agent
            .step(&Action::from(vec![0.0, -1.0, 1.0]), 0.5, &CollisionStatus::Unchecked)
            .unwrap();
        assert!(agent.speed >= speed);
    }

    #[test]
    fn collision_ends_the_episode() {
        let mut agent = PointMassAgent::new(0, options(&EnvConfig::default()));
        let _ = agent.reset();
        let out = agent
            .step(
                &Action::zeros(ACTION_DIM),
                0.1,
                &CollisionStatus::Collision { agents: vec![0] },
            )
            .unwrap();
        assert!(out.done);
        assert_eq!(out.info.get("collided"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn non_finite_action_is_rejected() {
        let mut agent = PointMassAgent::new(0, options(&EnvConfig::default()));
        let result = agent.step(
            &Action::from(vec![f64::NAN, 0.0, 0.0]),
            0.1,
            &CollisionStatus::Unchecked,
        );
        assert!(matches!(result, Err(AgentError::InvalidAction { .. })));
    }

    #[test]
    fn static_obstacle_sits_on_route() {
        let config = EnvConfig {
            add_static_obstacle: true,
            ..EnvConfig::default()
        };
        let agent = PointMassAgent::new(0, options(&config));
        assert!(agent.static_obstacle().is_some());
        assert_eq!(agent.blank_observation().dim(), OBSERVATION_DIM);
    }

    #[test]
    fn same_seed_same_route() {
        let config = EnvConfig::default();
        let mut a = PointMassAgent::new(0, options(&config));
        let mut b = PointMassAgent::new(1, options(&config));
        a.reseed(42);
        b.reseed(42);
        assert_eq!(a.reset(), b.reset());
    }
}
