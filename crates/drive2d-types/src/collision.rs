//! Vehicle footprints and collision verdicts.

use serde::{Deserialize, Serialize};

/// The four corners of an oriented rectangle in world coordinates (meters).
///
/// Corners are ordered front-left, front-right, rear-right, rear-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Corner points as `[x, y]`.
    pub corners: [[f64; 2]; 4],
}

/// Axis-aligned bounds of a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

impl Bounds {
    /// Whether two bounds overlap (touching edges count as overlap).
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl Footprint {
    /// Build the footprint of a `length` x `width` rectangle centred on
    /// `(x, y)` and rotated by `heading` radians (0 points along +x).
    pub fn from_pose(x: f64, y: f64, heading: f64, length: f64, width: f64) -> Self {
        let (sin, cos) = heading.sin_cos();
        let half_l = length / 2.0;
        let half_w = width / 2.0;
        let corner = |along: f64, across: f64| {
            [
                x + along * cos - across * sin,
                y + along * sin + across * cos,
            ]
        };
        Self {
            corners: [
                corner(half_l, half_w),
                corner(half_l, -half_w),
                corner(-half_l, -half_w),
                corner(-half_l, half_w),
            ],
        }
    }

    /// Axis-aligned bounds enclosing every corner.
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for [x, y] in self.corners {
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);
        }
        bounds
    }
}

/// The verdict the collision gate hands to the agent about to act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CollisionStatus {
    /// No check was performed (checking disabled, or no collision mode
    /// configured).
    #[default]
    Unchecked,
    /// A check ran and found no contact.
    Clear,
    /// A check ran and found contact involving the listed agent indices.
    Collision {
        /// Indices of the agents involved, ascending and deduplicated.
        agents: Vec<usize>,
    },
}

impl CollisionStatus {
    /// Whether a collision was detected.
    pub const fn is_collision(&self) -> bool {
        matches!(self, Self::Collision { .. })
    }

    /// Whether `agent_index` is one of the colliding agents.
    pub fn involves(&self, agent_index: usize) -> bool {
        match self {
            Self::Collision { agents } => agents.contains(&agent_index),
            Self::Unchecked | Self::Clear => false,
        }
    }
}
