//! Planar worlds with circular obstacles.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Disc obstacle in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: [f64; 2],
    pub radius: f64,
}

impl Circle {
    pub const fn new(center: [f64; 2], radius: f64) -> Self {
        Self { center, radius }
    }

    /// Distance from the center to the position part of `x`.
    pub fn distance(&self, x: &DVector<f64>) -> f64 {
        (x[0] - self.center[0]).hypot(x[1] - self.center[1])
    }

    /// Distance to the boundary; negative inside the disc.
    pub fn clearance(&self, x: &DVector<f64>) -> f64 {
        self.distance(x) - self.radius
    }
}

/// A set of obstacles. The empty world is the obstacle-free hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircleWorld {
    #[serde(default)]
    obstacles: Vec<Circle>,
}

impl CircleWorld {
    pub fn new(obstacles: Vec<Circle>) -> Self {
        Self { obstacles }
    }

    #[must_use]
    pub fn with_obstacle(mut self, obstacle: Circle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn add_obstacle(&mut self, obstacle: Circle) {
        self.obstacles.push(obstacle);
    }

    pub fn obstacles(&self) -> &[Circle] {
        &self.obstacles
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    /// Smallest clearance over all obstacles, `None` in an empty world.
    pub fn min_clearance(&self, x: &DVector<f64>) -> Option<f64> {
        self.obstacles
            .iter()
            .map(|o| o.clearance(x))
            .min_by(f64::total_cmp)
    }

    pub fn collides(&self, x: &DVector<f64>) -> bool {
        self.min_clearance(x).is_some_and(|c| c < 0.0)
    }
}
