//! Costs for driving to a goal around circular obstacles.

use hilqr_core::traits::{StageCost, TerminalCost};
use hilqr_core::types::TerminalExpansion;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::diffdrive::{CONTROL_DIM, STATE_DIM};
use crate::world::CircleWorld;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_control() -> [f64; CONTROL_DIM] {
    [1.0, 1.0]
}
const fn default_state() -> [f64; STATE_DIM] {
    [0.0, 0.0, 0.0]
}
const fn default_obstacle() -> f64 {
    50.0
}
const fn default_obstacle_falloff() -> f64 {
    1.0
}
const fn default_goal() -> [f64; STATE_DIM] {
    [25.0, 25.0, 0.0]
}

// ---------------------------------------------------------------------------
// CostWeights
// ---------------------------------------------------------------------------

/// Weights shared by the stage and terminal costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    /// Diagonal of the control-effort penalty.
    #[serde(default = "default_control")]
    pub control: [f64; CONTROL_DIM],

    /// Diagonal of the running penalty on distance to the goal.
    #[serde(default = "default_state")]
    pub state: [f64; STATE_DIM],

    /// Peak height of each obstacle bump.
    #[serde(default = "default_obstacle")]
    pub obstacle: f64,

    /// Bump width as a multiple of the obstacle radius.
    #[serde(default = "default_obstacle_falloff")]
    pub obstacle_falloff: f64,

    /// Diagonal of the terminal penalty on distance to the goal.
    #[serde(default = "default_goal")]
    pub goal: [f64; STATE_DIM],
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            control: default_control(),
            state: default_state(),
            obstacle: default_obstacle(),
            obstacle_falloff: default_obstacle_falloff(),
            goal: default_goal(),
        }
    }
}

fn weighted_sq(weights: &[f64], x: &DVector<f64>, target: &[f64]) -> f64 {
    weights
        .iter()
        .zip(x.iter().zip(target))
        .map(|(w, (x, g))| w * (x - g).powi(2))
        .sum()
}

// ---------------------------------------------------------------------------
// WorldCost
// ---------------------------------------------------------------------------

/// Running cost: control effort, goal tracking and a Gaussian bump per
/// obstacle, `w exp(-d^2 / (2 sigma^2))` with `sigma = radius * falloff`.
///
/// Uses the finite-difference quadratization.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldCost {
    pub world: CircleWorld,
    pub goal: [f64; STATE_DIM],
    pub weights: CostWeights,
}

impl WorldCost {
    pub const fn new(world: CircleWorld, goal: [f64; STATE_DIM], weights: CostWeights) -> Self {
        Self {
            world,
            goal,
            weights,
        }
    }

    /// Sum of obstacle bumps at `x`.
    pub fn obstacle_penalty(&self, x: &DVector<f64>) -> f64 {
        self.world
            .obstacles()
            .iter()
            .map(|o| {
                let sigma = o.radius * self.weights.obstacle_falloff;
                let d = o.distance(x);
                self.weights.obstacle * (-d * d / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    }
}

impl StageCost for WorldCost {
    fn cost(&self, x: &DVector<f64>, u: &DVector<f64>, _t: usize) -> f64 {
        weighted_sq(&self.weights.control, u, &[0.0; CONTROL_DIM])
            + weighted_sq(&self.weights.state, x, &self.goal)
            + self.obstacle_penalty(x)
    }
}

// ---------------------------------------------------------------------------
// GoalCost
// ---------------------------------------------------------------------------

/// Terminal cost `sum_i w_i (x_i - g_i)^2`.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalCost {
    pub goal: [f64; STATE_DIM],
    pub weights: [f64; STATE_DIM],
}

impl GoalCost {
    pub const fn new(goal: [f64; STATE_DIM], weights: [f64; STATE_DIM]) -> Self {
        Self { goal, weights }
    }
}

impl TerminalCost for GoalCost {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        weighted_sq(&self.weights, x, &self.goal)
    }

    fn quadratize(&self, x: &DVector<f64>) -> TerminalExpansion {
        let w = DVector::from_column_slice(&self.weights);
        let err = x - DVector::from_column_slice(&self.goal);
        TerminalExpansion {
            q: DMatrix::from_diagonal(&(2.0 * &w)),
            b_x: 2.0 * w.component_mul(&err),
            c: TerminalCost::cost(self, x),
        }
    }
}
