use hilqr_core::config::SolverConfig;
use hilqr_core::error::ConfigError;
use serde::{Deserialize, Serialize};

use crate::cost::CostWeights;
use crate::diffdrive::{CONTROL_DIM, STATE_DIM};
use crate::world::Circle;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_dt() -> f64 {
    0.1
}
const fn default_horizon() -> usize {
    40
}
const fn default_start() -> [f64; STATE_DIM] {
    [0.0, 0.0, 0.0]
}
const fn default_goal() -> [f64; STATE_DIM] {
    [6.0, 0.0, 0.0]
}
const fn default_nominal_control() -> [f64; CONTROL_DIM] {
    [1.0, 0.0]
}
// Slightly off the straight line so the detour side is well defined.
const fn default_obstacle() -> Circle {
    Circle::new([3.0, -0.25], 1.0)
}
const fn default_sensing_range() -> f64 {
    1.5
}

// ---------------------------------------------------------------------------
// ExperimentConfig
// ---------------------------------------------------------------------------

/// Single-obstacle experiment: drive from `start` to `goal` not knowing
/// whether `obstacle` is really there until it comes within sensing range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Integration step of the robot (s).
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Closed-loop steps. The plan horizon shrinks by one each step.
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    #[serde(default = "default_start")]
    pub start: [f64; STATE_DIM],

    #[serde(default = "default_goal")]
    pub goal: [f64; STATE_DIM],

    /// Control used to seed every plan.
    #[serde(default = "default_nominal_control")]
    pub nominal_control: [f64; CONTROL_DIM],

    /// The obstacle that may or may not exist.
    #[serde(default = "default_obstacle")]
    pub obstacle: Circle,

    /// Clearance at which the robot learns the true world.
    #[serde(default = "default_sensing_range")]
    pub sensing_range: f64,

    #[serde(default)]
    pub weights: CostWeights,

    #[serde(default)]
    pub solver: SolverConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            horizon: default_horizon(),
            start: default_start(),
            goal: default_goal(),
            nominal_control: default_nominal_control(),
            obstacle: default_obstacle(),
            sensing_range: default_sensing_range(),
            weights: CostWeights::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Validate configuration. Returns Err on invalid values.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::invalid("dt", format!("must be > 0, got {}", self.dt)));
        }
        if self.horizon == 0 {
            return Err(ConfigError::invalid("horizon", "must be > 0"));
        }
        if !(self.obstacle.radius.is_finite() && self.obstacle.radius > 0.0) {
            return Err(ConfigError::invalid(
                "obstacle.radius",
                format!("must be > 0, got {}", self.obstacle.radius),
            ));
        }
        if !(self.sensing_range >= 0.0) {
            return Err(ConfigError::invalid(
                "sensing_range",
                format!("must be >= 0, got {}", self.sensing_range),
            ));
        }
        if !(self.weights.obstacle_falloff > 0.0) {
            return Err(ConfigError::invalid(
                "weights.obstacle_falloff",
                format!("must be > 0, got {}", self.weights.obstacle_falloff),
            ));
        }
        let all_weights = self
            .weights
            .control
            .iter()
            .chain(&self.weights.state)
            .chain(&self.weights.goal)
            .chain(std::iter::once(&self.weights.obstacle));
        if let Some(w) = all_weights.copied().find(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(ConfigError::invalid("weights", format!("must be >= 0, got {w}")));
        }
        self.solver.validate()
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ExperimentConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExperimentConfig::default());
        assert_eq!(config.horizon, 40);
        assert_eq!(config.obstacle.center, [3.0, -0.25]);
    }

    #[test]
    fn nested_tables_override() {
        let config = ExperimentConfig::from_toml_str(
            r"
            horizon = 12
            goal = [4.0, 1.0, 0.0]

            [obstacle]
            center = [2.0, 0.5]
            radius = 0.4

            [weights]
            obstacle = 80.0

            [solver]
            max_iters = 30
            ",
        )
        .unwrap();
        assert_eq!(config.horizon, 12);
        assert_eq!(config.goal, [4.0, 1.0, 0.0]);
        assert_eq!(config.obstacle, Circle::new([2.0, 0.5], 0.4));
        assert!((config.weights.obstacle - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.weights.control, [1.0, 1.0]);
        assert_eq!(config.solver.max_iters, 30);
    }

    #[test]
    fn rejects_zero_horizon() {
        let err = ExperimentConfig::from_toml_str("horizon = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "horizon"));
    }

    #[test]
    fn rejects_negative_weight() {
        let mut config = ExperimentConfig::default();
        config.weights.goal[1] = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn solver_errors_surface() {
        let err = ExperimentConfig::from_toml_str("[solver]\nstart_alpha = 2.0").unwrap_err();
        assert!(err.to_string().contains("start_alpha"));
    }
}
