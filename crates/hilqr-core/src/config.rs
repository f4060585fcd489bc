use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_mu_min() -> f64 {
    1e-6
}
const fn default_mu_max() -> f64 {
    1e10
}
const fn default_mu_increase_factor() -> f64 {
    10.0
}
const fn default_mu_decrease_factor() -> f64 {
    0.5
}
const fn default_max_iters() -> u32 {
    1000
}
const fn default_cost_convg_ratio() -> f64 {
    1e-4
}
const fn default_start_alpha() -> f64 {
    1.0
}
const fn default_alpha_shrink() -> f64 {
    0.5
}
const fn default_line_search_steps() -> u32 {
    10
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Solver loop configuration shared by the tree and hindsight solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Initial Levenberg-Marquardt damping added to the control Hessian.
    /// Zero gives the undamped behavior.
    #[serde(default)]
    pub mu: f64,

    /// Smallest non-zero damping. Raising `mu` from zero starts here, and
    /// lowering it below this snaps back to zero.
    #[serde(default = "default_mu_min")]
    pub mu_min: f64,

    /// Damping ceiling. A backward pass that is still singular above this
    /// fails the solve.
    #[serde(default = "default_mu_max")]
    pub mu_max: f64,

    /// Multiplier applied to `mu` after a singular backward pass or a failed
    /// line search (default: 10).
    #[serde(default = "default_mu_increase_factor")]
    pub mu_increase_factor: f64,

    /// Multiplier applied to `mu` after an accepted step (default: 0.5).
    #[serde(default = "default_mu_decrease_factor")]
    pub mu_decrease_factor: f64,

    /// Maximum outer iterations (default: 1000).
    #[serde(default = "default_max_iters")]
    pub max_iters: u32,

    /// Converged once `|J_i - J_{i-1}| / J_{i-1}` drops below this.
    #[serde(default = "default_cost_convg_ratio")]
    pub cost_convg_ratio: f64,

    /// Line-search step size tried first on every iteration, in (0, 1].
    #[serde(default = "default_start_alpha")]
    pub start_alpha: f64,

    /// Geometric backtracking factor for `alpha`, in (0, 1).
    #[serde(default = "default_alpha_shrink")]
    pub alpha_shrink: f64,

    /// Forward-pass attempts per iteration before damping is raised.
    #[serde(default = "default_line_search_steps")]
    pub line_search_steps: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            mu: 0.0,
            mu_min: default_mu_min(),
            mu_max: default_mu_max(),
            mu_increase_factor: default_mu_increase_factor(),
            mu_decrease_factor: default_mu_decrease_factor(),
            max_iters: default_max_iters(),
            cost_convg_ratio: default_cost_convg_ratio(),
            start_alpha: default_start_alpha(),
            alpha_shrink: default_alpha_shrink(),
            line_search_steps: default_line_search_steps(),
        }
    }
}

impl SolverConfig {
    /// Validate configuration. Returns Err on invalid values.
    ///
    /// Comparisons are negated so that NaN fields are rejected.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mu.is_finite() && self.mu >= 0.0) {
            return Err(ConfigError::invalid("mu", format!("must be >= 0, got {}", self.mu)));
        }
        if !(self.mu_min.is_finite() && self.mu_min > 0.0) {
            return Err(ConfigError::invalid(
                "mu_min",
                format!("must be > 0, got {}", self.mu_min),
            ));
        }
        if !(self.mu_max > self.mu_min) {
            return Err(ConfigError::invalid(
                "mu_max",
                format!("must exceed mu_min ({}), got {}", self.mu_min, self.mu_max),
            ));
        }
        if !(self.mu_increase_factor > 1.0) {
            return Err(ConfigError::invalid(
                "mu_increase_factor",
                format!("must be > 1, got {}", self.mu_increase_factor),
            ));
        }
        if !(self.mu_decrease_factor > 0.0 && self.mu_decrease_factor < 1.0) {
            return Err(ConfigError::invalid(
                "mu_decrease_factor",
                format!("must be in (0, 1), got {}", self.mu_decrease_factor),
            ));
        }
        if self.max_iters == 0 {
            return Err(ConfigError::invalid("max_iters", "must be > 0"));
        }
        if !(self.cost_convg_ratio.is_finite() && self.cost_convg_ratio > 0.0) {
            return Err(ConfigError::invalid(
                "cost_convg_ratio",
                format!("must be > 0, got {}", self.cost_convg_ratio),
            ));
        }
        if !(self.start_alpha > 0.0 && self.start_alpha <= 1.0) {
            return Err(ConfigError::invalid(
                "start_alpha",
                format!("must be in (0, 1], got {}", self.start_alpha),
            ));
        }
        if !(self.alpha_shrink > 0.0 && self.alpha_shrink < 1.0) {
            return Err(ConfigError::invalid(
                "alpha_shrink",
                format!("must be in (0, 1), got {}", self.alpha_shrink),
            ));
        }
        if self.line_search_steps == 0 {
            return Err(ConfigError::invalid("line_search_steps", "must be > 0"));
        }
        Ok(())
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
    fn default_is_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iters, 1000);
        assert!((config.cost_convg_ratio - 1e-4).abs() < f64::EPSILON);
        assert!((config.start_alpha - 1.0).abs() < f64::EPSILON);
        assert!(config.mu.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SolverConfig::from_toml_str("").unwrap();
        assert_eq!(config, SolverConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = SolverConfig::from_toml_str(
            r"
            mu = 0.1
            max_iters = 50
            alpha_shrink = 0.25
            ",
        )
        .unwrap();
        assert!((config.mu - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.max_iters, 50);
        assert!((config.alpha_shrink - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.line_search_steps, 10);
    }

    #[test]
    fn toml_roundtrip() {
        let config = SolverConfig {
            mu: 1e-3,
            max_iters: 42,
            ..SolverConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back = SolverConfig::from_toml_str(&text).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn rejects_negative_mu() {
        let config = SolverConfig {
            mu: -1.0,
            ..SolverConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mu"));
    }

    #[test]
    fn rejects_zero_iterations() {
        let err = SolverConfig::from_toml_str("max_iters = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_iters"));
    }

    #[test]
    fn rejects_bad_alpha() {
        for alpha in [0.0, -0.5, 1.5, f64::NAN] {
            let config = SolverConfig {
                start_alpha: alpha,
                ..SolverConfig::default()
            };
            assert!(config.validate().is_err(), "alpha={alpha} should be rejected");
        }
        let config = SolverConfig {
            alpha_shrink: 1.0,
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_damping_bounds() {
        let config = SolverConfig {
            mu_min: 1.0,
            mu_max: 0.5,
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = SolverConfig::from_toml_str("mu = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SolverConfig::from_file("/nonexistent/solver.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
