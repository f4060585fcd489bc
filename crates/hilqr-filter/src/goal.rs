//! Discrete goal prediction in the maximum-entropy inverse optimal control
//! framework.
//!
//! The likelihood of an observed action under goal `g` is
//! `exp(V_g(x) - Q_g(x, u))`: actions that keep the cost-to-go close to
//! optimal for `g` are evidence for `g`. The distribution is kept in log
//! space and renormalized with log-sum-exp after every update.

use std::fmt;

use hilqr_core::error::ValidationError;
use tracing::trace;

/// `ln(sum(exp(l)))`, `None` if no entry carries finite mass.
pub fn log_sum_exp(logs: &[f64]) -> Option<f64> {
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let sum: f64 = logs.iter().map(|l| (l - max).exp()).sum();
    Some(max + sum.ln())
}

/// Posterior over a fixed set of goals.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalPredictor {
    log_probs: Vec<f64>,
}

impl GoalPredictor {
    /// Start from `initial`, which is normalized but need not sum to one.
    pub fn new(initial: &[f64]) -> Result<Self, ValidationError> {
        let mut predictor = Self {
            log_probs: Vec::new(),
        };
        predictor.initialize(initial)?;
        Ok(predictor)
    }

    /// Reset to the prior `initial`.
    pub fn initialize(&mut self, initial: &[f64]) -> Result<(), ValidationError> {
        if let Some(&value) = initial.iter().find(|p| !(p.is_finite() && **p >= 0.0)) {
            return Err(ValidationError::ProbabilityOutOfRange { value });
        }
        let mut log_probs: Vec<f64> = initial.iter().map(|p| p.ln()).collect();
        normalize_logs(&mut log_probs)?;
        self.log_probs = log_probs;
        Ok(())
    }

    /// Bayes update with per-goal action values `Q_g(x, u)` and state values
    /// `V_g(x)`.
    pub fn update(&mut self, q_values: &[f64], v_values: &[f64]) -> Result<(), ValidationError> {
        let n = self.log_probs.len();
        for values in [q_values, v_values] {
            if values.len() != n {
                return Err(ValidationError::LengthMismatch {
                    expected: n,
                    got: values.len(),
                });
            }
        }
        let mut log_probs: Vec<f64> = self
            .log_probs
            .iter()
            .zip(q_values.iter().zip(v_values))
            .map(|(lp, (q, v))| lp + v - q)
            .collect();
        normalize_logs(&mut log_probs)?;
        self.log_probs = log_probs;
        trace!(distribution = ?self.distribution(), "goal update");
        Ok(())
    }

    /// Shift the log distribution so that it sums to one.
    pub fn normalize(&mut self) -> Result<(), ValidationError> {
        normalize_logs(&mut self.log_probs)
    }

    pub fn distribution(&self) -> Vec<f64> {
        self.log_probs.iter().map(|l| l.exp()).collect()
    }

    pub fn log_distribution(&self) -> &[f64] {
        &self.log_probs
    }

    pub fn probability(&self, goal: usize) -> Option<f64> {
        self.log_probs.get(goal).map(|l| l.exp())
    }

    pub fn num_goals(&self) -> usize {
        self.log_probs.len()
    }

    /// Index of the most probable goal; the first one on ties.
    pub fn most_likely(&self) -> Option<usize> {
        self.log_probs
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &l)| match best {
                Some((_, b)) if b >= l => best,
                _ => Some((i, l)),
            })
            .map(|(i, _)| i)
    }
}

fn normalize_logs(log_probs: &mut [f64]) -> Result<(), ValidationError> {
    let total = log_sum_exp(log_probs).ok_or(ValidationError::DegenerateDistribution)?;
    for l in log_probs.iter_mut() {
        *l -= total;
    }
    Ok(())
}

impl fmt::Display for GoalPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "goals:")?;
        for p in self.distribution() {
            write!(f, " {p:.4}")?;
        }
        Ok(())
    }
}
