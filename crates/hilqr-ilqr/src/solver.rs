//! Outer iLQR loop with Levenberg-Marquardt damping and backtracking.
//!
//! Each iteration runs one backward pass (raising `mu` until the control
//! Hessian factors), then forward passes at geometrically shrinking `alpha`
//! until the realized cost does not increase. An accepted rollout becomes the
//! next expansion point and lowers `mu`; a failed line search raises it.

use hilqr_core::config::SolverConfig;
use hilqr_core::error::{HilqrError, NumericalError};
use tracing::{debug, info, warn};

/// A problem the iLQR loop can optimize.
pub trait IlqrProblem {
    /// Realized trajectory produced by a forward pass.
    type Rollout;

    /// Recompute gains and values with damping `mu`.
    fn backward_pass(&mut self, mu: f64) -> Result<(), HilqrError>;

    /// Roll out the current policy with feedforward scale `alpha`, returning
    /// the rollout and its realized cost. Must not mutate the problem.
    fn forward_pass(&self, alpha: f64) -> Result<(Self::Rollout, f64), HilqrError>;

    /// Re-expand around an accepted rollout.
    fn accept(&mut self, rollout: Self::Rollout) -> Result<(), HilqrError>;
}

// ---------------------------------------------------------------------------
// SolverState
// ---------------------------------------------------------------------------

/// Iteration state threaded through the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    pub mu: f64,
    pub alpha: f64,
    /// Cost of every accepted rollout, starting with the nominal one.
    pub costs: Vec<f64>,
}

impl SolverState {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            mu: config.mu,
            alpha: config.start_alpha,
            costs: Vec::new(),
        }
    }

    /// Raise damping, starting from `mu_min` when it is zero.
    pub fn increase_mu(&mut self, config: &SolverConfig) {
        self.mu = (self.mu * config.mu_increase_factor).max(config.mu_min);
    }

    /// Lower damping, snapping to zero below `mu_min`.
    pub fn decrease_mu(&mut self, config: &SolverConfig) {
        self.mu *= config.mu_decrease_factor;
        if self.mu < config.mu_min {
            self.mu = 0.0;
        }
    }

    pub fn last_cost(&self) -> Option<f64> {
        self.costs.last().copied()
    }
}

/// Outcome of a solve. Non-convergence is reported here, not as an error.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub converged: bool,
    pub iterations: u32,
    /// Cost of the final accepted rollout.
    pub cost: f64,
    /// Accepted costs, nominal rollout first.
    pub cost_history: Vec<f64>,
    pub mu: f64,
    pub alpha: f64,
}

/// `|current - previous| / |previous|`, guarded against a zero previous cost.
pub fn relative_change(previous: f64, current: f64) -> f64 {
    (current - previous).abs() / previous.abs().max(f64::MIN_POSITIVE)
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Optimize `problem` until the relative cost change drops below
/// `cost_convg_ratio` or `max_iters` is reached.
pub fn solve<P: IlqrProblem>(
    problem: &mut P,
    config: &SolverConfig,
) -> Result<SolveReport, HilqrError> {
    config.validate()?;
    let mut state = SolverState::new(config);

    let (nominal, cost) = problem.forward_pass(0.0)?;
    if !cost.is_finite() {
        return Err(NumericalError::NonFinite {
            what: "nominal rollout cost",
        }
        .into());
    }
    problem.accept(nominal)?;
    state.costs.push(cost);
    debug!(cost, "nominal rollout");

    let mut converged = false;
    let mut iterations = 0;
    while iterations < config.max_iters {
        iterations += 1;
        backward_with_damping(problem, &mut state, config)?;

        let previous = state.last_cost().unwrap_or(f64::INFINITY);
        match line_search(problem, &mut state, config, previous)? {
            Some((rollout, cost)) => {
                problem.accept(rollout)?;
                state.costs.push(cost);
                state.decrease_mu(config);
                let change = relative_change(previous, cost);
                debug!(
                    iteration = iterations,
                    cost,
                    change,
                    mu = state.mu,
                    alpha = state.alpha,
                    "accepted step"
                );
                if change < config.cost_convg_ratio {
                    converged = true;
                    break;
                }
            }
            None => {
                state.increase_mu(config);
                warn!(
                    iteration = iterations,
                    mu = state.mu,
                    "line search failed, raising damping"
                );
                if state.mu > config.mu_max {
                    break;
                }
            }
        }
    }

    let cost = state.last_cost().unwrap_or(cost);
    if converged {
        info!(iterations, cost, "iLQR converged");
    } else {
        warn!(iterations, cost, "iLQR stopped without converging");
    }
    Ok(SolveReport {
        converged,
        iterations,
        cost,
        cost_history: state.costs,
        mu: state.mu,
        alpha: state.alpha,
    })
}

fn backward_with_damping<P: IlqrProblem>(
    problem: &mut P,
    state: &mut SolverState,
    config: &SolverConfig,
) -> Result<(), HilqrError> {
    loop {
        match problem.backward_pass(state.mu) {
            Ok(()) => return Ok(()),
            Err(err) if err.is_numerical() => {
                state.increase_mu(config);
                if state.mu > config.mu_max {
                    return Err(NumericalError::DampingExhausted {
                        mu: state.mu,
                        mu_max: config.mu_max,
                    }
                    .into());
                }
                debug!(mu = state.mu, error = %err, "backward pass failed, raising damping");
            }
            Err(err) => return Err(err),
        }
    }
}

fn line_search<P: IlqrProblem>(
    problem: &P,
    state: &mut SolverState,
    config: &SolverConfig,
    previous: f64,
) -> Result<Option<(P::Rollout, f64)>, HilqrError> {
    state.alpha = config.start_alpha;
    for _ in 0..config.line_search_steps {
        let (rollout, cost) = problem.forward_pass(state.alpha)?;
        if cost.is_finite()
            && (cost <= previous || relative_change(previous, cost) < config.cost_convg_ratio)
        {
            return Ok(Some((rollout, cost)));
        }
        state.alpha *= config.alpha_shrink;
    }
    Ok(None)
}
