//! Hindsight chain: a root shared by every split, then one linear chain per
//! split.
//!
//! The first control is computed against all splits at once, weighted by
//! their probabilities; every later control belongs to a single split, as if
//! the true model were revealed right after the first step.

use std::fmt;
use std::sync::Arc;

use hilqr_core::config::SolverConfig;
use hilqr_core::error::{HilqrError, NumericalError, ValidationError};
use hilqr_core::traits::{Dynamics, StageCost, TerminalCost};
use hilqr_core::types::{Control, Dims, State};
use nalgebra::DVector;
use tracing::debug;

use crate::backup::{Successor, bellman_backup, bellman_step};
use crate::model::NodeModel;
use crate::node::PlanNode;
use crate::solver::{IlqrProblem, SolveReport, solve};
use crate::tree::check_distribution;

/// Splits must sum to one within this tolerance.
pub const SPLIT_TOLERANCE: f64 = 1e-3;

// ---------------------------------------------------------------------------
// HindsightSplit
// ---------------------------------------------------------------------------

/// One possible future: its models and the probability it is the true one.
#[derive(Clone)]
pub struct HindsightSplit {
    pub dynamics: Arc<dyn Dynamics>,
    pub final_cost: Arc<dyn TerminalCost>,
    pub cost: Arc<dyn StageCost>,
    pub probability: f64,
}

impl HindsightSplit {
    pub fn new(
        dynamics: impl Dynamics + 'static,
        final_cost: impl TerminalCost + 'static,
        cost: impl StageCost + 'static,
        probability: f64,
    ) -> Self {
        Self {
            dynamics: Arc::new(dynamics),
            final_cost: Arc::new(final_cost),
            cost: Arc::new(cost),
            probability,
        }
    }

    /// The models bundled for a plan node.
    pub fn model(&self) -> NodeModel {
        NodeModel {
            dynamics: Arc::clone(&self.dynamics),
            cost: Arc::clone(&self.cost),
            final_cost: Arc::clone(&self.final_cost),
        }
    }
}

impl fmt::Debug for HindsightSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HindsightSplit")
            .field("probability", &self.probability)
            .finish_non_exhaustive()
    }
}

/// A split together with its chain `nodes[0..=T]`. `nodes[0]` sits at the
/// shared root point; `nodes[T]` is terminal.
#[derive(Clone, Debug)]
struct HindsightBranch {
    split: HindsightSplit,
    nodes: Vec<PlanNode>,
}

/// Realized trajectory of one branch.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchRollout {
    /// `T + 1` states, starting at the initial state.
    pub states: Vec<State>,
    /// `T` applied controls.
    pub controls: Vec<Control>,
    pub cost: f64,
}

// ---------------------------------------------------------------------------
// HindsightSolver
// ---------------------------------------------------------------------------

/// iLQR over a set of hindsight splits.
#[derive(Clone, Debug)]
pub struct HindsightSolver {
    dims: Dims,
    branches: Vec<HindsightBranch>,
    horizon: usize,
    x_init: State,
}

impl HindsightSolver {
    /// Validate the split set. Chains are built by [`HindsightSolver::solve`].
    pub fn new(dims: Dims, splits: Vec<HindsightSplit>) -> Result<Self, HilqrError> {
        if splits.is_empty() {
            return Err(ValidationError::EmptySplits.into());
        }
        check_distribution(splits.iter().map(|s| s.probability), SPLIT_TOLERANCE)?;
        Ok(Self {
            dims,
            branches: splits
                .into_iter()
                .map(|split| HindsightBranch {
                    split,
                    nodes: Vec::new(),
                })
                .collect(),
            horizon: 0,
            x_init: DVector::zeros(dims.state),
        })
    }

    pub const fn dims(&self) -> Dims {
        self.dims
    }

    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    /// Number of controls per branch, `T`. Zero before the first solve.
    pub const fn timesteps(&self) -> usize {
        self.horizon
    }

    pub fn split(&self, branch: usize) -> Result<&HindsightSplit, ValidationError> {
        self.branch(branch).map(|b| &b.split)
    }

    /// Node `t` of `branch`.
    pub fn node(&self, branch: usize, t: usize) -> Result<&PlanNode, ValidationError> {
        self.branch(branch)?
            .nodes
            .get(t)
            .ok_or(ValidationError::TimestepOutOfRange {
                t,
                horizon: self.horizon + 1,
            })
    }

    fn branch(&self, branch: usize) -> Result<&HindsightBranch, ValidationError> {
        self.branches
            .get(branch)
            .ok_or(ValidationError::BranchOutOfRange {
                branch,
                branches: self.branches.len(),
            })
    }

    // -- setup --------------------------------------------------------------

    /// Seed every chain at `(x_init, u_nominal)` for `horizon` steps.
    fn build_chains(
        &mut self,
        horizon: usize,
        x_init: &State,
        u_nominal: &Control,
    ) -> Result<(), HilqrError> {
        for branch in &mut self.branches {
            let model = branch.split.model();
            let p = branch.split.probability;
            let mut nodes = Vec::with_capacity(horizon + 1);
            for t in 0..=horizon {
                let mut node = PlanNode::new(model.clone(), x_init.clone(), u_nominal.clone(), p)?;
                node.place(t, t == horizon)?;
                nodes.push(node);
            }
            branch.nodes = nodes;
        }
        self.horizon = horizon;
        self.x_init = x_init.clone();
        Ok(())
    }

    // -- backward pass ------------------------------------------------------

    /// Back up every chain to `t = 1`, then the shared root from all splits.
    pub fn backward_pass(&mut self, mu: f64) -> Result<(), HilqrError> {
        if self.horizon == 0 {
            return Err(ValidationError::ZeroHorizon.into());
        }
        let dims = self.dims;
        let horizon = self.horizon;

        for (b, branch) in self.branches.iter_mut().enumerate() {
            for t in (1..horizon).rev() {
                let (head, tail) = branch.nodes.split_at_mut(t + 1);
                let node = &mut head[t];
                let next = &tail[0];
                let (dynamics, cost) = node.stage_terms().ok_or(
                    NumericalError::NonFinite {
                        what: "chain node without stage expansion",
                    },
                )?;
                let backup = bellman_step(
                    dims,
                    cost,
                    dynamics,
                    next.x_hat(),
                    next.value(),
                    mu,
                    b * (horizon + 1) + t,
                )?;
                node.set_backup(backup.gains, backup.value);
            }
        }

        let root = {
            let mut successors = Vec::with_capacity(self.branches.len());
            for branch in &self.branches {
                let (dynamics, cost) = branch.nodes[0].stage_terms().ok_or(
                    NumericalError::NonFinite {
                        what: "root without stage expansion",
                    },
                )?;
                successors.push(Successor {
                    probability: branch.split.probability,
                    cost,
                    dynamics,
                    x_next: branch.nodes[1].x_hat(),
                    value: branch.nodes[1].value(),
                });
            }
            bellman_backup(dims, &successors, mu, 0)?
        };
        for branch in &mut self.branches {
            branch.nodes[0].set_backup(root.gains.clone(), root.value.clone());
        }
        Ok(())
    }

    // -- forward pass -------------------------------------------------------

    /// Roll `branch` out from `x_init` under that split's true models.
    pub fn forward_pass(
        &self,
        branch: usize,
        x_init: &State,
        alpha: f64,
    ) -> Result<BranchRollout, HilqrError> {
        self.dims.check_state(x_init)?;
        let branch = self.branch(branch)?;
        if branch.nodes.is_empty() {
            return Err(ValidationError::ZeroHorizon.into());
        }
        let split = &branch.split;
        let mut states = Vec::with_capacity(self.horizon + 1);
        let mut controls = Vec::with_capacity(self.horizon);
        let mut x = x_init.clone();
        let mut cost = 0.0;
        for (t, node) in branch.nodes.iter().take(self.horizon).enumerate() {
            let u = node.compute_control_stepsize(&x, alpha);
            cost += split.cost.cost(&x, &u, t);
            let next = split.dynamics.step(&x, &u);
            states.push(x);
            controls.push(u);
            x = next;
        }
        cost += split.final_cost.cost(&x);
        states.push(x);
        Ok(BranchRollout {
            states,
            controls,
            cost,
        })
    }

    /// Probability-weighted cost of rolling every branch out from `x_init`.
    pub fn expected_cost(&self, x_init: &State, alpha: f64) -> Result<f64, HilqrError> {
        let mut total = 0.0;
        for b in 0..self.branches.len() {
            total += self.branches[b].split.probability * self.forward_pass(b, x_init, alpha)?.cost;
        }
        Ok(total)
    }

    /// Control of `branch` at timestep `t` from state `x`.
    pub fn compute_control_stepsize(
        &self,
        branch: usize,
        x: &DVector<f64>,
        t: usize,
        alpha: f64,
    ) -> Result<Control, HilqrError> {
        self.dims.check_state(x)?;
        if t >= self.horizon {
            return Err(ValidationError::TimestepOutOfRange {
                t,
                horizon: self.horizon,
            }
            .into());
        }
        Ok(self.node(branch, t)?.compute_control_stepsize(x, alpha))
    }

    /// Control of `branch` at timestep `t` with the full feedforward step.
    pub fn compute_control(
        &self,
        branch: usize,
        x: &DVector<f64>,
        t: usize,
    ) -> Result<Control, HilqrError> {
        self.compute_control_stepsize(branch, x, t, 1.0)
    }

    /// First control of the plan. Identical for every branch.
    pub fn first_control(&self, x: &DVector<f64>) -> Result<Control, HilqrError> {
        self.compute_control(0, x, 0)
    }

    // -- solver -------------------------------------------------------------

    /// Build `T = horizon` step chains seeded with `u_nominal` from `x_init`
    /// and run the iLQR loop.
    pub fn solve(
        &mut self,
        horizon: usize,
        x_init: &State,
        u_nominal: &Control,
        config: &SolverConfig,
    ) -> Result<SolveReport, HilqrError> {
        if horizon == 0 {
            return Err(ValidationError::ZeroHorizon.into());
        }
        config.validate()?;
        self.dims.check_state(x_init)?;
        self.dims.check_control(u_nominal)?;
        self.build_chains(horizon, x_init, u_nominal)?;
        debug!(
            branches = self.branches.len(),
            horizon, "solving hindsight chains"
        );
        solve(self, config)
    }
}

impl IlqrProblem for HindsightSolver {
    type Rollout = Vec<BranchRollout>;

    fn backward_pass(&mut self, mu: f64) -> Result<(), HilqrError> {
        Self::backward_pass(self, mu)
    }

    fn forward_pass(&self, alpha: f64) -> Result<(Vec<BranchRollout>, f64), HilqrError> {
        let mut rollouts = Vec::with_capacity(self.branches.len());
        let mut cost = 0.0;
        for b in 0..self.branches.len() {
            let rollout = Self::forward_pass(self, b, &self.x_init, alpha)?;
            cost += self.branches[b].split.probability * rollout.cost;
            rollouts.push(rollout);
        }
        Ok((rollouts, cost))
    }

    fn accept(&mut self, rollouts: Vec<BranchRollout>) -> Result<(), HilqrError> {
        if rollouts.len() != self.branches.len() {
            return Err(ValidationError::LengthMismatch {
                expected: self.branches.len(),
                got: rollouts.len(),
            }
            .into());
        }
        for (branch, rollout) in self.branches.iter_mut().zip(rollouts) {
            // The terminal node keeps its expansion control.
            let controls = rollout.controls.into_iter().map(Some).chain(std::iter::once(None));
            for ((node, x), u) in branch.nodes.iter_mut().zip(rollout.states).zip(controls) {
                let u = u.unwrap_or_else(|| node.u_hat().clone());
                node.relinearize(x, u)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar(v: f64) -> DVector<f64> {
        DVector::from_vec(vec![v])
    }

    fn split(drift: f64, goal: f64, probability: f64) -> HindsightSplit {
        HindsightSplit::new(
            move |x: &DVector<f64>, u: &DVector<f64>| x + u + DVector::from_element(1, drift),
            move |x: &DVector<f64>| (x[0] - goal).powi(2),
            |x: &DVector<f64>, u: &DVector<f64>, _t: usize| 0.1 * x[0] * x[0] + u[0] * u[0],
            probability,
        )
    }

    #[test]
    fn empty_split_set_rejected() {
        assert!(matches!(
            HindsightSolver::new(Dims::new(1, 1), Vec::new()),
            Err(HilqrError::Validation(ValidationError::EmptySplits))
        ));
    }

    #[test]
    fn split_probabilities_checked_loosely() {
        let dims = Dims::new(1, 1);
        assert!(HindsightSolver::new(dims, vec![split(0.0, 1.0, 0.5), split(0.0, -1.0, 0.5005)]).is_ok());
        assert!(matches!(
            HindsightSolver::new(dims, vec![split(0.0, 1.0, 0.5), split(0.0, -1.0, 0.6)]),
            Err(HilqrError::Validation(ValidationError::ProbabilitySum { .. }))
        ));
    }

    #[test]
    fn zero_horizon_rejected() {
        let mut solver = HindsightSolver::new(Dims::new(1, 1), vec![split(0.0, 1.0, 1.0)]).unwrap();
        let err = solver
            .solve(0, &scalar(0.0), &scalar(0.0), &SolverConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            HilqrError::Validation(ValidationError::ZeroHorizon)
        ));
    }

    #[test]
    fn first_control_is_shared() {
        let mut solver = HindsightSolver::new(
            Dims::new(1, 1),
            vec![split(0.2, 2.0, 0.3), split(-0.2, -1.0, 0.7)],
        )
        .unwrap();
        let report = solver
            .solve(6, &scalar(0.0), &scalar(0.0), &SolverConfig::default())
            .unwrap();
        assert!(report.converged);
        assert_eq!(solver.timesteps(), 6);

        let x = scalar(0.1);
        let u0 = solver.compute_control(0, &x, 0).unwrap();
        let u1 = solver.compute_control(1, &x, 0).unwrap();
        assert_relative_eq!(u0, u1, epsilon = 1e-12);

        // Later controls diverge toward each split's goal.
        let a = solver.forward_pass(0, &scalar(0.0), 1.0).unwrap();
        let b = solver.forward_pass(1, &scalar(0.0), 1.0).unwrap();
        assert_relative_eq!(a.controls[0], b.controls[0], epsilon = 1e-12);
        assert!(a.states[6][0] > b.states[6][0]);
    }

    #[test]
    fn expected_cost_matches_report() {
        let mut solver = HindsightSolver::new(
            Dims::new(1, 1),
            vec![split(0.0, 1.0, 0.5), split(0.0, -1.0, 0.5)],
        )
        .unwrap();
        let report = solver
            .solve(4, &scalar(0.5), &scalar(0.0), &SolverConfig::default())
            .unwrap();
        let expected = solver.expected_cost(&scalar(0.5), 0.0).unwrap();
        assert_relative_eq!(report.cost, expected, epsilon = 1e-9);
    }

    #[test]
    fn out_of_range_queries() {
        let mut solver = HindsightSolver::new(Dims::new(1, 1), vec![split(0.0, 1.0, 1.0)]).unwrap();
        solver
            .solve(3, &scalar(0.0), &scalar(0.0), &SolverConfig::default())
            .unwrap();
        assert!(matches!(
            solver.compute_control(2, &scalar(0.0), 0),
            Err(HilqrError::Validation(ValidationError::BranchOutOfRange {
                branch: 2,
                branches: 1
            }))
        ));
        assert!(matches!(
            solver.compute_control(0, &scalar(0.0), 3),
            Err(HilqrError::Validation(ValidationError::TimestepOutOfRange { t: 3, horizon: 3 }))
        ));
        assert!(solver.forward_pass(0, &DVector::zeros(2), 1.0).is_err());
    }

    #[test]
    fn forward_pass_before_solve_fails() {
        let solver = HindsightSolver::new(Dims::new(1, 1), vec![split(0.0, 1.0, 1.0)]).unwrap();
        assert!(solver.forward_pass(0, &scalar(0.0), 1.0).is_err());
    }
}
