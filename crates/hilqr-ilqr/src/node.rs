//! Plan node: one timestep of one scenario.

use std::fmt;

use hilqr_core::error::{HilqrError, ValidationError};
use hilqr_core::types::{Control, Dims, Linearization, StageExpansion, State};
use nalgebra::{DMatrix, DVector};

use crate::backup::Gains;
use crate::model::{Expansion, NodeModel, expand_stage, expand_terminal, terminal_value};

/// A single node of a plan tree or hindsight chain.
///
/// Holds the expansion point, the local model around it, the quadratic value
/// over the extended deviation state `z = [x - x_hat; 1]`, and the control law
/// `u = u_hat + K (x - x_hat) + alpha k`.
///
/// A freshly created node is a leaf: it carries a terminal expansion and its
/// value is the terminal cost quadratic. It switches to a stage expansion once
/// it is given successors.
#[derive(Clone, Debug)]
pub struct PlanNode {
    model: NodeModel,
    probability: f64,
    t: usize,

    x_hat: State,
    u_hat: Control,
    x_star: State,
    u_star: Control,

    expansion: Expansion,
    value: DMatrix<f64>,
    feedback: DMatrix<f64>,
    feedforward: DVector<f64>,
}

impl PlanNode {
    /// Create a leaf node expanded at the nominal point `(x_star, u_star)`.
    ///
    /// `probability` is the chance of reaching this node from its parent.
    pub fn new(
        model: NodeModel,
        x_star: State,
        u_star: Control,
        probability: f64,
    ) -> Result<Self, HilqrError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(ValidationError::ProbabilityOutOfRange { value: probability }.into());
        }
        let n = x_star.len();
        let m = u_star.len();
        let expansion = expand_terminal(&model, Dims::new(n, m), &x_star)?;
        let value = match &expansion {
            Expansion::Terminal(term) => terminal_value(term),
            Expansion::Stage { .. } => DMatrix::zeros(n + 1, n + 1),
        };
        Ok(Self {
            model,
            probability,
            t: 0,
            x_hat: x_star.clone(),
            u_hat: u_star.clone(),
            x_star,
            u_star,
            expansion,
            value,
            feedback: DMatrix::zeros(m, n),
            feedforward: DVector::zeros(m),
        })
    }

    // -- role ---------------------------------------------------------------

    /// Fix the timestep and role of the node and rebuild its local model.
    pub(crate) fn place(&mut self, t: usize, terminal: bool) -> Result<(), HilqrError> {
        self.t = t;
        self.rebuild(terminal)
    }

    /// Move the expansion point and rebuild the local model.
    pub fn relinearize(&mut self, x: State, u: Control) -> Result<(), HilqrError> {
        self.x_hat = x;
        self.u_hat = u;
        self.rebuild(self.is_terminal())
    }

    fn rebuild(&mut self, terminal: bool) -> Result<(), HilqrError> {
        let dims = self.dims();
        self.expansion = if terminal {
            expand_terminal(&self.model, dims, &self.x_hat)?
        } else {
            expand_stage(&self.model, dims, &self.x_hat, &self.u_hat, self.t)?
        };
        if let Expansion::Terminal(term) = &self.expansion {
            self.value = terminal_value(term);
            self.feedback.fill(0.0);
            self.feedforward.fill(0.0);
        }
        Ok(())
    }

    // -- policy -------------------------------------------------------------

    /// Store the result of a Bellman backup.
    pub(crate) fn set_backup(&mut self, gains: Gains, value: DMatrix<f64>) {
        self.feedback = gains.feedback;
        self.feedforward = gains.feedforward;
        self.value = value;
    }

    /// Feedback control at `x` with the full feedforward step.
    pub fn compute_control(&self, x: &DVector<f64>) -> Control {
        self.compute_control_stepsize(x, 1.0)
    }

    /// Feedback control at `x`, moving only `alpha` of the feedforward step
    /// away from `u_hat`.
    pub fn compute_control_stepsize(&self, x: &DVector<f64>, alpha: f64) -> Control {
        &self.u_hat + &self.feedback * (x - &self.x_hat) + &self.feedforward * alpha
    }

    // -- accessors ----------------------------------------------------------

    pub const fn model(&self) -> &NodeModel {
        &self.model
    }

    pub const fn probability(&self) -> f64 {
        self.probability
    }

    /// Timestep used when evaluating the stage cost.
    pub const fn t(&self) -> usize {
        self.t
    }

    pub fn dims(&self) -> Dims {
        Dims::new(self.x_hat.len(), self.u_hat.len())
    }

    /// Current expansion state.
    pub const fn x_hat(&self) -> &State {
        &self.x_hat
    }

    /// Current expansion control.
    pub const fn u_hat(&self) -> &Control {
        &self.u_hat
    }

    /// Nominal state the node was created with.
    pub const fn x_star(&self) -> &State {
        &self.x_star
    }

    /// Nominal control the node was created with.
    pub const fn u_star(&self) -> &Control {
        &self.u_star
    }

    pub const fn expansion(&self) -> &Expansion {
        &self.expansion
    }

    pub const fn is_terminal(&self) -> bool {
        self.expansion.is_terminal()
    }

    /// Dynamics and cost terms of a non-terminal node.
    pub const fn stage_terms(&self) -> Option<(&Linearization, &StageExpansion)> {
        match &self.expansion {
            Expansion::Stage { dynamics, cost } => Some((dynamics, cost)),
            Expansion::Terminal(_) => None,
        }
    }

    /// Quadratic value over the extended deviation state, `(n+1) x (n+1)`.
    pub const fn value(&self) -> &DMatrix<f64> {
        &self.value
    }

    /// Feedback gain `K`, `m x n`.
    pub const fn feedback(&self) -> &DMatrix<f64> {
        &self.feedback
    }

    /// Feedforward term `k`, `m`.
    pub const fn feedforward(&self) -> &DVector<f64> {
        &self.feedforward
    }

    /// Cost-to-go predicted by the local quadratic at `x`.
    pub fn predicted_cost(&self, x: &DVector<f64>) -> f64 {
        let n = self.x_hat.len();
        let mut z = DVector::zeros(n + 1);
        z.rows_mut(0, n).copy_from(&(x - &self.x_hat));
        z[n] = 1.0;
        0.5 * (z.transpose() * &self.value * &z)[0]
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PlanNode(t={}, p={})", self.t, self.probability)?;
        writeln!(f, "  x_hat: {}", self.x_hat.transpose())?;
        writeln!(f, "  u_hat: {}", self.u_hat.transpose())?;
        writeln!(f, "  K: {}", self.feedback)?;
        write!(f, "  k: {}", self.feedforward.transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar_model() -> NodeModel {
        NodeModel::new(
            |x: &DVector<f64>, u: &DVector<f64>| x + u,
            |x: &DVector<f64>, u: &DVector<f64>, _t: usize| x[0] * x[0] + u[0] * u[0],
            |x: &DVector<f64>| x[0] * x[0],
        )
    }

    fn scalar(v: f64) -> DVector<f64> {
        DVector::from_vec(vec![v])
    }

    #[test]
    fn new_node_is_a_leaf() {
        let node = PlanNode::new(scalar_model(), scalar(2.0), scalar(0.0), 1.0).unwrap();
        assert!(node.is_terminal());
        assert!(node.stage_terms().is_none());
        assert_relative_eq!(node.predicted_cost(&scalar(2.0)), 4.0, epsilon = 1e-6);
        assert_relative_eq!(node.predicted_cost(&scalar(3.0)), 9.0, epsilon = 1e-4);
    }

    #[test]
    fn probability_outside_unit_interval_rejected() {
        let err = PlanNode::new(scalar_model(), scalar(0.0), scalar(0.0), 1.5).unwrap_err();
        assert!(matches!(
            err,
            HilqrError::Validation(ValidationError::ProbabilityOutOfRange { .. })
        ));
        assert!(PlanNode::new(scalar_model(), scalar(0.0), scalar(0.0), -0.1).is_err());
    }

    #[test]
    fn placing_as_stage_builds_dynamics() {
        let mut node = PlanNode::new(scalar_model(), scalar(1.0), scalar(0.5), 1.0).unwrap();
        node.place(3, false).unwrap();
        assert_eq!(node.t(), 3);
        let (lin, cost) = node.stage_terms().unwrap();
        assert_relative_eq!(lin.next[0], 1.5);
        assert_relative_eq!(cost.c, 1.25);
    }

    #[test]
    fn relinearize_keeps_nominal() {
        let mut node = PlanNode::new(scalar_model(), scalar(1.0), scalar(0.0), 1.0).unwrap();
        node.place(0, false).unwrap();
        node.relinearize(scalar(4.0), scalar(-1.0)).unwrap();
        assert_relative_eq!(node.x_hat()[0], 4.0);
        assert_relative_eq!(node.u_hat()[0], -1.0);
        assert_relative_eq!(node.x_star()[0], 1.0);
        assert_relative_eq!(node.u_star()[0], 0.0);
        assert!(!node.is_terminal());
    }

    #[test]
    fn control_law() {
        let mut node = PlanNode::new(scalar_model(), scalar(1.0), scalar(0.2), 1.0).unwrap();
        node.place(0, false).unwrap();
        node.set_backup(
            Gains {
                feedback: DMatrix::from_element(1, 1, -0.5),
                feedforward: scalar(0.4),
            },
            DMatrix::zeros(2, 2),
        );
        // u = 0.2 - 0.5 * (3 - 1) + alpha * 0.4
        assert_relative_eq!(node.compute_control(&scalar(3.0))[0], -0.4);
        assert_relative_eq!(node.compute_control_stepsize(&scalar(3.0), 0.5)[0], -0.6);
        assert_relative_eq!(node.compute_control_stepsize(&scalar(1.0), 0.0)[0], 0.2);
    }

    #[test]
    fn display_mentions_probability() {
        let node = PlanNode::new(scalar_model(), scalar(1.0), scalar(0.0), 0.25).unwrap();
        assert!(node.to_string().contains("p=0.25"));
    }
}
