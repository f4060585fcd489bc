//! Probability-weighted Bellman backup.
//!
//! A node with successors `i` (probability `w_i`, value `V_i`) forms the
//! expected Q-function over the extended state
//!
//! ```text
//! Qzz = sum_i w_i (Qe_i + Ae_i^T V_i Ae_i)
//! Qzu = sum_i w_i (Pe_i + Ae_i^T V_i Be_i)
//! S   = sum_i w_i (R_i  + Be_i^T V_i Be_i) + mu I
//! ```
//!
//! and minimizes it once: `L = -S^{-1} Qzu^T = [K | k]`. The expectation is
//! taken before the minimization, so every successor shares one gain. The
//! node value is then the weighted sum of per-successor contributions under
//! that gain:
//!
//! ```text
//! V = sum_i w_i (Qe_i + Ae_i^T V_i Ae_i + (Pe_i + Ae_i^T V_i Be_i) L)
//! ```
//!
//! For a tree node all successors share the node's own cost and dynamics. A
//! hindsight root has one set per branch.

use hilqr_core::error::NumericalError;
use hilqr_core::types::{Dims, Linearization, StageExpansion};
use nalgebra::{DMatrix, DVector};

use crate::model::{extended_cost, extended_dynamics};

/// One outcome of a node: the local model leading into it and its value.
#[derive(Clone, Copy, Debug)]
pub struct Successor<'a> {
    pub probability: f64,
    pub cost: &'a StageExpansion,
    pub dynamics: &'a Linearization,
    /// Expansion state of the successor node.
    pub x_next: &'a DVector<f64>,
    /// Value matrix of the successor node.
    pub value: &'a DMatrix<f64>,
}

/// Affine control law `du = K dx + k`.
#[derive(Clone, Debug, PartialEq)]
pub struct Gains {
    /// `K`, m x n.
    pub feedback: DMatrix<f64>,
    /// `k`, m.
    pub feedforward: DVector<f64>,
}

impl Gains {
    /// Split an extended gain `[K | k]`.
    pub fn from_extended(l: &DMatrix<f64>) -> Self {
        let n = l.ncols().saturating_sub(1);
        Self {
            feedback: l.columns(0, n).clone_owned(),
            feedforward: l.column(n).clone_owned(),
        }
    }

    /// The extended gain `[K | k]`, m x (n+1).
    pub fn extended(&self) -> DMatrix<f64> {
        let (m, n) = self.feedback.shape();
        let mut l = DMatrix::zeros(m, n + 1);
        l.view_mut((0, 0), (m, n)).copy_from(&self.feedback);
        l.column_mut(n).copy_from(&self.feedforward);
        l
    }
}

/// Result of backing up one node.
#[derive(Clone, Debug)]
pub struct Backup {
    pub gains: Gains,
    pub value: DMatrix<f64>,
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

struct Aggregate {
    qzu: DMatrix<f64>,
    s: DMatrix<f64>,
}

fn aggregate(dims: Dims, successors: &[Successor<'_>], mu: f64) -> Aggregate {
    let n1 = dims.extended();
    let m = dims.control;
    let mut qzu = DMatrix::zeros(n1, m);
    let mut s = DMatrix::zeros(m, m);

    for succ in successors {
        let (_, pe) = extended_cost(succ.cost);
        let (ae, be) = extended_dynamics(succ.dynamics, succ.x_next);
        let vbe = succ.value * &be;
        qzu += (pe + ae.transpose() * &vbe) * succ.probability;
        s += (&succ.cost.r + be.transpose() * &vbe) * succ.probability;
    }
    for i in 0..m {
        s[(i, i)] += mu;
    }
    Aggregate { qzu, s }
}

/// The damped control Hessian `S` of a node.
pub fn control_hessian(dims: Dims, successors: &[Successor<'_>], mu: f64) -> DMatrix<f64> {
    aggregate(dims, successors, mu).s
}

/// Value contribution of one successor under a fixed gain, before weighting.
pub fn child_contribution(succ: &Successor<'_>, gains: &Gains) -> DMatrix<f64> {
    let (qe, pe) = extended_cost(succ.cost);
    let (ae, be) = extended_dynamics(succ.dynamics, succ.x_next);
    let vae = succ.value * &ae;
    let vbe = succ.value * &be;
    let cross = pe + ae.transpose() * vbe;
    qe + ae.transpose() * vae + cross * gains.extended()
}

/// Back up one node from its successors.
///
/// `node` only labels errors. Fails if `S` is not positive definite or any
/// result is non-finite; there is no retry here.
pub fn bellman_backup(
    dims: Dims,
    successors: &[Successor<'_>],
    mu: f64,
    node: usize,
) -> Result<Backup, NumericalError> {
    let Aggregate { qzu, s } = aggregate(dims, successors, mu);
    if s.iter().any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite {
            what: "control Hessian",
        });
    }

    let chol = s
        .cholesky()
        .ok_or(NumericalError::SingularControlHessian { node })?;
    let l = -chol.solve(&qzu.transpose());
    if l.iter().any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite { what: "gains" });
    }
    let gains = Gains::from_extended(&l);

    let n1 = dims.extended();
    let mut value = DMatrix::zeros(n1, n1);
    for succ in successors {
        value += child_contribution(succ, &gains) * succ.probability;
    }
    let value = (&value + value.transpose()) * 0.5;
    if value.iter().any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite { what: "value" });
    }

    Ok(Backup { gains, value })
}

/// Single-successor backup: the ordinary iLQR step `V_t` from `V_{t+1}`.
pub fn bellman_step(
    dims: Dims,
    cost: &StageExpansion,
    dynamics: &Linearization,
    x_next: &DVector<f64>,
    value_next: &DMatrix<f64>,
    mu: f64,
    node: usize,
) -> Result<Backup, NumericalError> {
    let succ = Successor {
        probability: 1.0,
        cost,
        dynamics,
        x_next,
        value: value_next,
    };
    bellman_backup(dims, &[succ], mu, node)
}
