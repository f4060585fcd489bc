//! Taylor/quadratic model builder.
//!
//! Turns a node's expansion point and its user models into the local
//! approximation terms consumed by the backward pass, and lifts those terms
//! into the extended deviation state `z = [x - x_hat; 1]`:
//!
//! ```text
//! cost:      1/2 z^T Qe z + z^T Pe du + 1/2 du^T R du
//!            Qe = [ Q    b_x ]      Pe = [ P     ]
//!                 [ b_x^T 2c ]           [ b_u^T ]
//!
//! dynamics:  z' = Ae z + Be du
//!            Ae = [ A  f(x_hat, u_hat) - x_hat' ]   Be = [ B ]
//!                 [ 0  1                        ]        [ 0 ]
//! ```
//!
//! where `x_hat'` is the expansion point of the successor node.

use std::fmt;
use std::sync::Arc;

use hilqr_core::error::{HilqrError, NumericalError};
use hilqr_core::traits::{Dynamics, StageCost, TerminalCost};
use hilqr_core::types::{Dims, Linearization, StageExpansion, TerminalExpansion};
use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// NodeModel
// ---------------------------------------------------------------------------

/// The user models attached to a plan node.
///
/// Cheap to clone; every node along a chain usually shares the same models.
#[derive(Clone)]
pub struct NodeModel {
    pub dynamics: Arc<dyn Dynamics>,
    pub cost: Arc<dyn StageCost>,
    pub final_cost: Arc<dyn TerminalCost>,
}

impl NodeModel {
    pub fn new(
        dynamics: impl Dynamics + 'static,
        cost: impl StageCost + 'static,
        final_cost: impl TerminalCost + 'static,
    ) -> Self {
        Self {
            dynamics: Arc::new(dynamics),
            cost: Arc::new(cost),
            final_cost: Arc::new(final_cost),
        }
    }
}

impl fmt::Debug for NodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeModel").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Local approximation held by a node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expansion {
    /// Interior node: linearized dynamics and quadratic stage cost.
    Stage {
        dynamics: Linearization,
        cost: StageExpansion,
    },
    /// Leaf: quadratic terminal cost only.
    Terminal(TerminalExpansion),
}

impl Expansion {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Expand the stage models of `model` around `(x, u)` at time `t`.
///
/// Every term must match `dims`; a model producing other shapes is a
/// validation failure.
pub fn expand_stage(
    model: &NodeModel,
    dims: Dims,
    x: &DVector<f64>,
    u: &DVector<f64>,
    t: usize,
) -> Result<Expansion, HilqrError> {
    let dynamics = model.dynamics.linearize(x, u);
    dynamics.check_dims(dims)?;
    if !dynamics.is_finite() {
        return Err(NumericalError::NonFinite {
            what: "dynamics linearization",
        }
        .into());
    }
    let cost = model.cost.quadratize(x, u, t);
    cost.check_dims(dims)?;
    if !cost.is_finite() {
        return Err(NumericalError::NonFinite {
            what: "stage cost expansion",
        }
        .into());
    }
    Ok(Expansion::Stage { dynamics, cost })
}

/// Expand the terminal cost of `model` around `x`.
pub fn expand_terminal(
    model: &NodeModel,
    dims: Dims,
    x: &DVector<f64>,
) -> Result<Expansion, HilqrError> {
    let cost = model.final_cost.quadratize(x);
    cost.check_dims(dims)?;
    if !cost.is_finite() {
        return Err(NumericalError::NonFinite {
            what: "terminal cost expansion",
        }
        .into());
    }
    Ok(Expansion::Terminal(cost))
}

// ---------------------------------------------------------------------------
// Extended-state lifts
// ---------------------------------------------------------------------------

/// `(Qe, Pe)` for a stage cost.
pub fn extended_cost(cost: &StageExpansion) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = cost.q.nrows();
    let m = cost.r.nrows();

    let mut qe = DMatrix::zeros(n + 1, n + 1);
    qe.view_mut((0, 0), (n, n)).copy_from(&cost.q);
    qe.view_mut((0, n), (n, 1)).copy_from(&cost.b_x);
    qe.view_mut((n, 0), (1, n)).copy_from(&cost.b_x.transpose());
    qe[(n, n)] = 2.0 * cost.c;

    let mut pe = DMatrix::zeros(n + 1, m);
    pe.view_mut((0, 0), (n, m)).copy_from(&cost.p);
    pe.view_mut((n, 0), (1, m)).copy_from(&cost.b_u.transpose());

    (qe, pe)
}

/// `(Ae, Be)` for dynamics linearized at the parent, mapping into the
/// deviation coordinates of a successor expanded at `x_hat_next`.
pub fn extended_dynamics(
    dynamics: &Linearization,
    x_hat_next: &DVector<f64>,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = dynamics.a.nrows();
    let m = dynamics.b.ncols();

    let mut ae = DMatrix::zeros(n + 1, n + 1);
    ae.view_mut((0, 0), (n, n)).copy_from(&dynamics.a);
    ae.view_mut((0, n), (n, 1))
        .copy_from(&(&dynamics.next - x_hat_next));
    ae[(n, n)] = 1.0;

    let mut be = DMatrix::zeros(n + 1, m);
    be.view_mut((0, 0), (n, m)).copy_from(&dynamics.b);

    (ae, be)
}

/// Value matrix of a leaf: the terminal cost quadratic in extended form.
pub fn terminal_value(cost: &TerminalExpansion) -> DMatrix<f64> {
    let n = cost.q.nrows();
    let mut v = DMatrix::zeros(n + 1, n + 1);
    v.view_mut((0, 0), (n, n)).copy_from(&cost.q);
    v.view_mut((0, n), (n, 1)).copy_from(&cost.b_x);
    v.view_mut((n, 0), (1, n)).copy_from(&cost.b_x.transpose());
    v[(n, n)] = 2.0 * cost.c;
    v
}
