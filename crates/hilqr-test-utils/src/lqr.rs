//! Linear-quadratic fixtures with closed-form references.
//!
//! Costs use the unscaled convention `x^T Q x + u^T R u`, so the optimal
//! cost-to-go from `x` is `x^T P x`.

use hilqr_core::traits::{Dynamics, StageCost, TerminalCost};
use hilqr_core::types::{Linearization, StageExpansion, TerminalExpansion};
use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// LinearQuadratic
// ---------------------------------------------------------------------------

/// `x' = A x + B u` with stage cost `x^T Q x + u^T R u` and terminal cost
/// `x^T Qf x`. Derivatives are exact.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearQuadratic {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub qf: DMatrix<f64>,
}

impl LinearQuadratic {
    /// The scalar problem `x' = x + u`, `c = x^2 + u^2`, `cf = x^2`.
    pub fn scalar_integrator() -> Self {
        let one = DMatrix::from_element(1, 1, 1.0);
        Self {
            a: one.clone(),
            b: one.clone(),
            q: one.clone(),
            r: one.clone(),
            qf: one,
        }
    }

    /// Double integrator with time step `dt`: state `[p, v]`, control `a`.
    pub fn double_integrator(dt: f64) -> Self {
        Self {
            a: DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            b: DMatrix::from_column_slice(2, 1, &[0.5 * dt * dt, dt]),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.1])),
            r: DMatrix::from_element(1, 1, 0.01),
            qf: DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 1.0])),
        }
    }
}

fn quad(m: &DMatrix<f64>, v: &DVector<f64>) -> f64 {
    (v.transpose() * m * v)[0]
}

impl Dynamics for LinearQuadratic {
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        &self.a * x + &self.b * u
    }

    fn linearize(&self, x: &DVector<f64>, u: &DVector<f64>) -> Linearization {
        Linearization {
            a: self.a.clone(),
            b: self.b.clone(),
            next: self.step(x, u),
        }
    }
}

impl StageCost for LinearQuadratic {
    fn cost(&self, x: &DVector<f64>, u: &DVector<f64>, _t: usize) -> f64 {
        quad(&self.q, x) + quad(&self.r, u)
    }

    fn quadratize(&self, x: &DVector<f64>, u: &DVector<f64>, t: usize) -> StageExpansion {
        StageExpansion {
            q: &self.q * 2.0,
            r: &self.r * 2.0,
            p: DMatrix::zeros(x.len(), u.len()),
            b_x: &self.q * x * 2.0,
            b_u: &self.r * u * 2.0,
            c: StageCost::cost(self, x, u, t),
        }
    }
}

impl TerminalCost for LinearQuadratic {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        quad(&self.qf, x)
    }

    fn quadratize(&self, x: &DVector<f64>) -> TerminalExpansion {
        TerminalExpansion {
            q: &self.qf * 2.0,
            b_x: &self.qf * x * 2.0,
            c: TerminalCost::cost(self, x),
        }
    }
}

// ---------------------------------------------------------------------------
// Riccati reference
// ---------------------------------------------------------------------------

/// Finite-horizon discrete LQR solution.
#[derive(Debug, Clone)]
pub struct RiccatiSolution {
    /// `K_t` for `t = 0..T`, with `u_t = K_t x_t`.
    pub gains: Vec<DMatrix<f64>>,
    /// `P_t` for `t = 0..=T`.
    pub cost_to_go: Vec<DMatrix<f64>>,
}

impl RiccatiSolution {
    /// Optimal total cost from `x0`.
    pub fn optimal_cost(&self, x0: &DVector<f64>) -> f64 {
        self.cost_to_go.first().map_or(0.0, |p| quad(p, x0))
    }

    /// Closed-loop states `x_0..=x_T` from `x0`.
    pub fn rollout(&self, lq: &LinearQuadratic, x0: &DVector<f64>) -> Vec<DVector<f64>> {
        let mut states = vec![x0.clone()];
        let mut x = x0.clone();
        for k in &self.gains {
            let u = k * &x;
            x = &lq.a * &x + &lq.b * u;
            states.push(x.clone());
        }
        states
    }
}

/// Backward Riccati recursion over `horizon` steps.
///
/// Returns `None` if `R + B^T P B` is singular at some step.
pub fn riccati(lq: &LinearQuadratic, horizon: usize) -> Option<RiccatiSolution> {
    let mut p = lq.qf.clone();
    let mut gains = Vec::with_capacity(horizon);
    let mut cost_to_go = vec![p.clone()];
    for _ in 0..horizon {
        let s = &lq.r + lq.b.transpose() * &p * &lq.b;
        let k = -s.try_inverse()? * lq.b.transpose() * &p * &lq.a;
        let closed = &lq.a + &lq.b * &k;
        p = &lq.q + k.transpose() * &lq.r * &k + closed.transpose() * &p * &closed;
        gains.push(k);
        cost_to_go.push(p.clone());
    }
    gains.reverse();
    cost_to_go.reverse();
    Some(RiccatiSolution { gains, cost_to_go })
}

/// Scalar recursion for `x' = x + u`, `c = x^2 + u^2`, `cf = x^2`:
/// `P_T = 1`, `P_t = 1 + P - P^2 / (1 + P)`, `K_t = -P / (1 + P)` with
/// `P = P_{t+1}`. Returns `(K_0..K_{T-1}, P_0..P_T)`.
pub fn riccati_scalar(horizon: usize) -> (Vec<f64>, Vec<f64>) {
    let mut p = 1.0;
    let mut gains = Vec::with_capacity(horizon);
    let mut values = vec![p];
    for _ in 0..horizon {
        gains.push(-p / (1.0 + p));
        p = 1.0 + p - p * p / (1.0 + p);
        values.push(p);
    }
    gains.reverse();
    values.reverse();
    (gains, values)
}
