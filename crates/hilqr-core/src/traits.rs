//! Capability traits for user-supplied models.
//!
//! The optimizer only ever evaluates and differentiates models through these
//! traits. Each trait has a finite-difference default for its derivative
//! method; analytic models override it. Plain closures implement the traits
//! directly.

use nalgebra::DVector;

use crate::diff;
use crate::types::{Linearization, StageExpansion, TerminalExpansion};

// ---------------------------------------------------------------------------
// Dynamics
// ---------------------------------------------------------------------------

/// Discrete-time dynamics `x' = f(x, u)`.
pub trait Dynamics: Send + Sync {
    /// Advance one step.
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// First-order sensitivities at `(x, u)`.
    fn linearize(&self, x: &DVector<f64>, u: &DVector<f64>) -> Linearization {
        let n = x.len();
        let m = u.len();
        let w = stack(x, u);
        let jac = diff::jacobian(
            |w| self.step(&w.rows(0, n).clone_owned(), &w.rows(n, m).clone_owned()),
            &w,
        );
        Linearization {
            a: jac.columns(0, n).clone_owned(),
            b: jac.columns(n, m).clone_owned(),
            next: self.step(x, u),
        }
    }
}

impl<F> Dynamics for F
where
    F: Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + Send + Sync,
{
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        self(x, u)
    }
}

// ---------------------------------------------------------------------------
// StageCost
// ---------------------------------------------------------------------------

/// Running cost `c(x, u, t)`.
pub trait StageCost: Send + Sync {
    fn cost(&self, x: &DVector<f64>, u: &DVector<f64>, t: usize) -> f64;

    /// Second-order expansion at `(x, u)`.
    fn quadratize(&self, x: &DVector<f64>, u: &DVector<f64>, t: usize) -> StageExpansion {
        let n = x.len();
        let m = u.len();
        let w = stack(x, u);
        let f = |w: &DVector<f64>| {
            StageCost::cost(self, &w.rows(0, n).clone_owned(), &w.rows(n, m).clone_owned(), t)
        };
        let g = diff::gradient(f, &w);
        let h = diff::hessian(f, &w);
        StageExpansion {
            q: h.view((0, 0), (n, n)).clone_owned(),
            r: h.view((n, n), (m, m)).clone_owned(),
            p: h.view((0, n), (n, m)).clone_owned(),
            b_x: g.rows(0, n).clone_owned(),
            b_u: g.rows(n, m).clone_owned(),
            c: StageCost::cost(self, x, u, t),
        }
    }
}

impl<F> StageCost for F
where
    F: Fn(&DVector<f64>, &DVector<f64>, usize) -> f64 + Send + Sync,
{
    fn cost(&self, x: &DVector<f64>, u: &DVector<f64>, t: usize) -> f64 {
        self(x, u, t)
    }
}

// ---------------------------------------------------------------------------
// TerminalCost
// ---------------------------------------------------------------------------

/// Final cost `cf(x)`.
pub trait TerminalCost: Send + Sync {
    fn cost(&self, x: &DVector<f64>) -> f64;

    /// Second-order expansion at `x`.
    fn quadratize(&self, x: &DVector<f64>) -> TerminalExpansion {
        let f = |x: &DVector<f64>| TerminalCost::cost(self, x);
        TerminalExpansion {
            q: diff::hessian(f, x),
            b_x: diff::gradient(f, x),
            c: TerminalCost::cost(self, x),
        }
    }
}

impl<F> TerminalCost for F
where
    F: Fn(&DVector<f64>) -> f64 + Send + Sync,
{
    fn cost(&self, x: &DVector<f64>) -> f64 {
        self(x)
    }
}

fn stack(x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(x.len() + u.len(), x.iter().chain(u.iter()).copied())
}
