//! Central finite differences.
//!
//! Backs the default differentiation methods of the model traits. All
//! routines work on a flat argument vector; callers split `[x; u]` blocks
//! themselves.

use nalgebra::{DMatrix, DVector};

/// Step used for first derivatives (Jacobians, gradients).
pub const FIRST_ORDER_STEP: f64 = 1e-5;

/// Step used for second derivatives. Larger than the first-order step because
/// the Hessian stencil divides by `h^2`.
pub const SECOND_ORDER_STEP: f64 = 1e-4;

/// Jacobian of a vector-valued function at `w`, one column per input.
pub fn jacobian<F>(f: F, w: &DVector<f64>) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let h = FIRST_ORDER_STEP;
    let cols = w.len();
    let mut probe = w.clone();
    let mut columns = Vec::with_capacity(cols);

    for j in 0..cols {
        probe[j] = w[j] + h;
        let plus = f(&probe);
        probe[j] = w[j] - h;
        let minus = f(&probe);
        probe[j] = w[j];
        columns.push((plus - minus) / (2.0 * h));
    }

    if columns.is_empty() {
        let rows = f(w).len();
        return DMatrix::zeros(rows, 0);
    }
    DMatrix::from_columns(&columns)
}

/// Gradient of a scalar function at `w`.
pub fn gradient<F>(f: F, w: &DVector<f64>) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> f64,
{
    let h = FIRST_ORDER_STEP;
    let mut probe = w.clone();
    DVector::from_fn(w.len(), |i, _| {
        probe[i] = w[i] + h;
        let plus = f(&probe);
        probe[i] = w[i] - h;
        let minus = f(&probe);
        probe[i] = w[i];
        (plus - minus) / (2.0 * h)
    })
}

/// Hessian of a scalar function at `w` (symmetric by construction).
///
/// Uses the four-point mixed stencil
/// `(f(++) - f(+-) - f(-+) + f(--)) / 4h^2`, which on the diagonal reduces to
/// the second difference with step `2h`.
pub fn hessian<F>(f: F, w: &DVector<f64>) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> f64,
{
    let h = SECOND_ORDER_STEP;
    let n = w.len();
    let mut hess = DMatrix::zeros(n, n);
    let mut probe = w.clone();

    let mut eval = |i: usize, si: f64, j: usize, sj: f64| {
        probe[i] += si * h;
        probe[j] += sj * h;
        let v = f(&probe);
        probe[i] = w[i];
        probe[j] = w[j];
        v
    };

    for i in 0..n {
        for j in i..n {
            let pp = eval(i, 1.0, j, 1.0);
            let pm = eval(i, 1.0, j, -1.0);
            let mp = eval(i, -1.0, j, 1.0);
            let mm = eval(i, -1.0, j, -1.0);
            let v = (pp - pm - mp + mm) / (4.0 * h * h);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }

    hess
}
