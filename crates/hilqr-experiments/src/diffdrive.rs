//! Differential-drive (unicycle) robot.

use hilqr_core::traits::Dynamics;
use hilqr_core::types::{Dims, Linearization};
use nalgebra::{DMatrix, DVector};

/// State: `[x, y, theta]`.
pub const STATE_DIM: usize = 3;
/// Control: `[v, omega]`.
pub const CONTROL_DIM: usize = 2;

/// Forward-Euler differential drive:
///
/// ```text
/// x'     = x + dt v cos(theta)
/// y'     = y + dt v sin(theta)
/// theta' = theta + dt omega
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffDrive {
    pub dt: f64,
}

impl DiffDrive {
    pub const fn new(dt: f64) -> Self {
        Self { dt }
    }

    pub const fn dims() -> Dims {
        Dims::new(STATE_DIM, CONTROL_DIM)
    }
}

impl Dynamics for DiffDrive {
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let (sin, cos) = x[2].sin_cos();
        DVector::from_vec(vec![
            x[0] + self.dt * u[0] * cos,
            x[1] + self.dt * u[0] * sin,
            x[2] + self.dt * u[1],
        ])
    }

    fn linearize(&self, x: &DVector<f64>, u: &DVector<f64>) -> Linearization {
        let (sin, cos) = x[2].sin_cos();
        let dt = self.dt;
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(3, 3, &[
            1.0, 0.0, -dt * u[0] * sin,
            0.0, 1.0,  dt * u[0] * cos,
            0.0, 0.0,  1.0,
        ]);
        #[rustfmt::skip]
        let b = DMatrix::from_row_slice(3, 2, &[
            dt * cos, 0.0,
            dt * sin, 0.0,
            0.0,      dt,
        ]);
        Linearization {
            a,
            b,
            next: self.step(x, u),
        }
    }
}
