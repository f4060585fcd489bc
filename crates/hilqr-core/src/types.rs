use nalgebra::{DMatrix, DVector};

use crate::error::ValidationError;

/// State vector, dimension `n`.
pub type State = DVector<f64>;

/// Control vector, dimension `m`.
pub type Control = DVector<f64>;

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// State and control dimensions fixed for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub state: usize,
    pub control: usize,
}

impl Dims {
    pub const fn new(state: usize, control: usize) -> Self {
        Self { state, control }
    }

    /// Extended state dimension `n + 1` used by value matrices.
    pub const fn extended(&self) -> usize {
        self.state + 1
    }

    pub fn check_state(&self, x: &DVector<f64>) -> Result<(), ValidationError> {
        if x.len() == self.state {
            Ok(())
        } else {
            Err(ValidationError::StateDimMismatch {
                expected: self.state,
                got: x.len(),
            })
        }
    }

    pub fn check_control(&self, u: &DVector<f64>) -> Result<(), ValidationError> {
        if u.len() == self.control {
            Ok(())
        } else {
            Err(ValidationError::ControlDimMismatch {
                expected: self.control,
                got: u.len(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Taylor terms
// ---------------------------------------------------------------------------

/// First-order dynamics approximation around `(x, u)`:
/// `f(x + dx, u + du) ~ next + A dx + B du`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    /// `df/dx`, n x n.
    pub a: DMatrix<f64>,
    /// `df/du`, n x m.
    pub b: DMatrix<f64>,
    /// `f(x, u)`.
    pub next: DVector<f64>,
}

/// Second-order stage-cost approximation around `(x, u)`:
///
/// ```text
/// c(x + dx, u + du) ~ c + b_x^T dx + b_u^T du
///                     + 1/2 dx^T Q dx + dx^T P du + 1/2 du^T R du
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StageExpansion {
    /// n x n.
    pub q: DMatrix<f64>,
    /// m x m.
    pub r: DMatrix<f64>,
    /// n x m cross term.
    pub p: DMatrix<f64>,
    pub b_x: DVector<f64>,
    pub b_u: DVector<f64>,
    /// Cost at the expansion point.
    pub c: f64,
}

/// Second-order terminal-cost approximation around `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalExpansion {
    /// n x n.
    pub q: DMatrix<f64>,
    pub b_x: DVector<f64>,
    /// Cost at the expansion point.
    pub c: f64,
}

fn check_shape(
    what: &'static str,
    m: &DMatrix<f64>,
    expected: (usize, usize),
) -> Result<(), ValidationError> {
    if m.shape() == expected {
        Ok(())
    } else {
        Err(ValidationError::ShapeMismatch {
            what,
            expected,
            got: m.shape(),
        })
    }
}

fn all_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

impl Linearization {
    pub fn is_finite(&self) -> bool {
        all_finite(&self.a) && all_finite(&self.b) && self.next.iter().all(|v| v.is_finite())
    }

    /// `next` in state space, `A` n x n, `B` n x m.
    pub fn check_dims(&self, dims: Dims) -> Result<(), ValidationError> {
        dims.check_state(&self.next)?;
        check_shape("dynamics A", &self.a, (dims.state, dims.state))?;
        check_shape("dynamics B", &self.b, (dims.state, dims.control))
    }
}

impl StageExpansion {
    pub fn is_finite(&self) -> bool {
        self.c.is_finite()
            && all_finite(&self.q)
            && all_finite(&self.r)
            && all_finite(&self.p)
            && self.b_x.iter().all(|v| v.is_finite())
            && self.b_u.iter().all(|v| v.is_finite())
    }

    pub fn check_dims(&self, dims: Dims) -> Result<(), ValidationError> {
        let (n, m) = (dims.state, dims.control);
        check_shape("stage cost Q", &self.q, (n, n))?;
        check_shape("stage cost R", &self.r, (m, m))?;
        check_shape("stage cost P", &self.p, (n, m))?;
        dims.check_state(&self.b_x)?;
        dims.check_control(&self.b_u)
    }
}

impl TerminalExpansion {
    pub fn is_finite(&self) -> bool {
        self.c.is_finite() && all_finite(&self.q) && self.b_x.iter().all(|v| v.is_finite())
    }

    pub fn check_dims(&self, dims: Dims) -> Result<(), ValidationError> {
        check_shape("terminal cost Q", &self.q, (dims.state, dims.state))?;
        dims.check_state(&self.b_x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_checks() {
        let dims = Dims::new(3, 2);
        assert_eq!(dims.extended(), 4);
        assert!(dims.check_state(&DVector::zeros(3)).is_ok());
        assert_eq!(
            dims.check_state(&DVector::zeros(2)),
            Err(ValidationError::StateDimMismatch {
                expected: 3,
                got: 2
            })
        );
        assert_eq!(
            dims.check_control(&DVector::zeros(1)),
            Err(ValidationError::ControlDimMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn expansion_shapes_checked() {
        let dims = Dims::new(2, 1);
        let mut lin = Linearization {
            a: DMatrix::identity(2, 2),
            b: DMatrix::zeros(2, 1),
            next: DVector::zeros(2),
        };
        assert!(lin.check_dims(dims).is_ok());
        lin.next = DVector::zeros(3);
        assert_eq!(
            lin.check_dims(dims),
            Err(ValidationError::StateDimMismatch {
                expected: 2,
                got: 3
            })
        );
        lin.next = DVector::zeros(2);
        lin.b = DMatrix::zeros(2, 2);
        assert_eq!(
            lin.check_dims(dims),
            Err(ValidationError::ShapeMismatch {
                what: "dynamics B",
                expected: (2, 1),
                got: (2, 2)
            })
        );

        let stage = StageExpansion {
            q: DMatrix::identity(2, 2),
            r: DMatrix::identity(1, 1),
            p: DMatrix::zeros(1, 1),
            b_x: DVector::zeros(2),
            b_u: DVector::zeros(1),
            c: 0.0,
        };
        assert!(matches!(
            stage.check_dims(dims),
            Err(ValidationError::ShapeMismatch { what: "stage cost P", .. })
        ));

        let term = TerminalExpansion {
            q: DMatrix::identity(2, 2),
            b_x: DVector::zeros(1),
            c: 0.0,
        };
        assert!(matches!(
            term.check_dims(dims),
            Err(ValidationError::StateDimMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn non_finite_terms_detected() {
        let mut lin = Linearization {
            a: DMatrix::identity(2, 2),
            b: DMatrix::zeros(2, 1),
            next: DVector::zeros(2),
        };
        assert!(lin.is_finite());
        lin.a[(1, 0)] = f64::NAN;
        assert!(!lin.is_finite());

        let term = TerminalExpansion {
            q: DMatrix::identity(1, 1),
            b_x: DVector::from_vec(vec![f64::INFINITY]),
            c: 0.0,
        };
        assert!(!term.is_finite());
    }
}
