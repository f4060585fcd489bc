use thiserror::Error;

/// Top-level error type for hilqr.
#[derive(Debug, Error)]
pub enum HilqrError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Numerical error: {0}")]
    Numerical(#[from] NumericalError),
}

impl HilqrError {
    /// Whether the solver loop may recover from this error by raising damping.
    pub const fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Problem-setup validation errors.
///
/// Copy + plain data for cheap propagation from insertion paths.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ValidationError {
    #[error("Probabilities sum to {sum}, expected 1 within {tolerance}")]
    ProbabilitySum { sum: f64, tolerance: f64 },

    #[error("Probability out of range: {value} not in [0, 1]")]
    ProbabilityOutOfRange { value: f64 },

    #[error("State dimension mismatch: expected {expected}, got {got}")]
    StateDimMismatch { expected: usize, got: usize },

    #[error("Control dimension mismatch: expected {expected}, got {got}")]
    ControlDimMismatch { expected: usize, got: usize },

    #[error("Shape mismatch in {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Split set is empty")]
    EmptySplits,

    #[error("Child batch is empty")]
    EmptyChildren,

    #[error("Node {id} already has children")]
    ChildrenAlreadySet { id: usize },

    #[error("Tree has no root")]
    EmptyTree,

    #[error("Node not found: {id}")]
    NodeNotFound { id: usize },

    #[error("Branch out of range: {branch} >= {branches}")]
    BranchOutOfRange { branch: usize, branches: usize },

    #[error("Timestep out of range: {t} >= {horizon}")]
    TimestepOutOfRange { t: usize, horizon: usize },

    #[error("Horizon must be at least 1")]
    ZeroHorizon,

    #[error("Distribution has no mass")]
    DegenerateDistribution,
}

/// Numerical breakdown inside a backward pass or model expansion.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum NumericalError {
    #[error("Control Hessian is singular at node {node}")]
    SingularControlHessian { node: usize },

    #[error("Non-finite values in {what}")]
    NonFinite { what: &'static str },

    #[error("Damping exhausted: mu={mu} exceeds mu_max={mu_max}")]
    DampingExhausted { mu: f64, mu_max: f64 },
}
