use hilqr_core::error::{ConfigError, HilqrError, ValidationError};
use thiserror::Error;

/// Errors raised while setting up or running an experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Solver error: {0}")]
    Solver(#[from] HilqrError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown policy: {0} (expected one of hindsight, ilqr_true, argmax, weighted)")]
    UnknownPolicy(String),
}
