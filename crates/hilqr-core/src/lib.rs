// hilqr-core: errors, configuration, model traits and shared types for tree-structured iLQR.

pub mod config;
pub mod diff;
pub mod error;
pub mod traits;
pub mod types;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::SolverConfig;
    pub use crate::error::{ConfigError, HilqrError, NumericalError, ValidationError};
    pub use crate::traits::{Dynamics, StageCost, TerminalCost};
    pub use crate::types::{
        Control, Dims, Linearization, StageExpansion, State, TerminalExpansion,
    };
}
