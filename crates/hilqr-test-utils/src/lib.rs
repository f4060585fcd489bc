//! Shared test fixtures and utilities for hilqr crates.
//!
//! Provides deterministic RNG setup, random well-conditioned matrices, and
//! linear-quadratic problems with closed-form Riccati references.

pub mod lqr;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use lqr::{LinearQuadratic, RiccatiSolution, riccati, riccati_scalar};
pub use rng::{random_matrix, random_spd, random_vector, seeded_rng};
