//! Obstacle-avoidance experiments for hindsight planning.
//!
//! A differential-drive robot drives to a goal past an obstacle that may not
//! exist. Policies differ in how they plan under that uncertainty; see
//! [`PolicyType`]. [`run_closed_loop`] replans every step and reports the
//! cost realized in the true world.

pub mod config;
pub mod cost;
pub mod diffdrive;
pub mod error;
pub mod policy;
pub mod runner;
pub mod world;

pub use config::ExperimentConfig;
pub use cost::{CostWeights, GoalCost, WorldCost};
pub use diffdrive::{CONTROL_DIM, DiffDrive, STATE_DIM};
pub use error::ExperimentError;
pub use policy::PolicyType;
pub use runner::{ExperimentOutcome, compare_policies, run_closed_loop, single_obstacle};
pub use world::{Circle, CircleWorld};
