//! Goal inference for hindsight planning.
//!
//! A [`GoalPredictor`] turns observed behavior into probabilities over
//! discrete hypotheses, which become the split probabilities of the next plan.

pub mod goal;

pub use goal::{GoalPredictor, log_sum_exp};
