//! Tree-structured iLQR for contingency planning.
//!
//! This crate optimizes feedback policies over a scenario tree whose branches
//! are alternative futures with known probabilities:
//!
//! 1. **Model builder**: linearizes dynamics and quadratizes costs at every
//!    node's expansion point, lifted to the extended state `[x - x_hat; 1]`
//! 2. **Bellman backup**: leaves-to-root recursion; a node's gain minimizes
//!    the probability-weighted Q-function of all its successors
//! 3. **Forward pass**: rolls the policy out under the true models with a
//!    feedforward step size `alpha`, accumulating the expected realized cost
//! 4. **Solver loop**: alternates both passes with Levenberg-Marquardt
//!    damping and a backtracking line search
//!
//! # Structures
//!
//! [`PlanTree`] handles arbitrary branching. [`HindsightSolver`] is the
//! special case that branches once, right after the first control, into one
//! chain per [`HindsightSplit`].

pub mod backup;
pub mod hindsight;
pub mod model;
pub mod node;
pub mod solver;
pub mod tree;

pub use backup::{Backup, Gains, Successor, bellman_backup, bellman_step, control_hessian};
pub use hindsight::{BranchRollout, HindsightSolver, HindsightSplit, SPLIT_TOLERANCE};
pub use model::{Expansion, NodeModel};
pub use node::PlanNode;
pub use solver::{IlqrProblem, SolveReport, SolverState, solve};
pub use tree::{PROBABILITY_TOLERANCE, PlanTree, TreeRollout};

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::{
        HindsightSolver, HindsightSplit, NodeModel, PlanNode, PlanTree, SolveReport,
    };
    pub use hilqr_core::prelude::*;
    pub use hilqr_tree::NodeId;
}
