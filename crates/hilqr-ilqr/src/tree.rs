//! Scenario tree of plan nodes with probability-weighted passes.

use std::collections::BTreeSet;

use hilqr_core::config::SolverConfig;
use hilqr_core::error::{HilqrError, NumericalError, ValidationError};
use hilqr_core::types::{Control, Dims, State};
use hilqr_tree::{NodeId, Tree};
use nalgebra::DVector;
use tracing::debug;

use crate::backup::{Successor, bellman_backup};
use crate::model::NodeModel;
use crate::node::PlanNode;
use crate::solver::{IlqrProblem, SolveReport, solve};

/// Sibling probabilities must sum to one within this tolerance.
pub const PROBABILITY_TOLERANCE: f64 = 1e-5;

/// Check that a batch of sibling probabilities forms a distribution.
pub fn check_distribution(
    probabilities: impl IntoIterator<Item = f64>,
    tolerance: f64,
) -> Result<(), ValidationError> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for p in probabilities {
        if !(0.0..=1.0).contains(&p) {
            return Err(ValidationError::ProbabilityOutOfRange { value: p });
        }
        sum += p;
        count += 1;
    }
    if count == 0 {
        return Err(ValidationError::EmptyChildren);
    }
    if (sum - 1.0).abs() > tolerance {
        return Err(ValidationError::ProbabilitySum { sum, tolerance });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rollout
// ---------------------------------------------------------------------------

/// Realized trajectory over every node of a tree.
///
/// Indexed by [`NodeId::index`]. Leaves carry their expansion control, which
/// is never applied.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeRollout {
    pub states: Vec<State>,
    pub controls: Vec<Control>,
    /// Expected realized cost: every node's true cost weighted by the
    /// probability of reaching it.
    pub cost: f64,
}

impl TreeRollout {
    pub fn state(&self, id: NodeId) -> Option<&State> {
        self.states.get(id.index())
    }

    pub fn control(&self, id: NodeId) -> Option<&Control> {
        self.controls.get(id.index())
    }
}

// ---------------------------------------------------------------------------
// PlanTree
// ---------------------------------------------------------------------------

/// Tree-structured iLQR problem.
///
/// Every node uses its own dynamics to reach all of its children. Leaves
/// carry the terminal cost of their model; every other node carries its
/// stage cost with `t` equal to its depth.
#[derive(Clone, Debug)]
pub struct PlanTree {
    dims: Dims,
    tree: Tree<PlanNode>,
}

impl PlanTree {
    pub const fn new(dims: Dims) -> Self {
        Self {
            dims,
            tree: Tree::new(),
        }
    }

    pub const fn dims(&self) -> Dims {
        self.dims
    }

    /// Build a node with this tree's dimensions.
    pub fn make_node(
        &self,
        model: NodeModel,
        x_star: State,
        u_star: Control,
        probability: f64,
    ) -> Result<PlanNode, HilqrError> {
        self.dims.check_state(&x_star)?;
        self.dims.check_control(&u_star)?;
        PlanNode::new(model, x_star, u_star, probability)
    }

    /// Replace the tree with a single root. The root's probability is
    /// ignored and treated as 1.
    pub fn add_root(&mut self, node: PlanNode) -> Result<NodeId, HilqrError> {
        self.check_dims(&node)?;
        let root = self.tree.add_root(node);
        self.tree[root].place(0, true)?;
        Ok(root)
    }

    /// Attach a batch of children under `parent`.
    ///
    /// The batch must be non-empty and its probabilities must sum to one.
    /// A parent takes exactly one batch, so siblings always form a single
    /// distribution.
    pub fn add_children(
        &mut self,
        parent: NodeId,
        nodes: Vec<PlanNode>,
    ) -> Result<Vec<NodeId>, HilqrError> {
        let depth = self
            .tree
            .depth(parent)
            .ok_or(ValidationError::NodeNotFound { id: parent.index() })?;
        if !self.tree.is_leaf(parent) {
            return Err(ValidationError::ChildrenAlreadySet { id: parent.index() }.into());
        }
        check_distribution(nodes.iter().map(PlanNode::probability), PROBABILITY_TOLERANCE)?;
        for node in &nodes {
            self.check_dims(node)?;
        }

        self.tree[parent].place(depth, false)?;
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = self
                .tree
                .add_child(parent, node)
                .map_err(|_| ValidationError::NodeNotFound { id: parent.index() })?;
            self.tree[id].place(depth + 1, true)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Append a chain of `horizon` nodes below `parent`, each reached with
    /// probability one and expanded at `(x_star, u_star)`. Returns the last
    /// node of the chain.
    pub fn add_chain(
        &mut self,
        parent: NodeId,
        model: &NodeModel,
        x_star: &State,
        u_star: &Control,
        horizon: usize,
    ) -> Result<NodeId, HilqrError> {
        let mut tail = parent;
        for _ in 0..horizon {
            let node = self.make_node(model.clone(), x_star.clone(), u_star.clone(), 1.0)?;
            tail = self.add_children(tail, vec![node])?[0];
        }
        Ok(tail)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.tree.leaves()
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent(id)
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.tree.children(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&PlanNode> {
        self.tree.get(id)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Product of edge probabilities from the root down to `id`.
    pub fn path_probability(&self, id: NodeId) -> Option<f64> {
        let path = self.tree.path_to(id).ok()?;
        Some(
            path.iter()
                .skip(1)
                .map(|&n| self.tree[n].probability())
                .product(),
        )
    }

    fn check_dims(&self, node: &PlanNode) -> Result<(), ValidationError> {
        self.dims.check_state(node.x_hat())?;
        self.dims.check_control(node.u_hat())
    }

    // -- backward pass ------------------------------------------------------

    /// Bellman recursion from the leaves to the root.
    ///
    /// Leaves are grouped by parent; a parent is backed up once all of its
    /// children are resolved, then its own parent joins the next frontier.
    pub fn backward_pass(&mut self, mu: f64) -> Result<(), HilqrError> {
        self.tree.root().ok_or(ValidationError::EmptyTree)?;

        let mut resolved = vec![false; self.tree.len()];
        let mut frontier = BTreeSet::new();
        for leaf in self.tree.leaves() {
            resolved[leaf.index()] = true;
            if let Some(parent) = self.tree.parent(leaf) {
                frontier.insert(parent);
            }
        }

        while !frontier.is_empty() {
            let mut next = BTreeSet::new();
            for id in frontier {
                let ready = self
                    .tree
                    .children(id)
                    .iter()
                    .all(|c| resolved[c.index()]);
                if !ready {
                    next.insert(id);
                    continue;
                }
                self.backup_node(id, mu)?;
                resolved[id.index()] = true;
                if let Some(parent) = self.tree.parent(id) {
                    next.insert(parent);
                }
            }
            frontier = next;
        }
        Ok(())
    }

    fn backup_node(&mut self, id: NodeId, mu: f64) -> Result<(), NumericalError> {
        let node = &self.tree[id];
        let (dynamics, cost) = node
            .stage_terms()
            .ok_or(NumericalError::NonFinite {
                what: "interior node without stage expansion",
            })?;
        let successors: Vec<Successor<'_>> = self
            .tree
            .children(id)
            .iter()
            .map(|&c| {
                let child = &self.tree[c];
                Successor {
                    probability: child.probability(),
                    cost,
                    dynamics,
                    x_next: child.x_hat(),
                    value: child.value(),
                }
            })
            .collect();
        let backup = bellman_backup(self.dims, &successors, mu, id.index())?;
        self.tree[id].set_backup(backup.gains, backup.value);
        Ok(())
    }

    // -- forward pass -------------------------------------------------------

    /// Roll the current policy out over every branch from `x0`.
    ///
    /// Deterministic and side-effect free.
    pub fn forward_pass(&self, x0: &State, alpha: f64) -> Result<TreeRollout, HilqrError> {
        let root = self.tree.root().ok_or(ValidationError::EmptyTree)?;
        self.dims.check_state(x0)?;

        let len = self.tree.len();
        let mut states: Vec<Option<State>> = vec![None; len];
        let mut controls: Vec<Option<Control>> = vec![None; len];
        let mut reach = vec![0.0; len];
        states[root.index()] = Some(x0.clone());
        reach[root.index()] = 1.0;

        let mut cost = 0.0;
        for id in self.tree.breadth_first() {
            let node = &self.tree[id];
            let x = states[id.index()]
                .take()
                .ok_or(ValidationError::NodeNotFound { id: id.index() })?;
            let u = node.compute_control_stepsize(&x, alpha);
            let model = node.model();

            if self.tree.is_leaf(id) {
                cost += reach[id.index()] * model.final_cost.cost(&x);
            } else {
                cost += reach[id.index()] * model.cost.cost(&x, &u, node.t());
                let x_next = model.dynamics.step(&x, &u);
                for &child in self.tree.children(id) {
                    states[child.index()] = Some(x_next.clone());
                    reach[child.index()] = reach[id.index()] * self.tree[child].probability();
                }
            }
            states[id.index()] = Some(x);
            controls[id.index()] = Some(u);
        }

        Ok(TreeRollout {
            states: states.into_iter().flatten().collect(),
            controls: controls.into_iter().flatten().collect(),
            cost,
        })
    }

    /// States and controls along the single path from the root to `leaf`.
    pub fn forward_pass_to(
        &self,
        leaf: NodeId,
        x0: &State,
        alpha: f64,
    ) -> Result<(Vec<State>, Vec<Control>), HilqrError> {
        self.dims.check_state(x0)?;
        let path = self
            .tree
            .path_to(leaf)
            .map_err(|_| ValidationError::NodeNotFound { id: leaf.index() })?;
        let mut states = Vec::with_capacity(path.len());
        let mut controls = Vec::with_capacity(path.len());
        let mut x = x0.clone();
        for (i, &id) in path.iter().enumerate() {
            let node = &self.tree[id];
            let u = node.compute_control_stepsize(&x, alpha);
            let next = (i + 1 < path.len()).then(|| node.model().dynamics.step(&x, &u));
            states.push(x);
            controls.push(u);
            match next {
                Some(next) => x = next,
                None => break,
            }
        }
        Ok((states, controls))
    }

    /// Make a rollout the new expansion point of every node.
    pub fn accept(&mut self, rollout: TreeRollout) -> Result<(), HilqrError> {
        if rollout.states.len() != self.tree.len() || rollout.controls.len() != self.tree.len() {
            return Err(ValidationError::LengthMismatch {
                expected: self.tree.len(),
                got: rollout.states.len(),
            }
            .into());
        }
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for ((id, x), u) in ids.into_iter().zip(rollout.states).zip(rollout.controls) {
            self.tree[id].relinearize(x, u)?;
        }
        Ok(())
    }

    /// Control of node `id` at state `x`.
    pub fn compute_control(
        &self,
        id: NodeId,
        x: &DVector<f64>,
        alpha: f64,
    ) -> Result<Control, HilqrError> {
        self.dims.check_state(x)?;
        let node = self
            .tree
            .get(id)
            .ok_or(ValidationError::NodeNotFound { id: id.index() })?;
        Ok(node.compute_control_stepsize(x, alpha))
    }

    // -- solver -------------------------------------------------------------

    /// Run the iLQR loop from `x0` with the nodes' current expansion points
    /// as the nominal trajectory.
    pub fn solve(&mut self, x0: &State, config: &SolverConfig) -> Result<SolveReport, HilqrError> {
        config.validate()?;
        self.dims.check_state(x0)?;
        debug!(nodes = self.tree.len(), leaves = self.leaves().len(), "solving plan tree");
        let mut problem = TreeProblem {
            tree: self,
            x0: x0.clone(),
        };
        solve(&mut problem, config)
    }
}

struct TreeProblem<'a> {
    tree: &'a mut PlanTree,
    x0: State,
}

impl IlqrProblem for TreeProblem<'_> {
    type Rollout = TreeRollout;

    fn backward_pass(&mut self, mu: f64) -> Result<(), HilqrError> {
        self.tree.backward_pass(mu)
    }

    fn forward_pass(&self, alpha: f64) -> Result<(TreeRollout, f64), HilqrError> {
        let rollout = self.tree.forward_pass(&self.x0, alpha)?;
        let cost = rollout.cost;
        Ok((rollout, cost))
    }

    fn accept(&mut self, rollout: TreeRollout) -> Result<(), HilqrError> {
        self.tree.accept(rollout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use crate::backup::bellman_step;
    use crate::model::terminal_value;

    fn scalar(v: f64) -> DVector<f64> {
        DVector::from_vec(vec![v])
    }

    fn model(terminal_weight: f64) -> NodeModel {
        NodeModel::new(
            |x: &DVector<f64>, u: &DVector<f64>| x + u,
            |x: &DVector<f64>, u: &DVector<f64>, _t: usize| x[0] * x[0] + u[0] * u[0],
            move |x: &DVector<f64>| terminal_weight * x[0] * x[0],
        )
    }

    fn plan(tree: &PlanTree, weight: f64, x: f64, p: f64) -> PlanNode {
        tree.make_node(model(weight), scalar(x), scalar(0.0), p).unwrap()
    }

    /// root with two leaves of probability `p` and `1 - p`.
    fn split(p: f64) -> (PlanTree, NodeId, [NodeId; 2]) {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let root = tree.add_root(plan(&tree, 1.0, 1.0, 1.0)).unwrap();
        let a = plan(&tree, 1.0, 1.0, p);
        let b = plan(&tree, 5.0, 1.0, 1.0 - p);
        let ids = tree.add_children(root, vec![a, b]).unwrap();
        (tree, root, [ids[0], ids[1]])
    }

    #[test]
    fn add_children_accepts_sums_within_tolerance() {
        for eps in [0.0, 1e-6, -1e-6] {
            let mut tree = PlanTree::new(Dims::new(1, 1));
            let root = tree.add_root(plan(&tree, 1.0, 0.0, 1.0)).unwrap();
            let a = plan(&tree, 1.0, 0.0, 0.5);
            let b = plan(&tree, 1.0, 0.0, 0.5 + eps);
            assert!(tree.add_children(root, vec![a, b]).is_ok());
        }
    }

    #[test]
    fn add_children_rejects_bad_sums() {
        for eps in [1e-3_f64, -1e-3, 0.5] {
            let mut tree = PlanTree::new(Dims::new(1, 1));
            let root = tree.add_root(plan(&tree, 1.0, 0.0, 1.0)).unwrap();
            let a = plan(&tree, 1.0, 0.0, 0.25);
            let b = plan(&tree, 1.0, 0.0, (0.75 + eps).min(1.0));
            let err = tree.add_children(root, vec![a, b]).unwrap_err();
            assert!(matches!(
                err,
                HilqrError::Validation(ValidationError::ProbabilitySum { .. })
            ));
            assert_eq!(tree.len(), 1);
        }
    }

    #[test]
    fn second_batch_under_same_parent_rejected() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let root = tree.add_root(plan(&tree, 1.0, 0.0, 1.0)).unwrap();
        tree.add_children(root, vec![plan(&tree, 1.0, 0.0, 1.0)]).unwrap();
        let err = tree
            .add_children(root, vec![plan(&tree, 1.0, 0.0, 1.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            HilqrError::Validation(ValidationError::ChildrenAlreadySet { id: 0 })
        ));
        assert_eq!(tree.len(), 2);
        let total: f64 = tree
            .children_of(root)
            .iter()
            .map(|&c| tree.node(c).unwrap().probability())
            .sum();
        assert_relative_eq!(total, 1.0);
    }

    #[test]
    fn wrong_sized_dynamics_rejected_on_insertion() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let widening = NodeModel::new(
            |x: &DVector<f64>, _u: &DVector<f64>| DVector::from_vec(vec![x[0], 0.0]),
            |x: &DVector<f64>, u: &DVector<f64>, _t: usize| x[0] * x[0] + u[0] * u[0],
            |x: &DVector<f64>| x[0] * x[0],
        );
        let root = tree
            .add_root(tree.make_node(widening, scalar(1.0), scalar(0.0), 1.0).unwrap())
            .unwrap();
        let err = tree
            .add_children(root, vec![plan(&tree, 1.0, 0.0, 1.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            HilqrError::Validation(ValidationError::StateDimMismatch {
                expected: 1,
                got: 2
            })
        ));
        assert_eq!(tree.len(), 1);
        assert!(tree.node(root).unwrap().is_terminal());
    }

    #[test]
    fn add_children_validation_errors() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let root = tree.add_root(plan(&tree, 1.0, 0.0, 1.0)).unwrap();
        assert!(matches!(
            tree.add_children(root, Vec::new()),
            Err(HilqrError::Validation(ValidationError::EmptyChildren))
        ));

        let wide = PlanNode::new(model(1.0), DVector::zeros(2), scalar(0.0), 1.0).unwrap();
        assert!(matches!(
            tree.add_children(root, vec![wide]),
            Err(HilqrError::Validation(ValidationError::StateDimMismatch { .. }))
        ));

        // A handle from a larger tree is unknown here.
        let (_, _, [foreign, _]) = split(0.5);
        assert!(matches!(
            tree.add_children(foreign, vec![plan(&tree, 1.0, 0.0, 1.0)]),
            Err(HilqrError::Validation(ValidationError::NodeNotFound { id: 1 }))
        ));
    }

    #[test]
    fn make_node_checks_dims() {
        let tree = PlanTree::new(Dims::new(2, 1));
        assert!(matches!(
            tree.make_node(model(1.0), scalar(0.0), scalar(0.0), 1.0),
            Err(HilqrError::Validation(ValidationError::StateDimMismatch {
                expected: 2,
                got: 1
            }))
        ));
    }

    #[test]
    fn empty_tree_passes_fail() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        assert!(matches!(
            tree.backward_pass(0.0),
            Err(HilqrError::Validation(ValidationError::EmptyTree))
        ));
        assert!(tree.forward_pass(&scalar(0.0), 1.0).is_err());
    }

    #[test]
    fn single_node_keeps_terminal_value() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let root = tree.add_root(plan(&tree, 3.0, 2.0, 1.0)).unwrap();
        let before = tree.node(root).unwrap().value().clone();
        tree.backward_pass(0.0).unwrap();
        let node = tree.node(root).unwrap();
        assert_eq!(node.value(), &before);
        let crate::model::Expansion::Terminal(term) = node.expansion() else {
            panic!("root of a single-node tree is terminal");
        };
        assert_eq!(node.value(), &terminal_value(term));
    }

    #[test]
    fn single_child_matches_bellman_step() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let root = tree.add_root(plan(&tree, 1.0, 1.0, 1.0)).unwrap();
        let child = tree.add_children(root, vec![plan(&tree, 2.0, 1.0, 1.0)]).unwrap()[0];
        tree.backward_pass(0.0).unwrap();

        let parent = tree.node(root).unwrap();
        let leaf = tree.node(child).unwrap();
        let (dynamics, cost) = parent.stage_terms().unwrap();
        let step =
            bellman_step(tree.dims(), cost, dynamics, leaf.x_hat(), leaf.value(), 0.0, 0).unwrap();
        assert_eq!(parent.value(), &step.value);
        assert_eq!(parent.feedback(), &step.gains.feedback);
        assert_eq!(parent.feedforward(), &step.gains.feedforward);
    }

    #[test]
    fn split_value_is_probability_weighted() {
        let p = 0.3;
        let (mut tree, root, [a, b]) = split(p);
        tree.backward_pass(0.0).unwrap();

        let parent = tree.node(root).unwrap();
        let (dynamics, cost) = parent.stage_terms().unwrap();
        let gains = crate::backup::Gains {
            feedback: parent.feedback().clone(),
            feedforward: parent.feedforward().clone(),
        };
        let contribution = |id: NodeId| {
            let child = tree.node(id).unwrap();
            crate::backup::child_contribution(
                &Successor {
                    probability: child.probability(),
                    cost,
                    dynamics,
                    x_next: child.x_hat(),
                    value: child.value(),
                },
                &gains,
            )
        };
        let expected = contribution(a) * p + contribution(b) * (1.0 - p);
        assert_relative_eq!(parent.value(), &expected, epsilon = 1e-10);
    }

    #[test]
    fn backward_pass_is_idempotent() {
        let (mut tree, _, _) = split(0.4);
        let leaf = tree.leaves()[0];
        tree.add_chain(leaf, &model(2.0), &scalar(1.0), &scalar(0.0), 3)
            .unwrap();

        tree.backward_pass(1e-3).unwrap();
        let first: Vec<_> = tree
            .tree
            .ids()
            .map(|id| {
                let n = &tree.tree[id];
                (n.value().clone(), n.feedback().clone(), n.feedforward().clone())
            })
            .collect();
        tree.backward_pass(1e-3).unwrap();
        let second: Vec<_> = tree
            .tree
            .ids()
            .map(|id| {
                let n = &tree.tree[id];
                (n.value().clone(), n.feedback().clone(), n.feedforward().clone())
            })
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn forward_pass_is_deterministic() {
        let (mut tree, _, _) = split(0.6);
        tree.backward_pass(0.0).unwrap();
        let x0 = scalar(1.0);
        let first = tree.forward_pass(&x0, 0.5).unwrap();
        let second = tree.forward_pass(&x0, 0.5).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.states.len(), tree.len());
    }

    #[test]
    fn forward_pass_weights_leaf_costs() {
        let p = 0.25;
        let (tree, root, [a, b]) = split(p);
        // Zero gains: the nominal control 0 is applied and x stays at 2.
        let rollout = tree.forward_pass(&scalar(2.0), 1.0).unwrap();
        assert_relative_eq!(rollout.state(a).unwrap()[0], 2.0);
        assert_relative_eq!(rollout.state(b).unwrap()[0], 2.0);
        assert_relative_eq!(rollout.control(root).unwrap()[0], 0.0);
        let expected = 4.0 + p * 4.0 + (1.0 - p) * 5.0 * 4.0;
        assert_relative_eq!(rollout.cost, expected, epsilon = 1e-12);
    }

    #[test]
    fn path_probability_multiplies_edges() {
        let (mut tree, root, [a, _]) = split(0.3);
        let ids = tree
            .add_children(a, vec![plan(&tree, 1.0, 1.0, 0.5), plan(&tree, 1.0, 1.0, 0.5)])
            .unwrap();
        assert_relative_eq!(tree.path_probability(root).unwrap(), 1.0);
        assert_relative_eq!(tree.path_probability(ids[1]).unwrap(), 0.15);
        assert_eq!(tree.parent_of(ids[0]), Some(a));
        assert_eq!(tree.leaves().len(), 3);
    }

    #[test]
    fn forward_pass_to_follows_one_branch() {
        let mut tree = PlanTree::new(Dims::new(1, 1));
        let root = tree.add_root(plan(&tree, 1.0, 1.0, 1.0)).unwrap();
        let leaf = tree
            .add_chain(root, &model(1.0), &scalar(1.0), &scalar(0.0), 4)
            .unwrap();
        let (states, controls) = tree.forward_pass_to(leaf, &scalar(1.0), 1.0).unwrap();
        assert_eq!(states.len(), 5);
        assert_eq!(controls.len(), 5);
        assert_eq!(tree.node(leaf).unwrap().t(), 4);
    }

    #[test]
    fn accept_relinearizes_every_node() {
        let (mut tree, root, [a, _]) = split(0.5);
        let mut rollout = tree.forward_pass(&scalar(3.0), 1.0).unwrap();
        rollout.controls[root.index()] = scalar(-1.0);
        tree.accept(rollout).unwrap();
        assert_relative_eq!(tree.node(root).unwrap().x_hat()[0], 3.0);
        assert_relative_eq!(tree.node(root).unwrap().u_hat()[0], -1.0);
        assert_relative_eq!(tree.node(a).unwrap().x_hat()[0], 3.0);
        assert_relative_eq!(tree.node(a).unwrap().x_star()[0], 1.0);
    }

    proptest! {
        #[test]
        fn distribution_check_tracks_tolerance(
            weights in proptest::collection::vec(0.01f64..1.0, 1..6),
            drift in -1e-3f64..1e-3,
        ) {
            let total: f64 = weights.iter().sum();
            let mut probs: Vec<f64> = weights.iter().map(|w| w / total).collect();
            probs[0] = (probs[0] + drift).clamp(0.0, 1.0);
            let sum: f64 = probs.iter().sum();
            let result = check_distribution(probs, PROBABILITY_TOLERANCE);
            prop_assert_eq!(result.is_ok(), (sum - 1.0).abs() <= PROBABILITY_TOLERANCE);
        }
    }
}
