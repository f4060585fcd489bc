//! Closed-loop receding-horizon runs.
//!
//! The robot holds a belief over two worlds: the true one and an
//! alternative. Every step it replans with the chosen policy over the
//! remaining horizon, applies the first control in the true world, and
//! collapses its belief onto the true world once any obstacle of either
//! world comes within sensing range.

use hilqr_core::config::SolverConfig;
use hilqr_core::error::HilqrError;
use hilqr_core::traits::{Dynamics, StageCost, TerminalCost};
use hilqr_core::types::{Control, State};
use hilqr_filter::GoalPredictor;
use hilqr_ilqr::{HindsightSolver, HindsightSplit};
use nalgebra::DVector;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::cost::{GoalCost, WorldCost};
use crate::diffdrive::{CONTROL_DIM, DiffDrive, STATE_DIM};
use crate::error::ExperimentError;
use crate::policy::PolicyType;
use crate::world::CircleWorld;

/// Belief after the true world has been observed.
const REVEALED: [f64; 2] = [1.0, 0.0];

/// Result of one closed-loop run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentOutcome {
    pub policy: PolicyType,
    pub true_world_has_obstacle: bool,
    /// Realized stage costs plus the terminal cost, all in the true world.
    pub cost: f64,
    /// `horizon + 1` visited states.
    pub states: Vec<[f64; STATE_DIM]>,
    /// `horizon` applied controls.
    pub controls: Vec<[f64; CONTROL_DIM]>,
    /// Closest approach to a true obstacle, `None` in an empty world.
    pub min_clearance: Option<f64>,
    pub goal_distance: f64,
    pub collided: bool,
    pub replans: usize,
    pub unconverged_replans: usize,
}

/// Models of one world hypothesis.
struct WorldModel {
    robot: DiffDrive,
    cost: WorldCost,
    final_cost: GoalCost,
}

impl WorldModel {
    fn new(world: &CircleWorld, config: &ExperimentConfig) -> Self {
        Self {
            robot: DiffDrive::new(config.dt),
            cost: WorldCost::new(world.clone(), config.goal, config.weights.clone()),
            final_cost: GoalCost::new(config.goal, config.weights.goal),
        }
    }

    fn split(&self, probability: f64) -> HindsightSplit {
        HindsightSplit::new(
            self.robot,
            self.final_cost.clone(),
            self.cost.clone(),
            probability,
        )
    }
}

/// First control of a plan together with whether its solve converged.
struct Plan {
    control: Control,
    converged: bool,
}

/// Solve a hindsight problem over `splits` and return its first control.
/// A numerical breakdown falls back to `u_nominal`.
fn plan_first_control(
    splits: Vec<HindsightSplit>,
    horizon: usize,
    x: &State,
    u_nominal: &Control,
    solver: &SolverConfig,
) -> Result<Plan, ExperimentError> {
    let mut planner = HindsightSolver::new(DiffDrive::dims(), splits)?;
    match planner.solve(horizon, x, u_nominal, solver) {
        Ok(report) => Ok(Plan {
            control: planner.first_control(x)?,
            converged: report.converged,
        }),
        Err(err @ HilqrError::Numerical(_)) => {
            warn!(%err, "plan failed, applying nominal control");
            Ok(Plan {
                control: u_nominal.clone(),
                converged: false,
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn plan(
    policy: PolicyType,
    worlds: &[WorldModel; 2],
    belief: &GoalPredictor,
    horizon: usize,
    x: &State,
    u_nominal: &Control,
    solver: &SolverConfig,
) -> Result<Plan, ExperimentError> {
    let believed: Vec<(usize, f64)> = belief
        .distribution()
        .into_iter()
        .enumerate()
        .filter(|&(_, p)| p > 0.0)
        .collect();
    match policy {
        PolicyType::Hindsight => {
            let splits = believed.iter().map(|&(w, p)| worlds[w].split(p)).collect();
            plan_first_control(splits, horizon, x, u_nominal, solver)
        }
        PolicyType::TrueIlqr => {
            plan_first_control(vec![worlds[0].split(1.0)], horizon, x, u_nominal, solver)
        }
        PolicyType::ArgmaxIlqr => {
            let w = belief.most_likely().unwrap_or(0);
            plan_first_control(vec![worlds[w].split(1.0)], horizon, x, u_nominal, solver)
        }
        PolicyType::ProbWeightedControl => {
            let mut control = DVector::zeros(CONTROL_DIM);
            let mut converged = true;
            for (w, p) in believed {
                let plan =
                    plan_first_control(vec![worlds[w].split(1.0)], horizon, x, u_nominal, solver)?;
                control += p * plan.control;
                converged &= plan.converged;
            }
            Ok(Plan { control, converged })
        }
    }
}

fn within_sensing(worlds: &[&CircleWorld; 2], x: &State, range: f64) -> bool {
    worlds
        .iter()
        .filter_map(|w| w.min_clearance(x))
        .any(|c| c <= range)
}

fn to_array<const N: usize>(v: &DVector<f64>) -> [f64; N] {
    std::array::from_fn(|i| v[i])
}

/// Drive from `config.start` toward `config.goal` in `true_world` while
/// believing `prior[0]` for `true_world` and `prior[1]` for `other_world`.
pub fn run_closed_loop(
    policy: PolicyType,
    true_world: &CircleWorld,
    other_world: &CircleWorld,
    prior: [f64; 2],
    config: &ExperimentConfig,
) -> Result<ExperimentOutcome, ExperimentError> {
    config.validate()?;
    let mut belief = GoalPredictor::new(&prior)?;
    let worlds = [
        WorldModel::new(true_world, config),
        WorldModel::new(other_world, config),
    ];
    let truth = &worlds[0];
    let u_nominal = DVector::from_column_slice(&config.nominal_control);

    let mut x = DVector::from_column_slice(&config.start);
    let mut states = vec![to_array(&x)];
    let mut controls = Vec::with_capacity(config.horizon);
    let mut cost = 0.0;
    let mut revealed = false;
    let mut unconverged_replans = 0;

    for t in 0..config.horizon {
        if !revealed && within_sensing(&[true_world, other_world], &x, config.sensing_range) {
            belief.initialize(&REVEALED)?;
            revealed = true;
            debug!(t, "true world observed");
        }

        let remaining = config.horizon - t;
        let plan = plan(policy, &worlds, &belief, remaining, &x, &u_nominal, &config.solver)?;
        if !plan.converged {
            unconverged_replans += 1;
        }

        cost += StageCost::cost(&truth.cost, &x, &plan.control, t);
        x = truth.robot.step(&x, &plan.control);
        debug!(t, %belief, x = ?x.as_slice(), "step");
        controls.push(to_array(&plan.control));
        states.push(to_array(&x));
    }
    cost += TerminalCost::cost(&truth.final_cost, &x);

    let min_clearance = states
        .iter()
        .filter_map(|s| true_world.min_clearance(&DVector::from_column_slice(s)))
        .min_by(f64::total_cmp);
    let outcome = ExperimentOutcome {
        policy,
        true_world_has_obstacle: !true_world.is_empty(),
        cost,
        states,
        controls,
        min_clearance,
        goal_distance: (x[0] - config.goal[0]).hypot(x[1] - config.goal[1]),
        collided: min_clearance.is_some_and(|c| c < 0.0),
        replans: config.horizon,
        unconverged_replans,
    };
    info!(
        policy = %policy,
        obstacle = outcome.true_world_has_obstacle,
        cost = outcome.cost,
        goal_distance = outcome.goal_distance,
        collided = outcome.collided,
        "run finished"
    );
    Ok(outcome)
}

/// The obstacle experiment: one world contains `config.obstacle`, the other
/// is empty. `prior` is over (true world, other world).
pub fn single_obstacle(
    policy: PolicyType,
    true_world_has_obstacle: bool,
    prior: [f64; 2],
    config: &ExperimentConfig,
) -> Result<ExperimentOutcome, ExperimentError> {
    let with = CircleWorld::default().with_obstacle(config.obstacle);
    let without = CircleWorld::default();
    let (truth, other) = if true_world_has_obstacle {
        (with, without)
    } else {
        (without, with)
    };
    run_closed_loop(policy, &truth, &other, prior, config)
}

/// Every policy in both worlds, with `p_obstacle` the prior that the
/// obstacle exists.
pub fn compare_policies(
    p_obstacle: f64,
    config: &ExperimentConfig,
) -> Result<Vec<ExperimentOutcome>, ExperimentError> {
    let mut outcomes = Vec::with_capacity(2 * PolicyType::ALL.len());
    for has_obstacle in [true, false] {
        let prior = if has_obstacle {
            [p_obstacle, 1.0 - p_obstacle]
        } else {
            [1.0 - p_obstacle, p_obstacle]
        };
        for policy in PolicyType::ALL {
            outcomes.push(single_obstacle(policy, has_obstacle, prior, config)?);
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Circle;
    use hilqr_core::error::ValidationError;

    fn small_config() -> ExperimentConfig {
        ExperimentConfig {
            dt: 0.2,
            horizon: 15,
            goal: [4.0, 0.0, 0.0],
            obstacle: Circle::new([2.0, -0.2], 0.6),
            solver: SolverConfig {
                max_iters: 50,
                ..SolverConfig::default()
            },
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn outcome_has_consistent_lengths() {
        let config = small_config();
        let outcome = single_obstacle(PolicyType::Hindsight, true, [0.5, 0.5], &config).unwrap();
        assert_eq!(outcome.states.len(), config.horizon + 1);
        assert_eq!(outcome.controls.len(), config.horizon);
        assert_eq!(outcome.states[0], config.start);
        assert_eq!(outcome.replans, config.horizon);
        assert!(outcome.unconverged_replans <= outcome.replans);
        assert!(outcome.true_world_has_obstacle);
        assert!(outcome.min_clearance.is_some());
        assert!(outcome.cost.is_finite());
    }

    #[test]
    fn runs_are_deterministic() {
        let config = small_config();
        let a = single_obstacle(PolicyType::Hindsight, false, [0.5, 0.5], &config).unwrap();
        let b = single_obstacle(PolicyType::Hindsight, false, [0.5, 0.5], &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.min_clearance, None);
        assert!(!a.collided);
    }

    #[test]
    fn robot_approaches_goal() {
        let config = small_config();
        let outcome = single_obstacle(PolicyType::TrueIlqr, false, [1.0, 0.0], &config).unwrap();
        assert!(outcome.goal_distance < 2.0, "goal distance {}", outcome.goal_distance);
    }

    #[test]
    fn certain_belief_policies_match_oracle() {
        let config = small_config();
        let oracle = single_obstacle(PolicyType::TrueIlqr, true, [1.0, 0.0], &config).unwrap();
        for policy in [
            PolicyType::Hindsight,
            PolicyType::ProbWeightedControl,
            PolicyType::ArgmaxIlqr,
        ] {
            let outcome = single_obstacle(policy, true, [1.0, 0.0], &config).unwrap();
            assert_eq!(outcome.states, oracle.states, "{policy}");
            assert_eq!(outcome.controls, oracle.controls, "{policy}");
        }
    }

    #[test]
    fn argmax_follows_most_likely_world() {
        let config = small_config();
        let oracle = single_obstacle(PolicyType::TrueIlqr, true, [1.0, 0.0], &config).unwrap();
        let argmax = single_obstacle(PolicyType::ArgmaxIlqr, true, [0.9, 0.1], &config).unwrap();
        assert_eq!(argmax.controls, oracle.controls);
    }

    #[test]
    fn planning_for_the_obstacle_keeps_distance() {
        let config = small_config();
        let circle = config.obstacle;
        let clearance = |outcome: &ExperimentOutcome| {
            outcome
                .states
                .iter()
                .map(|s| circle.clearance(&DVector::from_column_slice(s)))
                .fold(f64::INFINITY, f64::min)
        };
        let aware = single_obstacle(PolicyType::TrueIlqr, true, [1.0, 0.0], &config).unwrap();
        let unaware = single_obstacle(PolicyType::TrueIlqr, false, [1.0, 0.0], &config).unwrap();
        assert!(clearance(&aware) > clearance(&unaware));
    }

    #[test]
    fn compare_covers_every_policy_and_world() {
        let config = ExperimentConfig {
            horizon: 4,
            ..small_config()
        };
        let outcomes = compare_policies(0.5, &config).unwrap();
        assert_eq!(outcomes.len(), 8);
        assert_eq!(outcomes.iter().filter(|o| o.true_world_has_obstacle).count(), 4);
        for policy in PolicyType::ALL {
            assert_eq!(outcomes.iter().filter(|o| o.policy == policy).count(), 2);
        }
    }

    #[test]
    fn invalid_prior_is_rejected() {
        let err = single_obstacle(PolicyType::Hindsight, true, [0.0, 0.0], &small_config())
            .unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::Validation(ValidationError::DegenerateDistribution)
        ));
    }

    #[test]
    fn outcome_serializes_to_json() {
        let config = ExperimentConfig {
            horizon: 3,
            ..small_config()
        };
        let outcome = single_obstacle(PolicyType::ArgmaxIlqr, false, [0.5, 0.5], &config).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["policy"], "argmax");
        assert_eq!(json["states"].as_array().unwrap().len(), 4);
        assert!(json["min_clearance"].is_null());
    }
}
