//! Planning policies compared by the experiments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;

/// How the robot turns its belief over worlds into a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    /// One hindsight plan over every world, weighted by the belief.
    #[serde(rename = "hindsight")]
    Hindsight,
    /// Oracle: plan for the true world only.
    #[serde(rename = "ilqr_true")]
    TrueIlqr,
    /// Plan for the most probable world.
    #[serde(rename = "argmax")]
    ArgmaxIlqr,
    /// Plan for each world separately and blend the first controls.
    #[serde(rename = "weighted")]
    ProbWeightedControl,
}

impl PolicyType {
    pub const ALL: [Self; 4] = [
        Self::Hindsight,
        Self::TrueIlqr,
        Self::ArgmaxIlqr,
        Self::ProbWeightedControl,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Hindsight => "hindsight",
            Self::TrueIlqr => "ilqr_true",
            Self::ArgmaxIlqr => "argmax",
            Self::ProbWeightedControl => "weighted",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyType {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ExperimentError::UnknownPolicy(s.to_owned()))
    }
}
