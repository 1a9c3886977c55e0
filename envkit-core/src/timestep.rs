//! The result of one interaction step.
use crate::value::ValueTree;

/// Position of a timestep within an episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// The timestep returned by `reset`.
    First,
    /// A timestep in the middle of an episode.
    Mid,
    /// The final timestep of an episode.
    Last,
}

/// An observation with its reward, discount and position in the episode.
///
/// Reward and discount are `None` exactly on [`StepKind::First`]. A valid
/// episode is one `First`, zero or more `Mid`, one `Last`.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeStep {
    /// Position within the episode.
    pub kind: StepKind,
    /// Reward for the transition leading to this observation.
    pub reward: Option<f64>,
    /// Discount for subsequent rewards; 0.0 on termination.
    pub discount: Option<f64>,
    /// Observation of the environment.
    pub observation: ValueTree,
}

impl TimeStep {
    /// The timestep starting an episode.
    pub fn first(observation: ValueTree) -> Self {
        Self {
            kind: StepKind::First,
            reward: None,
            discount: None,
            observation,
        }
    }

    /// A mid-episode transition with discount 1.0.
    pub fn transition(reward: f64, observation: ValueTree) -> Self {
        Self {
            kind: StepKind::Mid,
            reward: Some(reward),
            discount: Some(1.0),
            observation,
        }
    }

    /// The final timestep of an episode that ended inside the environment.
    pub fn termination(reward: f64, observation: ValueTree) -> Self {
        Self {
            kind: StepKind::Last,
            reward: Some(reward),
            discount: Some(0.0),
            observation,
        }
    }

    /// A final timestep cut short from outside; the discount stays 1.0.
    pub fn truncation(reward: f64, observation: ValueTree) -> Self {
        Self {
            kind: StepKind::Last,
            reward: Some(reward),
            discount: Some(1.0),
            observation,
        }
    }

    /// `true` on the timestep returned by `reset`.
    pub fn is_first(&self) -> bool {
        self.kind == StepKind::First
    }

    /// `true` in the middle of an episode.
    pub fn is_mid(&self) -> bool {
        self.kind == StepKind::Mid
    }

    /// `true` on the final timestep of an episode.
    pub fn is_last(&self) -> bool {
        self.kind == StepKind::Last
    }

    /// This timestep with another observation.
    pub fn with_observation(self, observation: ValueTree) -> Self {
        Self {
            observation,
            ..self
        }
    }
}
