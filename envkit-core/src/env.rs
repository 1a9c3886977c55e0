//! The environment interface shared by base environments and wrappers.
use crate::spec::{ArraySpec, Dtype, SpecTree};
use crate::timestep::TimeStep;
use crate::value::ValueTree;
use anyhow::Result;
use rand::rngs::StdRng;

/// A step-based environment.
///
/// Wrappers implement this trait too, so a composed chain can be used (and
/// wrapped further) anywhere the bare environment is accepted. The interface
/// is enumerated explicitly; a wrapper forwards every method it does not
/// override, which keeps capabilities of the innermost environment (such as
/// [`control_timestep`] or [`random_state`]) reachable through any stacking
/// depth.
///
/// [`control_timestep`]: Environment::control_timestep
/// [`random_state`]: Environment::random_state
pub trait Environment {
    /// Starts a new episode, returning its first timestep.
    fn reset(&mut self) -> Result<TimeStep>;

    /// Advances the episode by one step.
    fn step(&mut self, action: &ValueTree) -> Result<TimeStep>;

    /// Describes accepted actions.
    fn action_spec(&self) -> SpecTree;

    /// Describes returned observations.
    fn observation_spec(&self) -> SpecTree;

    /// Describes the reward; a scalar `f64` unless overridden.
    fn reward_spec(&self) -> ArraySpec {
        ArraySpec::new(vec![], Dtype::F64)
    }

    /// Describes the discount; a scalar in `[0, 1]` unless overridden.
    fn discount_spec(&self) -> ArraySpec {
        ArraySpec::bounded(vec![], Dtype::F64, 0.0, 1.0).unwrap()
    }

    /// Seconds of simulated time per control step, if the environment
    /// advances a clock.
    fn control_timestep(&self) -> Option<f64> {
        None
    }

    /// The environment's own random source, if it exposes one.
    ///
    /// Wrappers that inject randomness prefer this source so that one seed
    /// governs the whole episode.
    fn random_state(&mut self) -> Option<&mut StdRng> {
        None
    }
}

impl Environment for Box<dyn Environment> {
    fn reset(&mut self) -> Result<TimeStep> {
        (**self).reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        (**self).step(action)
    }

    fn action_spec(&self) -> SpecTree {
        (**self).action_spec()
    }

    fn observation_spec(&self) -> SpecTree {
        (**self).observation_spec()
    }

    fn reward_spec(&self) -> ArraySpec {
        (**self).reward_spec()
    }

    fn discount_spec(&self) -> ArraySpec {
        (**self).discount_spec()
    }

    fn control_timestep(&self) -> Option<f64> {
        (**self).control_timestep()
    }

    fn random_state(&mut self) -> Option<&mut StdRng> {
        (**self).random_state()
    }
}
