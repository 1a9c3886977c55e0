//! This module is used for tests.
//!
//! The environments here echo the action they were given back through the
//! observation, so a test can check what a wrapper chain actually forwarded
//! without reaching into the chain.
use crate::env::Environment;
use crate::error::EnvkitError;
use crate::spec::{ArraySpec, Dtype, SpecTree};
use crate::timestep::TimeStep;
use crate::value::{Array, ValueTree};
use anyhow::Result;
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seconds per control step of the test environments.
pub const CONTROL_TIMESTEP: f64 = 0.02;

/// A bounded continuous environment with a dict observation.
///
/// Observation keys: `position` (the step count repeated), `velocity` (the
/// last action received, zeros before the first step) and `time` (a scalar).
/// Episodes terminate after `episode_len` steps with reward 1.0 per step.
pub struct EchoEnv {
    dim: usize,
    minimum: f64,
    maximum: f64,
    episode_len: usize,
    t: usize,
    last_action: Option<Array>,
    rng: StdRng,
}

impl EchoEnv {
    /// A `dim`-dimensional environment with actions bounded `[minimum, maximum]`.
    pub fn new(dim: usize, minimum: f64, maximum: f64) -> Self {
        Self {
            dim,
            minimum,
            maximum,
            episode_len: 10,
            t: 0,
            last_action: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Sets the number of steps per episode.
    pub fn episode_len(mut self, episode_len: usize) -> Self {
        self.episode_len = episode_len;
        self
    }

    /// Reseeds the environment's random source.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn observation(&self) -> ValueTree {
        let velocity = match &self.last_action {
            Some(a) => a.cast(Dtype::F64),
            None => Array::zeros(vec![self.dim], Dtype::F64),
        };
        ValueTree::dict(vec![
            (
                "position",
                ValueTree::Leaf(Array::F64(ArrayD::from_elem(
                    IxDyn(&[self.dim]),
                    self.t as f64,
                ))),
            ),
            (
                "time",
                ValueTree::Leaf(Array::F64(ArrayD::from_elem(
                    IxDyn(&[]),
                    self.t as f64 * CONTROL_TIMESTEP,
                ))),
            ),
            ("velocity", ValueTree::Leaf(velocity)),
        ])
    }
}

impl Environment for EchoEnv {
    fn reset(&mut self) -> Result<TimeStep> {
        self.t = 0;
        self.last_action = None;
        Ok(TimeStep::first(self.observation()))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let leaf = action.as_leaf().ok_or_else(|| EnvkitError::StructureMismatch {
            path: "".into(),
            expected: "a leaf action".into(),
            got: "a dict".into(),
        })?;
        self.last_action = Some(leaf.clone());
        self.t += 1;
        let obs = self.observation();
        if self.t >= self.episode_len {
            Ok(TimeStep::termination(1.0, obs))
        } else {
            Ok(TimeStep::transition(1.0, obs))
        }
    }

    fn action_spec(&self) -> SpecTree {
        SpecTree::Leaf(
            ArraySpec::bounded(vec![self.dim], Dtype::F64, self.minimum, self.maximum).unwrap(),
        )
    }

    fn observation_spec(&self) -> SpecTree {
        SpecTree::dict(vec![
            (
                "position",
                SpecTree::Leaf(ArraySpec::new(vec![self.dim], Dtype::F64)),
            ),
            ("time", SpecTree::Leaf(ArraySpec::new(vec![], Dtype::F64))),
            (
                "velocity",
                SpecTree::Leaf(ArraySpec::new(vec![self.dim], Dtype::F64)),
            ),
        ])
    }

    fn control_timestep(&self) -> Option<f64> {
        Some(CONTROL_TIMESTEP)
    }

    fn random_state(&mut self) -> Option<&mut StdRng> {
        Some(&mut self.rng)
    }
}

/// A three-action discrete environment echoing the action as `state`.
pub struct DiscreteEchoEnv {
    episode_len: usize,
    t: usize,
    last_action: i64,
}

impl DiscreteEchoEnv {
    /// An environment with actions in `{0, 1, 2}`.
    pub fn new() -> Self {
        Self {
            episode_len: 10,
            t: 0,
            last_action: 0,
        }
    }
}

impl Default for DiscreteEchoEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for DiscreteEchoEnv {
    fn reset(&mut self) -> Result<TimeStep> {
        self.t = 0;
        self.last_action = 0;
        Ok(TimeStep::first(self.observation()))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let leaf = action.as_leaf().ok_or_else(|| EnvkitError::StructureMismatch {
            path: "".into(),
            expected: "a leaf action".into(),
            got: "a dict".into(),
        })?;
        self.last_action = *leaf.to_i64().iter().next().unwrap();
        self.t += 1;
        let obs = self.observation();
        if self.t >= self.episode_len {
            Ok(TimeStep::termination(1.0, obs))
        } else {
            Ok(TimeStep::transition(1.0, obs))
        }
    }

    fn action_spec(&self) -> SpecTree {
        SpecTree::Leaf(ArraySpec::discrete(3, Dtype::I64).unwrap())
    }

    fn observation_spec(&self) -> SpecTree {
        SpecTree::dict(vec![(
            "state",
            SpecTree::Leaf(ArraySpec::new(vec![1], Dtype::F64)),
        )])
    }
}

impl DiscreteEchoEnv {
    fn observation(&self) -> ValueTree {
        ValueTree::dict(vec![(
            "state",
            ValueTree::leaf_f64(vec![1], vec![self.last_action as f64]),
        )])
    }
}

/// An environment with a nested action: a bounded continuous `gain` and a
/// discrete `mode`. Both are echoed back in the observation. Exposes no
/// random source of its own.
pub struct NestedEchoEnv {
    episode_len: usize,
    t: usize,
    last_gain: Array,
    last_mode: Array,
}

impl NestedEchoEnv {
    /// An environment with `gain` bounded `[-2, 2]` and a 3-way `mode`.
    pub fn new() -> Self {
        Self {
            episode_len: 10,
            t: 0,
            last_gain: Array::zeros(vec![2], Dtype::F64),
            last_mode: Array::zeros(vec![], Dtype::I64),
        }
    }

    fn observation(&self) -> ValueTree {
        ValueTree::dict(vec![
            ("gain", ValueTree::Leaf(self.last_gain.clone())),
            ("mode", ValueTree::Leaf(self.last_mode.clone())),
        ])
    }
}

impl Default for NestedEchoEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for NestedEchoEnv {
    fn reset(&mut self) -> Result<TimeStep> {
        self.t = 0;
        self.last_gain = Array::zeros(vec![2], Dtype::F64);
        self.last_mode = Array::zeros(vec![], Dtype::I64);
        Ok(TimeStep::first(self.observation()))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        match action {
            ValueTree::Dict(map) => {
                if let Some(ValueTree::Leaf(gain)) = map.get("gain") {
                    self.last_gain = gain.clone();
                }
                if let Some(ValueTree::Leaf(mode)) = map.get("mode") {
                    self.last_mode = mode.clone();
                }
            }
            ValueTree::Leaf(_) => {
                return Err(EnvkitError::StructureMismatch {
                    path: "".into(),
                    expected: "a dict action".into(),
                    got: "a leaf".into(),
                }
                .into())
            }
        }
        self.t += 1;
        let obs = self.observation();
        if self.t >= self.episode_len {
            Ok(TimeStep::termination(1.0, obs))
        } else {
            Ok(TimeStep::transition(1.0, obs))
        }
    }

    fn action_spec(&self) -> SpecTree {
        SpecTree::dict(vec![
            (
                "gain",
                SpecTree::Leaf(ArraySpec::bounded(vec![2], Dtype::F64, -2.0, 2.0).unwrap()),
            ),
            (
                "mode",
                SpecTree::Leaf(ArraySpec::discrete(3, Dtype::I64).unwrap()),
            ),
        ])
    }

    fn observation_spec(&self) -> SpecTree {
        SpecTree::dict(vec![
            (
                "gain",
                SpecTree::Leaf(ArraySpec::new(vec![2], Dtype::F64)),
            ),
            (
                "mode",
                SpecTree::Leaf(ArraySpec::new(vec![], Dtype::I64)),
            ),
        ])
    }

    fn control_timestep(&self) -> Option<f64> {
        Some(CONTROL_TIMESTEP)
    }
}
