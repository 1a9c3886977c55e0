//! Temporal stacking of recent observations.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{Array, ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use log::info;
use ndarray::Axis;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Configuration of [`FrameStackingWrapper`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameStackingConfig {
    /// Number of observations presented at once.
    pub num_frames: usize,
}

impl Default for FrameStackingConfig {
    fn default() -> Self {
        Self { num_frames: 4 }
    }
}

impl FrameStackingConfig {
    /// Sets the stack depth.
    pub fn num_frames(mut self, num_frames: usize) -> Self {
        self.num_frames = num_frames;
        self
    }
}

/// Presents the last `num_frames` observations instead of a single one.
///
/// Every leaf gains a new leading axis of size `num_frames`; slot 0 holds the
/// oldest frame and the last slot the current one. On `reset` all slots are
/// filled with the fresh observation, so the first stacked observation is the
/// reset observation repeated (a documented policy, not an artifact).
pub struct FrameStackingWrapper<E> {
    env: E,
    num_frames: usize,
    buffers: BTreeMap<String, VecDeque<Array>>,
    spec: SpecTree,
}

impl<E: Environment> FrameStackingWrapper<E> {
    /// Wraps `env` with a stack of depth `config.num_frames`.
    pub fn new(env: E, config: FrameStackingConfig) -> Result<Self> {
        let k = config.num_frames;
        if k < 1 {
            return Err(EnvkitError::InvalidConfig(
                "num_frames must be at least 1, got 0".into(),
            )
            .into());
        }
        let spec = env.observation_spec().map_leaves(&|_path, s| {
            let mut shape = vec![k];
            shape.extend_from_slice(s.shape());
            match (s.minimum(), s.maximum()) {
                (Some(lo), Some(hi)) => {
                    let lo_k = ndarray::stack(Axis(0), &vec![lo.view(); k])?;
                    let hi_k = ndarray::stack(Axis(0), &vec![hi.view(); k])?;
                    ArraySpec::bounded_elementwise(shape, s.dtype(), lo_k, hi_k)
                }
                _ => Ok(ArraySpec::new(shape, s.dtype())),
            }
        })?;
        info!("FrameStackingWrapper: num_frames={}", k);
        Ok(Self {
            env,
            num_frames: k,
            buffers: BTreeMap::new(),
            spec,
        })
    }

    fn stacked(&self, observation: &ValueTree) -> Result<ValueTree> {
        let buffers = &self.buffers;
        observation.map_leaves(&|path, _| {
            let buf = buffers.get(path).ok_or_else(|| EnvkitError::StructureMismatch {
                path: path.to_string(),
                expected: "a stacking buffer".into(),
                got: "an unknown observation leaf".into(),
            })?;
            let parts: Vec<&Array> = buf.iter().collect();
            Array::stack(&parts)
        })
    }
}

impl FrameStackingWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: FrameStackingConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for FrameStackingWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        let ts = self.env.reset()?;
        self.buffers.clear();
        for (path, arr) in ts.observation.leaves() {
            let buf: VecDeque<Array> = (0..self.num_frames).map(|_| arr.clone()).collect();
            self.buffers.insert(path, buf);
        }
        let observation = self.stacked(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let ts = self.env.step(action)?;
        for (path, arr) in ts.observation.leaves() {
            let buf = self
                .buffers
                .get_mut(&path)
                .ok_or_else(|| EnvkitError::StructureMismatch {
                    path: path.clone(),
                    expected: "a stacking buffer".into(),
                    got: "an observation leaf unseen at reset".into(),
                })?;
            buf.push_back(arr.clone());
            buf.pop_front();
        }
        let observation = self.stacked(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn action_spec(&self) -> SpecTree {
        self.env.action_spec()
    }

    fn observation_spec(&self) -> SpecTree {
        self.spec.clone()
    }

    fn reward_spec(&self) -> ArraySpec {
        self.env.reward_spec()
    }

    fn discount_spec(&self) -> ArraySpec {
        self.env.discount_spec()
    }

    fn control_timestep(&self) -> Option<f64> {
        self.env.control_timestep()
    }

    fn random_state(&mut self) -> Option<&mut StdRng> {
        self.env.random_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envkit_core::testing::EchoEnv;

    fn leaf<'a>(obs: &'a ValueTree, key: &str) -> &'a Array {
        match obs {
            ValueTree::Dict(map) => map[key].as_leaf().unwrap(),
            _ => panic!("expected dict observation"),
        }
    }

    #[test]
    fn test_spec_gains_leading_axis() {
        let env =
            FrameStackingWrapper::new(EchoEnv::new(3, -1.0, 1.0), Default::default()).unwrap();
        let spec = env.observation_spec();
        let leaves = spec.leaves();
        let by_key: BTreeMap<_, _> = leaves.into_iter().collect();
        assert_eq!(by_key["position"].shape(), &[4, 3]);
        assert_eq!(by_key["time"].shape(), &[4]);
    }

    #[test]
    fn test_reset_fills_all_slots_with_reset_observation() {
        for &k in &[1usize, 2, 5] {
            let config = FrameStackingConfig::default().num_frames(k);
            let mut env = FrameStackingWrapper::new(EchoEnv::new(2, -1.0, 1.0), config).unwrap();
            let ts = env.reset().unwrap();
            let position = leaf(&ts.observation, "position").to_f64();
            assert_eq!(position.shape(), &[k, 2]);
            // Every slot equals the reset observation (all zeros at t=0).
            assert!(position.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_step_rolls_oldest_frame_out() {
        let config = FrameStackingConfig::default().num_frames(2);
        let mut env = FrameStackingWrapper::new(EchoEnv::new(1, -1.0, 1.0), config).unwrap();
        env.reset().unwrap();
        let ts = env.step(&ValueTree::leaf_f64(vec![1], vec![0.5])).unwrap();
        let position = leaf(&ts.observation, "position").to_f64();
        // Slot 0 is the reset frame (t=0), slot 1 the current frame (t=1).
        assert_eq!(position.iter().cloned().collect::<Vec<_>>(), vec![0.0, 1.0]);

        let ts = env.step(&ValueTree::leaf_f64(vec![1], vec![0.5])).unwrap();
        let position = leaf(&ts.observation, "position").to_f64();
        assert_eq!(position.iter().cloned().collect::<Vec<_>>(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let config = FrameStackingConfig::default().num_frames(0);
        assert!(FrameStackingWrapper::new(EchoEnv::new(1, -1.0, 1.0), config).is_err());
    }
}
