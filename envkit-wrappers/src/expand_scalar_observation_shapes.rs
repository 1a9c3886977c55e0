//! Expansion of scalar observation leaves to rank 1.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::{Array, ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use ndarray::IxDyn;
use rand::rngs::StdRng;

/// Gives every scalar observation leaf shape `[1]`, which downstream
/// consumers expecting rank-1 arrays (concatenation, batching) rely on.
pub struct ExpandScalarObservationShapesWrapper<E> {
    env: E,
    spec: SpecTree,
}

impl<E: Environment> ExpandScalarObservationShapesWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E) -> Result<Self> {
        let spec = env.observation_spec().map_leaves(&|_path, s| {
            if s.shape().is_empty() {
                Ok(s.with_shape(vec![1]))
            } else {
                Ok(s.clone())
            }
        })?;
        Ok(Self { env, spec })
    }

    fn expand(&self, observation: &ValueTree) -> Result<ValueTree> {
        observation.map_leaves(&|_path, a| {
            if a.shape().is_empty() {
                Ok(reshape_to_rank1(a))
            } else {
                Ok(a.clone())
            }
        })
    }
}

fn reshape_to_rank1(a: &Array) -> Array {
    fn r<T: Clone>(a: &ndarray::ArrayD<T>) -> ndarray::ArrayD<T> {
        a.clone().into_shape(IxDyn(&[1])).unwrap()
    }
    match a {
        Array::F32(a) => Array::F32(r(a)),
        Array::F64(a) => Array::F64(r(a)),
        Array::I32(a) => Array::I32(r(a)),
        Array::I64(a) => Array::I64(r(a)),
    }
}

impl ExpandScalarObservationShapesWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor() -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for ExpandScalarObservationShapesWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        let ts = self.env.reset()?;
        let observation = self.expand(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let ts = self.env.step(action)?;
        let observation = self.expand(&ts.observation)?;
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
    use std::collections::BTreeMap;

    #[test]
    fn test_scalar_leaves_gain_rank() {
        let mut env = ExpandScalarObservationShapesWrapper::new(EchoEnv::new(2, -1.0, 1.0))
            .unwrap();
        let spec = env.observation_spec();
        let by_key: BTreeMap<_, _> = spec.leaves().into_iter().collect();
        // `time` is a scalar on the base environment.
        assert_eq!(by_key["time"].shape(), &[1]);
        assert_eq!(by_key["position"].shape(), &[2]);

        let ts = env.reset().unwrap();
        let by_key: BTreeMap<_, _> = ts.observation.leaves().into_iter().collect();
        assert_eq!(by_key["time"].shape(), &[1]);
    }
}
