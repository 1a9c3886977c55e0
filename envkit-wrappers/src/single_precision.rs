//! Conversion of double-precision specs and values to single precision.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::{Array, ArraySpec, Dtype, Environment, SpecTree, TimeStep, ValueTree};
use rand::rngs::StdRng;

fn narrow(dtype: Dtype) -> Dtype {
    match dtype {
        Dtype::F64 => Dtype::F32,
        Dtype::I64 => Dtype::I32,
        other => other,
    }
}

/// Advertises `f64`/`i64` leaves as `f32`/`i32`.
///
/// Observations are cast on the way out; actions arrive in the narrowed
/// dtype and are cast back to whatever the inner environment expects.
pub struct SinglePrecisionWrapper<E> {
    env: E,
    action_spec: SpecTree,
    inner_action_spec: SpecTree,
    observation_spec: SpecTree,
}

impl<E: Environment> SinglePrecisionWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E) -> Result<Self> {
        let inner_action_spec = env.action_spec();
        let action_spec =
            inner_action_spec.map_leaves(&|_path, s| Ok(s.with_dtype(narrow(s.dtype()))))?;
        let observation_spec = env
            .observation_spec()
            .map_leaves(&|_path, s| Ok(s.with_dtype(narrow(s.dtype()))))?;
        Ok(Self {
            env,
            action_spec,
            inner_action_spec,
            observation_spec,
        })
    }

    fn narrow_observation(&self, observation: &ValueTree) -> Result<ValueTree> {
        observation.map_leaves(&|_path, a| Ok(a.cast(narrow(a.dtype()))))
    }
}

impl SinglePrecisionWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor() -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for SinglePrecisionWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        let ts = self.env.reset()?;
        let observation = self.narrow_observation(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let widened =
            action.zip_map_spec(&self.inner_action_spec, &|_path, a, s| Ok(a.cast(s.dtype())))?;
        let ts = self.env.step(&widened)?;
        let observation = self.narrow_observation(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn action_spec(&self) -> SpecTree {
        self.action_spec.clone()
    }

    fn observation_spec(&self) -> SpecTree {
        self.observation_spec.clone()
    }

    fn reward_spec(&self) -> ArraySpec {
        let spec = self.env.reward_spec();
        spec.with_dtype(narrow(spec.dtype()))
    }

    fn discount_spec(&self) -> ArraySpec {
        let spec = self.env.discount_spec();
        spec.with_dtype(narrow(spec.dtype()))
    }

    fn control_timestep(&self) -> Option<f64> {
        self.env.control_timestep()
    }

    fn random_state(&mut self) -> Option<&mut StdRng> {
        self.env.random_state()
    }
}
