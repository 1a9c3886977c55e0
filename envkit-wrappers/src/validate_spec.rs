//! Validation of actions against the advertised spec.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::{ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use rand::rngs::StdRng;

/// Rejects any action that does not match the advertised action spec.
///
/// This is the explicit contract-violation layer: shape, dtype, structure
/// and bound mismatches surface here at step time instead of as undefined
/// behavior further down the chain.
pub struct ValidateActionSpecWrapper<E> {
    env: E,
    spec: SpecTree,
}

impl<E: Environment> ValidateActionSpecWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E) -> Self {
        let spec = env.action_spec();
        Self { env, spec }
    }
}

impl ValidateActionSpecWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor() -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env)) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for ValidateActionSpecWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        self.spec.validate(action)?;
        self.env.step(action)
    }

    fn action_spec(&self) -> SpecTree {
        self.env.action_spec()
    }

    fn observation_spec(&self) -> SpecTree {
        self.env.observation_spec()
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

    #[test]
    fn test_conforming_action_passes() {
        let mut env = ValidateActionSpecWrapper::new(EchoEnv::new(2, -1.0, 1.0));
        env.reset().unwrap();
        assert!(env
            .step(&ValueTree::leaf_f64(vec![2], vec![0.5, -0.5]))
            .is_ok());
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let mut env = ValidateActionSpecWrapper::new(EchoEnv::new(2, -1.0, 1.0));
        env.reset().unwrap();
        assert!(env.step(&ValueTree::leaf_f64(vec![3], vec![0.0, 0.0, 0.0])).is_err());
    }

    #[test]
    fn test_rejects_out_of_bounds_action() {
        let mut env = ValidateActionSpecWrapper::new(EchoEnv::new(1, -1.0, 1.0));
        env.reset().unwrap();
        let err = env
            .step(&ValueTree::leaf_f64(vec![1], vec![2.0]))
            .unwrap_err();
        assert!(format!("{}", err).contains("outside bounds"));
    }
}
