//! Augmentation of the observation with the previous action and reward.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{Array, ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use rand::rngs::StdRng;

const ACTION_KEY: &str = "action";
const REWARD_KEY: &str = "reward";

/// Puts the previous action and reward into the observation under the keys
/// `action` and `reward`.
///
/// Requires a dict observation, so it must be applied before
/// [`crate::ConcatObservationWrapper`]. On `reset` both entries hold the
/// generated default of their specs.
pub struct ObservationActionRewardWrapper<E> {
    env: E,
    spec: SpecTree,
    action_spec: SpecTree,
    reward_spec: ArraySpec,
}

impl<E: Environment> ObservationActionRewardWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E) -> Result<Self> {
        let inner = env.observation_spec();
        let mut map = match inner {
            SpecTree::Dict(map) => map,
            SpecTree::Leaf(_) => {
                return Err(EnvkitError::IncompatibleSpec(
                    "ObservationActionRewardWrapper requires a dict observation; \
                     apply it before ConcatObservationWrapper"
                        .into(),
                )
                .into())
            }
        };
        for key in &[ACTION_KEY, REWARD_KEY] {
            if map.contains_key(*key) {
                return Err(EnvkitError::IncompatibleSpec(format!(
                    "the observation already contains a `{}` key",
                    key
                ))
                .into());
            }
        }
        let action_spec = env.action_spec();
        let reward_spec = env.reward_spec();
        map.insert(ACTION_KEY.to_string(), action_spec.clone());
        map.insert(
            REWARD_KEY.to_string(),
            SpecTree::Leaf(reward_spec.clone()),
        );
        Ok(Self {
            env,
            spec: SpecTree::Dict(map),
            action_spec,
            reward_spec,
        })
    }

    fn augment(
        &self,
        ts: TimeStep,
        action: ValueTree,
        reward: Array,
    ) -> Result<TimeStep> {
        let mut map = match ts.observation.clone() {
            ValueTree::Dict(map) => map,
            ValueTree::Leaf(_) => {
                return Err(EnvkitError::StructureMismatch {
                    path: "".into(),
                    expected: "a dict observation".into(),
                    got: "a leaf".into(),
                }
                .into())
            }
        };
        map.insert(ACTION_KEY.to_string(), action);
        map.insert(REWARD_KEY.to_string(), ValueTree::Leaf(reward));
        Ok(ts.with_observation(ValueTree::Dict(map)))
    }

    fn default_action(&self) -> ValueTree {
        fn generate(spec: &SpecTree) -> ValueTree {
            match spec {
                SpecTree::Leaf(s) => ValueTree::Leaf(s.generate_value()),
                SpecTree::Dict(map) => ValueTree::Dict(
                    map.iter().map(|(k, v)| (k.clone(), generate(v))).collect(),
                ),
            }
        }
        generate(&self.action_spec)
    }
}

impl ObservationActionRewardWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor() -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for ObservationActionRewardWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        let ts = self.env.reset()?;
        self.augment(ts, self.default_action(), self.reward_spec.generate_value())
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let ts = self.env.step(action)?;
        let reward = Array::from_f64(
            self.reward_spec.dtype(),
            ndarray::ArrayD::from_elem(ndarray::IxDyn(&[]), ts.reward.unwrap_or(0.0)),
        );
        self.augment(ts, action.clone(), reward)
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
    use crate::{ConcatObservationWrapper, ConcatObservationConfig};
    use envkit_core::testing::EchoEnv;

    #[test]
    fn test_spec_gains_action_and_reward_keys() {
        let env = ObservationActionRewardWrapper::new(EchoEnv::new(2, -1.0, 1.0)).unwrap();
        let spec = env.observation_spec();
        match spec {
            SpecTree::Dict(map) => {
                assert!(map.contains_key("action"));
                assert!(map.contains_key("reward"));
                assert!(map.contains_key("position"));
            }
            _ => panic!("expected dict spec"),
        }
    }

    #[test]
    fn test_step_embeds_previous_action_and_reward() {
        let mut env = ObservationActionRewardWrapper::new(EchoEnv::new(1, -1.0, 1.0)).unwrap();
        env.reset().unwrap();
        let ts = env.step(&ValueTree::leaf_f64(vec![1], vec![0.7])).unwrap();
        match &ts.observation {
            ValueTree::Dict(map) => {
                assert_eq!(
                    map["action"].as_leaf().unwrap().to_f64().iter().next(),
                    Some(&0.7)
                );
                assert_eq!(
                    map["reward"].as_leaf().unwrap().to_f64().iter().next(),
                    Some(&1.0)
                );
            }
            _ => panic!("expected dict observation"),
        }
    }

    #[test]
    fn test_rejects_flat_observation() {
        let flat = ConcatObservationWrapper::new(
            EchoEnv::new(1, -1.0, 1.0),
            ConcatObservationConfig::default(),
        )
        .unwrap();
        assert!(ObservationActionRewardWrapper::new(flat).is_err());
    }

    #[test]
    fn test_composes_with_concatenation_outside() {
        // The documented ordering: OAR first, concatenation outside it.
        let oar = ObservationActionRewardWrapper::new(EchoEnv::new(2, -1.0, 1.0)).unwrap();
        let mut env = ConcatObservationWrapper::new(oar, Default::default()).unwrap();
        let spec = env.observation_spec();
        // position(2) + time(1) + velocity(2) + action(2) + reward(1).
        assert_eq!(spec.as_leaf().unwrap().shape(), &[8]);
        env.reset().unwrap();
    }
}
