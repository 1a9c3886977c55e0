//! Rescaling of bounded continuous actions to a canonical range.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use log::info;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Configuration of [`CanonicalSpecWrapper`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CanonicalSpecConfig {
    /// Clamp incoming actions to `[-1, 1]` before rescaling.
    pub clip: bool,
}

impl CanonicalSpecConfig {
    /// Sets whether incoming actions are clamped to `[-1, 1]`.
    pub fn clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }
}

/// Advertises bounded continuous action leaves as `[-1, 1]` and rescales
/// incoming actions back to the inner bounds.
///
/// With inner bounds `[lo, hi]` the forwarded action is
/// `a * (hi - lo) / 2 + (hi + lo) / 2`, the exact inverse of the
/// canonicalization. Discrete and unbounded leaves pass through with their
/// specs unchanged. Bounded leaves with non-finite bounds are rejected at
/// construction.
pub struct CanonicalSpecWrapper<E> {
    env: E,
    clip: bool,
    inner_spec: SpecTree,
    spec: SpecTree,
}

impl<E: Environment> CanonicalSpecWrapper<E> {
    /// Wraps `env`, deriving the canonical action spec.
    pub fn new(env: E, config: CanonicalSpecConfig) -> Result<Self> {
        let inner_spec = env.action_spec();
        let spec = inner_spec.map_leaves(&|path, s| {
            if s.is_discrete() || !s.is_bounded() {
                return Ok(s.clone());
            }
            if !s.has_finite_bounds() {
                return Err(EnvkitError::InvalidConfig(format!(
                    "cannot canonicalize action leaf `{}`: bounds must be finite, got [{:?}, {:?}]",
                    path,
                    s.minimum().unwrap(),
                    s.maximum().unwrap()
                ))
                .into());
            }
            s.with_bounds(-1.0, 1.0)
        })?;
        info!("CanonicalSpecWrapper: clip={}", config.clip);
        Ok(Self {
            env,
            clip: config.clip,
            inner_spec,
            spec,
        })
    }

    fn rescale(&self, action: &ValueTree) -> Result<ValueTree> {
        let clip = self.clip;
        action.zip_map_spec(&self.inner_spec, &|_path, a, s| {
            if s.is_discrete() || !s.is_bounded() {
                return Ok(a.clone());
            }
            let lo = s.minimum().unwrap();
            let hi = s.maximum().unwrap();
            let scale = (hi - lo) / 2.0;
            let offset = (hi + lo) / 2.0;
            let mut v = a.to_f64();
            if clip {
                v.mapv_inplace(|x| x.max(-1.0).min(1.0));
            }
            let out = &v * &scale + &offset;
            Ok(envkit_core::Array::from_f64(s.dtype(), out))
        })
    }
}

impl CanonicalSpecWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: CanonicalSpecConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for CanonicalSpecWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let inner_action = self.rescale(action)?;
        self.env.step(&inner_action)
    }

    fn action_spec(&self) -> SpecTree {
        self.spec.clone()
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
    use envkit_core::testing::{DiscreteEchoEnv, EchoEnv, NestedEchoEnv};
    use envkit_core::ValueTree;

    fn forwarded_velocity(ts: &TimeStep) -> Vec<f64> {
        match &ts.observation {
            ValueTree::Dict(map) => map["velocity"]
                .as_leaf()
                .unwrap()
                .to_f64()
                .iter()
                .cloned()
                .collect(),
            _ => panic!("expected dict observation"),
        }
    }

    #[test]
    fn test_rescales_to_inner_bounds() {
        // Bounds [-2, 2] give scale=2, offset=0; a=1.0 forwards 2.0.
        let mut env =
            CanonicalSpecWrapper::new(EchoEnv::new(1, -2.0, 2.0), Default::default()).unwrap();
        env.reset().unwrap();
        let ts = env
            .step(&ValueTree::leaf_f64(vec![1], vec![1.0]))
            .unwrap();
        assert_eq!(forwarded_velocity(&ts), vec![2.0]);
    }

    #[test]
    fn test_round_trip_recovers_action() {
        let lo = -0.3;
        let hi = 1.7;
        let scale = (hi - lo) / 2.0;
        let offset = (hi + lo) / 2.0;
        let mut env = CanonicalSpecWrapper::new(EchoEnv::new(1, lo, hi), Default::default())
            .unwrap();
        env.reset().unwrap();
        for &a in &[-1.0, -0.5, 0.0, 0.25, 1.0] {
            let ts = env.step(&ValueTree::leaf_f64(vec![1], vec![a])).unwrap();
            let forwarded = forwarded_velocity(&ts)[0];
            assert!((forwarded - (a * scale + offset)).abs() < 1e-12);
            // Re-canonicalizing the forwarded action recovers the input.
            assert!(((forwarded - offset) / scale - a).abs() < 1e-12);
        }
    }

    #[test]
    fn test_discrete_spec_and_action_unchanged() {
        let mut env =
            CanonicalSpecWrapper::new(DiscreteEchoEnv::new(), Default::default()).unwrap();
        let spec = env.action_spec();
        let leaf = spec.as_leaf().unwrap();
        assert_eq!(leaf.num_values(), Some(3));
        assert_eq!(leaf.minimum().unwrap().iter().next(), Some(&0.0));
        assert_eq!(leaf.maximum().unwrap().iter().next(), Some(&2.0));

        env.reset().unwrap();
        let ts = env.step(&ValueTree::scalar_i64(2)).unwrap();
        match &ts.observation {
            ValueTree::Dict(map) => {
                assert_eq!(map["state"].as_leaf().unwrap().to_f64().iter().next(), Some(&2.0))
            }
            _ => panic!("expected dict observation"),
        }
    }

    #[test]
    fn test_nested_action_rescales_only_bounded_leaves() {
        let mut env =
            CanonicalSpecWrapper::new(NestedEchoEnv::new(), Default::default()).unwrap();
        env.reset().unwrap();
        let action = ValueTree::dict(vec![
            ("gain", ValueTree::leaf_f64(vec![2], vec![0.5, -1.0])),
            ("mode", ValueTree::scalar_i64(1)),
        ]);
        let ts = env.step(&action).unwrap();
        match &ts.observation {
            ValueTree::Dict(map) => {
                let gain: Vec<f64> = map["gain"].as_leaf().unwrap().to_f64().iter().cloned().collect();
                assert_eq!(gain, vec![1.0, -2.0]);
                assert_eq!(map["mode"].as_leaf().unwrap().to_i64().iter().next(), Some(&1));
            }
            _ => panic!("expected dict observation"),
        }
    }

    #[test]
    fn test_rejects_non_finite_bounds() {
        let env = EchoEnv::new(1, f64::NEG_INFINITY, 1.0);
        assert!(CanonicalSpecWrapper::new(env, Default::default()).is_err());
    }

    #[test]
    fn test_clip_clamps_out_of_range_input() {
        let config = CanonicalSpecConfig::default().clip(true);
        let mut env = CanonicalSpecWrapper::new(EchoEnv::new(1, -2.0, 2.0), config).unwrap();
        env.reset().unwrap();
        let ts = env.step(&ValueTree::leaf_f64(vec![1], vec![5.0])).unwrap();
        assert_eq!(forwarded_velocity(&ts), vec![2.0]);
    }

    #[test]
    fn test_config_round_trips_through_yaml() {
        let config = CanonicalSpecConfig::default().clip(true);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: CanonicalSpecConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(restored.clip);
    }
}
