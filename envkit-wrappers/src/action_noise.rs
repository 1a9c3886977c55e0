//! Zero-mean Gaussian corruption of bounded continuous actions.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{Array, ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use log::info;
use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration of [`ActionNoiseWrapper`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionNoiseConfig {
    /// Noise standard deviation as a fraction of the action range.
    pub scale: f64,
    /// Seed for the fallback random source, used only when the inner
    /// environment exposes no [`random_state`].
    ///
    /// [`random_state`]: Environment::random_state
    pub seed: Option<u64>,
}

impl Default for ActionNoiseConfig {
    fn default() -> Self {
        Self {
            scale: 0.01,
            seed: None,
        }
    }
}

impl ActionNoiseConfig {
    /// Sets the noise scale.
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the fallback seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Adds zero-mean Gaussian noise with standard deviation
/// `scale * (maximum - minimum)` to every bounded continuous action leaf,
/// then clips back into bounds. Discrete and unbounded leaves pass through.
///
/// Noise is drawn from the inner environment's random source when it exposes
/// one, so a single seed governs the whole episode; otherwise an own
/// [`StdRng`] is used. Bounded leaves with non-finite bounds are rejected at
/// construction, as is a negative scale.
pub struct ActionNoiseWrapper<E> {
    env: E,
    scale: f64,
    inner_spec: SpecTree,
    rng: StdRng,
}

impl<E: Environment> ActionNoiseWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E, config: ActionNoiseConfig) -> Result<Self> {
        if !(config.scale >= 0.0 && config.scale.is_finite()) {
            return Err(EnvkitError::InvalidConfig(format!(
                "noise scale must be finite and >= 0, got {}",
                config.scale
            ))
            .into());
        }
        let inner_spec = env.action_spec();
        for (path, spec) in inner_spec.leaves() {
            if spec.is_bounded() && !spec.is_discrete() && !spec.has_finite_bounds() {
                return Err(EnvkitError::InvalidConfig(format!(
                    "cannot derive a noise scale for action leaf `{}`: bounds must be finite, \
                     got [{:?}, {:?}]",
                    path,
                    spec.minimum().unwrap(),
                    spec.maximum().unwrap()
                ))
                .into());
            }
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!("ActionNoiseWrapper: scale={}", config.scale);
        Ok(Self {
            env,
            scale: config.scale,
            inner_spec,
            rng,
        })
    }

    fn corrupt(&mut self, action: &ValueTree) -> Result<ValueTree> {
        // Draw all noise first so one source serves every leaf in a fixed
        // (lexicographic) order.
        let mut noise: BTreeMap<String, ArrayD<f64>> = BTreeMap::new();
        {
            let env = &mut self.env;
            let own_rng = &mut self.rng;
            let scale = self.scale;
            let rng = match env.random_state() {
                Some(r) => r,
                None => own_rng,
            };
            for (path, spec) in self.inner_spec.leaves() {
                if spec.is_discrete() || !spec.is_bounded() {
                    continue;
                }
                let std = (spec.maximum().unwrap() - spec.minimum().unwrap()) * scale;
                noise.insert(path, std.mapv(|s| s * gaussian(rng)));
            }
        }
        action.zip_map_spec(&self.inner_spec, &|path, a, s| {
            if s.is_discrete() || !s.is_bounded() {
                return Ok(a.clone());
            }
            let lo = s.minimum().unwrap();
            let hi = s.maximum().unwrap();
            let mut v = a.to_f64() + &noise[path];
            ndarray::Zip::from(&mut v).and(lo).and(hi).for_each(|x, lo, hi| {
                *x = x.max(*lo).min(*hi);
            });
            Ok(Array::from_f64(s.dtype(), v))
        })
    }
}

impl ActionNoiseWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: ActionNoiseConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

/// One standard normal sample via the Box-Muller transform.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-300);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

impl<E: Environment> Environment for ActionNoiseWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let noisy = self.corrupt(action)?;
        self.env.step(&noisy)
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
    use envkit_core::testing::{EchoEnv, NestedEchoEnv};

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
    fn test_rejects_negative_scale() {
        let config = ActionNoiseConfig::default().scale(-0.1);
        assert!(ActionNoiseWrapper::new(EchoEnv::new(1, -1.0, 1.0), config).is_err());
    }

    #[test]
    fn test_rejects_non_finite_bounds() {
        let env = EchoEnv::new(1, f64::NEG_INFINITY, 1.0);
        assert!(ActionNoiseWrapper::new(env, Default::default()).is_err());
    }

    #[test]
    fn test_zero_scale_is_identity() {
        let config = ActionNoiseConfig::default().scale(0.0);
        let mut env = ActionNoiseWrapper::new(EchoEnv::new(2, -1.0, 1.0), config).unwrap();
        env.reset().unwrap();
        let ts = env
            .step(&ValueTree::leaf_f64(vec![2], vec![0.3, -0.7]))
            .unwrap();
        assert_eq!(forwarded_velocity(&ts), vec![0.3, -0.7]);
    }

    #[test]
    fn test_corrupted_action_stays_in_bounds() {
        for &scale in &[0.1, 1.0, 5.0] {
            let config = ActionNoiseConfig::default().scale(scale);
            let mut env =
                ActionNoiseWrapper::new(EchoEnv::new(3, -0.5, 0.5).episode_len(1000), config)
                    .unwrap();
            env.reset().unwrap();
            for _ in 0..50 {
                let ts = env
                    .step(&ValueTree::leaf_f64(vec![3], vec![0.5, -0.5, 0.0]))
                    .unwrap();
                for v in forwarded_velocity(&ts) {
                    assert!((-0.5..=0.5).contains(&v), "out of bounds: {}", v);
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_noise() {
        let forwarded = |seed: u64| -> Vec<f64> {
            let config = ActionNoiseConfig::default().scale(0.5);
            let mut env =
                ActionNoiseWrapper::new(EchoEnv::new(2, -1.0, 1.0).seed(seed), config).unwrap();
            env.reset().unwrap();
            let ts = env
                .step(&ValueTree::leaf_f64(vec![2], vec![0.0, 0.0]))
                .unwrap();
            forwarded_velocity(&ts)
        };
        assert_eq!(forwarded(7), forwarded(7));
        assert_ne!(forwarded(7), forwarded(8));
    }

    #[test]
    fn test_nested_action_leaves_discrete_untouched() {
        // NestedEchoEnv exposes no random source; the fallback seed applies.
        let config = ActionNoiseConfig::default().scale(0.5).seed(3);
        let mut env = ActionNoiseWrapper::new(NestedEchoEnv::new(), config).unwrap();
        env.reset().unwrap();
        let action = ValueTree::dict(vec![
            ("gain", ValueTree::leaf_f64(vec![2], vec![0.0, 0.0])),
            ("mode", ValueTree::scalar_i64(2)),
        ]);
        let ts = env.step(&action).unwrap();
        match &ts.observation {
            ValueTree::Dict(map) => {
                let gain: Vec<f64> =
                    map["gain"].as_leaf().unwrap().to_f64().iter().cloned().collect();
                assert!(gain.iter().any(|&v| v != 0.0), "noise was not applied");
                assert!(gain.iter().all(|&v| (-2.0..=2.0).contains(&v)));
                assert_eq!(map["mode"].as_leaf().unwrap().to_i64().iter().next(), Some(&2));
            }
            _ => panic!("expected dict observation"),
        }
    }
}
