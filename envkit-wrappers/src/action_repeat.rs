//! Repetition of one action over several environment steps.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Configuration of [`ActionRepeatWrapper`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionRepeatConfig {
    /// How many inner steps one outer step performs.
    pub num_repeats: usize,
}

impl Default for ActionRepeatConfig {
    fn default() -> Self {
        Self { num_repeats: 1 }
    }
}

impl ActionRepeatConfig {
    /// Sets the repeat count.
    pub fn num_repeats(mut self, num_repeats: usize) -> Self {
        self.num_repeats = num_repeats;
        self
    }
}

/// Forwards the same action `num_repeats` times per outer step, summing the
/// rewards and stopping early when the episode ends.
pub struct ActionRepeatWrapper<E> {
    env: E,
    num_repeats: usize,
}

impl<E: Environment> ActionRepeatWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E, config: ActionRepeatConfig) -> Result<Self> {
        if config.num_repeats < 1 {
            return Err(EnvkitError::InvalidConfig(
                "num_repeats must be at least 1, got 0".into(),
            )
            .into());
        }
        Ok(Self {
            env,
            num_repeats: config.num_repeats,
        })
    }
}

impl ActionRepeatWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: ActionRepeatConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for ActionRepeatWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let mut total_reward = 0.0;
        let mut ts = self.env.step(action)?;
        total_reward += ts.reward.unwrap_or(0.0);
        for _ in 1..self.num_repeats {
            if ts.is_last() {
                break;
            }
            ts = self.env.step(action)?;
            total_reward += ts.reward.unwrap_or(0.0);
        }
        ts.reward = Some(total_reward);
        Ok(ts)
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
