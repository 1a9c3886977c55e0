//! Truncation of episodes after a fixed number of steps.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::{ArraySpec, Environment, SpecTree, StepKind, TimeStep, ValueTree};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Configuration of [`StepLimitWrapper`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepLimitConfig {
    /// Maximum number of steps per episode.
    pub step_limit: usize,
}

impl Default for StepLimitConfig {
    fn default() -> Self {
        Self { step_limit: 1000 }
    }
}

impl StepLimitConfig {
    /// Sets the step limit.
    pub fn step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }
}

/// Ends an episode from outside after `step_limit` steps.
///
/// The limiting timestep is rewritten into a truncation: LAST with the
/// discount preserved, so consumers can still bootstrap from the final
/// observation. Episodes the inner environment ends earlier pass through
/// untouched.
pub struct StepLimitWrapper<E> {
    env: E,
    step_limit: usize,
    elapsed: usize,
}

impl<E: Environment> StepLimitWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E, config: StepLimitConfig) -> Self {
        Self {
            env,
            step_limit: config.step_limit,
            elapsed: 0,
        }
    }
}

impl StepLimitWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: StepLimitConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for StepLimitWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.elapsed = 0;
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let mut ts = self.env.step(action)?;
        self.elapsed += 1;
        if ts.is_last() {
            self.elapsed = 0;
        } else if self.elapsed >= self.step_limit {
            ts.kind = StepKind::Last;
            self.elapsed = 0;
        }
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
