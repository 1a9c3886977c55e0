//! Tracking of episode return and length.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{ArraySpec, Environment, SpecTree, TimeStep, ValueTree};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Configuration of [`EpisodeStatisticsWrapper`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpisodeStatisticsConfig {
    /// How many completed episodes enter the running means.
    pub deque_size: usize,
}

impl Default for EpisodeStatisticsConfig {
    fn default() -> Self {
        Self { deque_size: 1 }
    }
}

impl EpisodeStatisticsConfig {
    /// Sets the number of episodes tracked.
    pub fn deque_size(mut self, deque_size: usize) -> Self {
        self.deque_size = deque_size;
        self
    }
}

/// Mean return and length over the tracked episodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpisodeStatistics {
    /// Mean episodic return.
    pub mean_return: f64,
    /// Mean episode length in steps.
    pub mean_length: f64,
}

/// Tracks the return and length of the last `deque_size` episodes.
pub struct EpisodeStatisticsWrapper<E> {
    env: E,
    episode_return: f64,
    episode_length: usize,
    returns: VecDeque<f64>,
    lengths: VecDeque<usize>,
    deque_size: usize,
}

impl<E: Environment> EpisodeStatisticsWrapper<E> {
    /// Wraps `env`.
    pub fn new(env: E, config: EpisodeStatisticsConfig) -> Result<Self> {
        if config.deque_size < 1 {
            return Err(EnvkitError::InvalidConfig(
                "deque_size must be at least 1, got 0".into(),
            )
            .into());
        }
        Ok(Self {
            env,
            episode_return: 0.0,
            episode_length: 0,
            returns: VecDeque::with_capacity(config.deque_size),
            lengths: VecDeque::with_capacity(config.deque_size),
            deque_size: config.deque_size,
        })
    }

    /// Means over the completed episodes; errors before the first one ends.
    pub fn statistics(&self) -> Result<EpisodeStatistics> {
        if self.returns.is_empty() {
            return Err(
                EnvkitError::InvalidConfig("no completed episode to report yet".into()).into(),
            );
        }
        Ok(EpisodeStatistics {
            mean_return: self.returns.iter().sum::<f64>() / self.returns.len() as f64,
            mean_length: self.lengths.iter().sum::<usize>() as f64 / self.lengths.len() as f64,
        })
    }
}

impl EpisodeStatisticsWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: EpisodeStatisticsConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

impl<E: Environment> Environment for EpisodeStatisticsWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.episode_return = 0.0;
        self.episode_length = 0;
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let ts = self.env.step(action)?;
        self.episode_return += ts.reward.unwrap_or(0.0);
        self.episode_length += 1;
        if ts.is_last() {
            if self.returns.len() == self.deque_size {
                self.returns.pop_front();
                self.lengths.pop_front();
            }
            self.returns.push_back(self.episode_return);
            self.lengths.push_back(self.episode_length);
            self.episode_return = 0.0;
            self.episode_length = 0;
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
